//! SNMP polling client.
//!
//! Every call opens its own UDP session, performs one GET or WALK and drops
//! the session. Calls therefore share no socket state and may run on separate
//! tasks without coordination.

use crate::config::SnmpConfig;
use crate::error::{OltError, Result};
use async_snmp::client::Retry;
use async_snmp::{Auth, Client, Oid, Value};
use async_trait::async_trait;
use olt_types::{SnmpPdu, SnmpValue};
use std::time::Duration;
use tracing::{debug, instrument};

/// Visitor invoked once per row returned by a walk.
pub type WalkVisitor<'a> = dyn FnMut(SnmpPdu) -> Result<()> + Send + 'a;

/// Read access to the OLT SNMP agent.
#[async_trait]
pub trait SnmpClient: Send + Sync {
    /// GET the given OIDs in one request.
    async fn get(&self, oids: &[String]) -> Result<Vec<SnmpPdu>>;

    /// Walk the subtree under `root`, calling `visit` for every leaf.
    /// A visitor error stops the walk and is returned.
    async fn walk(&self, root: &str, visit: &mut WalkVisitor<'_>) -> Result<()>;
}

/// SNMPv2c client over UDP.
#[derive(Debug, Clone)]
pub struct UdpSnmpClient {
    target: String,
    community: String,
    timeout: Duration,
    retries: u32,
}

impl UdpSnmpClient {
    /// Create a new client for the configured agent
    pub fn new(config: &SnmpConfig) -> Self {
        Self {
            target: config.target(),
            community: config.community.clone(),
            timeout: config.timeout(),
            retries: config.retries,
        }
    }

    async fn open(&self, operation: &'static str, target: &str) -> Result<Client> {
        Client::builder(self.target.clone(), Auth::v2c(self.community.clone()))
            .timeout(self.timeout)
            .retry(Retry::fixed(self.retries, Duration::ZERO))
            .connect()
            .await
            .map_err(|e| OltError::snmp(operation, target, e))
    }
}

fn parse_oid(operation: &'static str, oid: &str) -> Result<Oid> {
    Oid::parse(oid).map_err(|e| OltError::snmp(operation, oid, e))
}

/// Converts a wire value into the domain sum type.
pub fn convert_value(value: &Value) -> SnmpValue {
    match value {
        Value::Integer(v) => SnmpValue::Integer(i64::from(*v)),
        Value::OctetString(b) | Value::Opaque(b) => SnmpValue::OctetString(b.to_vec()),
        Value::ObjectIdentifier(oid) => SnmpValue::ObjectId(format!(".{}", oid)),
        Value::IpAddress(addr) => SnmpValue::IpAddress(*addr),
        Value::Counter32(v) | Value::Gauge32(v) => SnmpValue::Counter(u64::from(*v)),
        Value::Counter64(v) => SnmpValue::Counter(*v),
        Value::TimeTicks(v) => SnmpValue::TimeTicks(*v),
        Value::NoSuchObject => SnmpValue::NoSuchObject,
        Value::NoSuchInstance => SnmpValue::NoSuchInstance,
        Value::EndOfMibView => SnmpValue::EndOfMibView,
        _ => SnmpValue::Null,
    }
}

fn to_pdu(oid: &Oid, value: &Value) -> SnmpPdu {
    SnmpPdu::new(format!(".{}", oid), convert_value(value))
}

#[async_trait]
impl SnmpClient for UdpSnmpClient {
    #[instrument(skip(self), fields(target = %self.target))]
    async fn get(&self, oids: &[String]) -> Result<Vec<SnmpPdu>> {
        let description = oids.join(",");
        let parsed = oids
            .iter()
            .map(|oid| parse_oid("get", oid))
            .collect::<Result<Vec<_>>>()?;

        let client = self.open("get", &description).await?;
        let varbinds = client
            .get_many(&parsed)
            .await
            .map_err(|e| OltError::snmp("get", &description, e))?;

        debug!(count = varbinds.len(), "SNMP get completed");
        Ok(varbinds.iter().map(|vb| to_pdu(&vb.oid, &vb.value)).collect())
    }

    #[instrument(skip(self, visit), fields(target = %self.target))]
    async fn walk(&self, root: &str, visit: &mut WalkVisitor<'_>) -> Result<()> {
        let root_oid = parse_oid("walk", root)?;
        let client = self.open("walk", root).await?;
        let mut stream = client
            .walk(root_oid)
            .map_err(|e| OltError::snmp("walk", root, e))?;

        let mut rows = 0usize;
        while let Some(item) = stream.next().await {
            let vb = item.map_err(|e| OltError::snmp("walk", root, e))?;
            visit(to_pdu(&vb.oid, &vb.value))?;
            rows += 1;
        }

        debug!(rows, "SNMP walk completed");
        Ok(())
    }
}
