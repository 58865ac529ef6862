//! ONU inventory polling.
//!
//! Every read goes cache first, then through a [`RequestGroup`] so that
//! concurrent callers asking for the same board/PON share one SNMP walk.
//! Individual field GETs are coalesced per OID as well.

use crate::cache::{self, CacheStore};
use crate::cancellable;
use crate::coalesce::RequestGroup;
use crate::config::OltConfig;
use crate::error::{OltError, Result};
use crate::model::{OnuDetail, OnuId, OnuInfo, OnuPage, OnuSerialNumber};
use crate::snmp::SnmpClient;
use chrono::{Local, NaiveDateTime};
use olt_types::extract::{
    convert_date_time, convert_power, duration_between, extract_name, extract_offline_reason,
    extract_onu_id, extract_optical_distance, extract_serial_number, extract_status,
    format_duration, parse_date_time,
};
use olt_types::{BoardPonKey, BoardPonMap, OidField, SnmpPdu, SnmpValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Cache key of the per-PON ONU listing.
pub fn onu_list_key(board: u8, pon: u8) -> String {
    format!("board_{board}_pon_{pon}")
}

/// Cache key of the per-PON free ONU IDs.
pub fn empty_onu_id_key(board: u8, pon: u8) -> String {
    format!("board_{board}_pon_{pon}_empty_onu_id")
}

/// Cache lifetimes and ID range used by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub onu_list_ttl: Duration,
    pub empty_onu_id_ttl: Duration,
    pub max_onu_id: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&OltConfig::default())
    }
}

impl From<&OltConfig> for PollerSettings {
    fn from(config: &OltConfig) -> Self {
        Self {
            onu_list_ttl: config.onu_list_ttl(),
            empty_onu_id_ttl: config.empty_onu_id_ttl(),
            max_onu_id: config.max_onu_id,
        }
    }
}

/// Wall clock used for ONU uptime, in the OLT's local time.
pub type Clock = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// The SNMP side of the poller. Cheap to clone so a coalesced future can own one.
#[derive(Clone)]
struct Fetcher {
    snmp: Arc<dyn SnmpClient>,
    cache: Arc<dyn CacheStore>,
    oids: Arc<BoardPonMap>,
    settings: PollerSettings,
    values: Arc<RequestGroup<SnmpValue>>,
    now: Clock,
}

impl Fetcher {
    /// Walk the inventory table of one PON: ONU ID to name. Names are empty
    /// on firmware that enumerates ONUs by serial number.
    async fn walk_names(&self, board: u8, pon: u8) -> Result<BTreeMap<u32, String>> {
        let inventory = self.oids.inventory_field();
        let root = self.oids.table_oid(board, pon, inventory)?;
        let mut rows = BTreeMap::new();
        {
            let mut visit = |pdu: SnmpPdu| -> Result<()> {
                match extract_onu_id(&pdu.oid) {
                    Some(id) => {
                        let name = match inventory {
                            OidField::OnuIdName => extract_name(&pdu.value),
                            _ => String::new(),
                        };
                        rows.insert(id, name);
                    }
                    None => debug!(oid = %pdu.oid, "Skipping row without numeric ONU ID"),
                }
                Ok(())
            };
            self.snmp.walk(&root, &mut visit).await?;
        }
        debug!(board, pon, onus = rows.len(), "Walked ONU name table");
        Ok(rows)
    }

    /// GET a single OID, sharing the request with concurrent callers.
    async fn get_value(&self, oid: String) -> Result<SnmpValue> {
        let snmp = Arc::clone(&self.snmp);
        let key = oid.clone();
        self.values
            .run(&key, move || async move {
                let pdus = snmp.get(std::slice::from_ref(&oid)).await?;
                pdus.into_iter()
                    .next()
                    .map(|pdu| pdu.value)
                    .ok_or_else(|| OltError::snmp("get", &oid, "empty response"))
            })
            .await
    }

    /// One per-ONU field. Exception values count as a failed read.
    async fn field(&self, board: u8, pon: u8, onu: u32, field: OidField) -> Result<SnmpValue> {
        let oid = self.oids.onu_oid(board, pon, onu, field)?;
        let value = self.get_value(oid.clone()).await?;
        if value.is_exception() {
            return Err(OltError::snmp("get", oid, value.to_string()));
        }
        Ok(value)
    }

    /// Read a field and render it, leaving it empty on any failure.
    async fn text_field<F>(&self, board: u8, pon: u8, onu: u32, field: OidField, render: F) -> String
    where
        F: FnOnce(&SnmpValue) -> Result<String>,
    {
        match self.field(board, pon, onu, field).await.and_then(|v| render(&v)) {
            Ok(text) => text,
            Err(e) => {
                debug!(board, pon, onu, ?field, error = %e, "Field unavailable");
                String::new()
            }
        }
    }

    async fn fetch_list(&self, board: u8, pon: u8) -> Result<Vec<OnuInfo>> {
        let names = self.walk_names(board, pon).await?;
        let mut onus = Vec::with_capacity(names.len());

        for (id, name) in names {
            let onu_type = self
                .text_field(board, pon, id, OidField::OnuType, |v| Ok(extract_name(v)))
                .await;
            let serial_number = self
                .text_field(board, pon, id, OidField::SerialNumber, |v| {
                    Ok(extract_serial_number(v))
                })
                .await;
            let rx_power = self
                .text_field(board, pon, id, OidField::RxPower, |v| Ok(convert_power(v)?))
                .await;
            let status = self
                .text_field(board, pon, id, OidField::Status, |v| {
                    Ok(extract_status(v).to_string())
                })
                .await;

            onus.push(OnuInfo {
                board,
                pon,
                id,
                name,
                onu_type,
                serial_number,
                rx_power,
                status,
            });
        }

        Ok(onus)
    }

    async fn fetch_detail(&self, board: u8, pon: u8, onu: u32) -> Result<OnuDetail> {
        let inventory = self.oids.inventory_field();
        let row = self.oids.onu_oid(board, pon, onu, inventory)?;
        let row = self.get_value(row).await?;
        if row.is_exception() {
            return Err(OltError::OnuNotFound { board, pon, onu });
        }

        let date = |v: &SnmpValue| -> Result<String> {
            let bytes = v.as_bytes().ok_or(olt_types::OidError::InvalidValue {
                expected: "octet string",
                found: v.type_name(),
            })?;
            Ok(convert_date_time(bytes)?)
        };

        let mut detail = OnuDetail {
            board,
            pon,
            id: onu,
            ..OnuDetail::default()
        };
        if inventory == OidField::OnuIdName {
            detail.name = extract_name(&row);
        }
        detail.description = self
            .text_field(board, pon, onu, OidField::Description, |v| Ok(extract_name(v)))
            .await;
        detail.onu_type = self
            .text_field(board, pon, onu, OidField::OnuType, |v| Ok(extract_name(v)))
            .await;
        detail.serial_number = self
            .text_field(board, pon, onu, OidField::SerialNumber, |v| {
                Ok(extract_serial_number(v))
            })
            .await;
        detail.rx_power = self
            .text_field(board, pon, onu, OidField::RxPower, |v| Ok(convert_power(v)?))
            .await;
        detail.tx_power = self
            .text_field(board, pon, onu, OidField::TxPower, |v| Ok(convert_power(v)?))
            .await;
        detail.status = self
            .text_field(board, pon, onu, OidField::Status, |v| {
                Ok(extract_status(v).to_string())
            })
            .await;
        detail.ip_address = self
            .text_field(board, pon, onu, OidField::IpAddress, |v| Ok(extract_name(v)))
            .await;
        detail.last_online = self
            .text_field(board, pon, onu, OidField::LastOnline, date)
            .await;
        detail.last_offline = self
            .text_field(board, pon, onu, OidField::LastOffline, date)
            .await;
        detail.last_offline_reason = self
            .text_field(board, pon, onu, OidField::OfflineReason, |v| {
                Ok(extract_offline_reason(v).to_string())
            })
            .await;
        detail.gpon_optical_distance = self
            .text_field(board, pon, onu, OidField::OpticalDistance, |v| {
                Ok(extract_optical_distance(v))
            })
            .await;

        if let Ok(online) = parse_date_time(&detail.last_online) {
            let elapsed = (self.now)() - online;
            detail.uptime = format_duration(elapsed.num_seconds());
        }
        if let Ok(down) = duration_between(&detail.last_offline, &detail.last_online) {
            detail.last_down_time_duration = down;
        }

        Ok(detail)
    }

    async fn fetch_empty_ids(&self, board: u8, pon: u8) -> Result<Vec<OnuId>> {
        let used: BTreeSet<u32> = self.walk_names(board, pon).await?.into_keys().collect();
        Ok((1..=self.settings.max_onu_id)
            .filter(|id| !used.contains(id))
            .map(|id| OnuId { board, pon, id })
            .collect())
    }

    async fn fetch_serial_numbers(&self, board: u8, pon: u8) -> Result<Vec<OnuSerialNumber>> {
        let names = self.walk_names(board, pon).await?;
        let mut serials = Vec::with_capacity(names.len());
        for id in names.into_keys() {
            let serial_number = self
                .text_field(board, pon, id, OidField::SerialNumber, |v| {
                    Ok(extract_serial_number(v))
                })
                .await;
            serials.push(OnuSerialNumber {
                board,
                pon,
                id,
                serial_number,
            });
        }
        Ok(serials)
    }

    /// Cached listing, falling back to a walk and refilling the cache.
    async fn cached_list(&self, board: u8, pon: u8) -> Result<Vec<OnuInfo>> {
        let key = onu_list_key(board, pon);
        if let Some(onus) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(onus);
        }
        let onus = self.fetch_list(board, pon).await?;
        cache::set_json(self.cache.as_ref(), &key, &onus, self.settings.onu_list_ttl).await;
        Ok(onus)
    }

    async fn store_empty_ids(&self, board: u8, pon: u8) -> Result<Vec<OnuId>> {
        let ids = self.fetch_empty_ids(board, pon).await?;
        cache::set_json(
            self.cache.as_ref(),
            &empty_onu_id_key(board, pon),
            &ids,
            self.settings.empty_onu_id_ttl,
        )
        .await;
        Ok(ids)
    }
}

/// Reads ONU inventory and telemetry for one OLT.
pub struct OnuPoller {
    fetcher: Fetcher,
    lists: RequestGroup<Vec<OnuInfo>>,
    details: RequestGroup<OnuDetail>,
    id_lists: RequestGroup<Vec<OnuId>>,
    serials: RequestGroup<Vec<OnuSerialNumber>>,
    pages: RequestGroup<OnuPage>,
}

impl OnuPoller {
    pub fn new(
        snmp: Arc<dyn SnmpClient>,
        cache: Arc<dyn CacheStore>,
        oids: Arc<BoardPonMap>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            fetcher: Fetcher {
                snmp,
                cache,
                oids,
                settings,
                values: Arc::new(RequestGroup::new()),
                now: local_now,
            },
            lists: RequestGroup::new(),
            details: RequestGroup::new(),
            id_lists: RequestGroup::new(),
            serials: RequestGroup::new(),
            pages: RequestGroup::new(),
        }
    }

    /// Replace the clock uptime is measured against.
    pub fn with_clock(mut self, now: Clock) -> Self {
        self.fetcher.now = now;
        self
    }

    fn check(board: u8, pon: u8) -> Result<()> {
        BoardPonKey::new(board, pon).validate()?;
        Ok(())
    }

    /// All ONUs on a PON, sorted by ID.
    #[instrument(skip(self, cancel))]
    pub async fn list_onus(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
    ) -> Result<Vec<OnuInfo>> {
        Self::check(board, pon)?;
        let fetcher = self.fetcher.clone();
        let key = format!("onuinfo-b{board}-p{pon}");
        let onus = cancellable(
            cancel,
            self.lists
                .run(&key, move || async move { fetcher.cached_list(board, pon).await }),
        )
        .await?;
        info!(board, pon, onus = onus.len(), "Listed ONUs");
        Ok(onus)
    }

    /// Every field of one ONU.
    #[instrument(skip(self, cancel))]
    pub async fn onu_detail(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
        onu: u32,
    ) -> Result<OnuDetail> {
        Self::check(board, pon)?;
        let fetcher = self.fetcher.clone();
        let key = format!("onu:{board}:{pon}:{onu}");
        cancellable(
            cancel,
            self.details
                .run(&key, move || async move { fetcher.fetch_detail(board, pon, onu).await }),
        )
        .await
    }

    /// ONU IDs in `1..=max_onu_id` not assigned on the PON.
    #[instrument(skip(self, cancel))]
    pub async fn empty_onu_ids(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
    ) -> Result<Vec<OnuId>> {
        Self::check(board, pon)?;
        let fetcher = self.fetcher.clone();
        let key = format!("empty_onu_id:{board}:{pon}");
        cancellable(
            cancel,
            self.id_lists.run(&key, move || async move {
                let cache_key = empty_onu_id_key(board, pon);
                if let Some(ids) = cache::get_json(fetcher.cache.as_ref(), &cache_key).await {
                    return Ok(ids);
                }
                fetcher.store_empty_ids(board, pon).await
            }),
        )
        .await
    }

    /// Re-walk the PON and overwrite the cached free IDs.
    #[instrument(skip(self, cancel))]
    pub async fn refresh_empty_onu_ids(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
    ) -> Result<Vec<OnuId>> {
        Self::check(board, pon)?;
        let fetcher = self.fetcher.clone();
        let key = format!("update_empty_onu_id:{board}:{pon}");
        cancellable(
            cancel,
            self.id_lists
                .run(&key, move || async move { fetcher.store_empty_ids(board, pon).await }),
        )
        .await
    }

    #[instrument(skip(self, cancel))]
    pub async fn onu_serial_numbers(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
    ) -> Result<Vec<OnuSerialNumber>> {
        Self::check(board, pon)?;
        let fetcher = self.fetcher.clone();
        let key = format!("onu_id_and_serial_number:{board}:{pon}");
        cancellable(
            cancel,
            self.serials.run(&key, move || async move {
                fetcher.fetch_serial_numbers(board, pon).await
            }),
        )
        .await
    }

    /// One 1-based page of the PON listing. Pages past the end are empty.
    #[instrument(skip(self, cancel))]
    pub async fn list_onus_paginated(
        &self,
        cancel: &CancellationToken,
        board: u8,
        pon: u8,
        page: usize,
        page_size: usize,
    ) -> Result<OnuPage> {
        Self::check(board, pon)?;
        if page == 0 || page_size == 0 {
            return Err(OltError::config(format!(
                "page and page size must be at least 1 (got page {page}, size {page_size})"
            )));
        }

        let fetcher = self.fetcher.clone();
        let key = format!("get_onu_info:{board}:{pon}:{page}:{page_size}");
        cancellable(
            cancel,
            self.pages.run(&key, move || async move {
                let onus = fetcher.cached_list(board, pon).await?;
                Ok(paginate(onus, page, page_size))
            }),
        )
        .await
    }

    /// Drop both cached entries of a PON, e.g. after provisioning changed it.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, board: u8, pon: u8) -> Result<()> {
        Self::check(board, pon)?;
        for key in [onu_list_key(board, pon), empty_onu_id_key(board, pon)] {
            match self.fetcher.cache.delete(&key).await {
                Ok(true) => debug!(key, "Cache entry invalidated"),
                Ok(false) => warn!(key, "Cache key not found on invalidate"),
                Err(e) => warn!(key, error = %e, "Failed to invalidate cache entry"),
            }
        }
        Ok(())
    }
}

fn paginate(onus: Vec<OnuInfo>, page: usize, page_size: usize) -> OnuPage {
    let total = onus.len();
    let start = (page - 1).saturating_mul(page_size);
    let onus = onus
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();
    OnuPage { onus, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, MockCacheStore};
    use crate::snmp::WalkVisitor;
    use async_trait::async_trait;
    use olt_types::{initialize_board_pon_map, V2_1, V2_2};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Agent that serves a fixed MIB and counts requests.
    #[derive(Default)]
    struct FakeAgent {
        mib: Mutex<BTreeMap<String, SnmpValue>>,
        walks: AtomicUsize,
        gets: AtomicUsize,
        delay: Duration,
    }

    impl FakeAgent {
        fn insert(&self, oid: String, value: SnmpValue) {
            self.mib.lock().insert(oid, value);
        }
    }

    #[async_trait]
    impl SnmpClient for FakeAgent {
        async fn get(&self, oids: &[String]) -> Result<Vec<SnmpPdu>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let mib = self.mib.lock().clone();
            Ok(oids
                .iter()
                .map(|oid| {
                    let value = mib.get(oid).cloned().unwrap_or(SnmpValue::NoSuchInstance);
                    SnmpPdu::new(oid.clone(), value)
                })
                .collect())
        }

        async fn walk(&self, root: &str, visit: &mut WalkVisitor<'_>) -> Result<()> {
            self.walks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let prefix = format!("{root}.");
            let rows: Vec<_> = self
                .mib
                .lock()
                .iter()
                .filter(|(oid, _)| oid.starts_with(&prefix))
                .map(|(oid, v)| SnmpPdu::new(oid.clone(), v.clone()))
                .collect();
            for pdu in rows {
                visit(pdu)?;
            }
            Ok(())
        }
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-16 12:00:05", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn oids() -> Arc<BoardPonMap> {
        Arc::new(initialize_board_pon_map(&V2_2).unwrap())
    }

    fn octets(s: &[u8]) -> SnmpValue {
        SnmpValue::OctetString(s.to_vec())
    }

    /// Board 1 PON 1 with ONUs 1, 2 and 5. ONU 5 has no status row.
    fn populated_agent(delay: Duration) -> Arc<FakeAgent> {
        let map = oids();
        let agent = FakeAgent {
            delay,
            ..FakeAgent::default()
        };
        for (id, name) in [(2u32, "bob"), (1, "alice"), (5, "carol")] {
            let oid = |field| map.onu_oid(1, 1, id, field).unwrap();
            agent.insert(oid(OidField::OnuIdName), octets(name.as_bytes()));
            agent.insert(oid(OidField::OnuType), octets(b"F670L"));
            agent.insert(
                oid(OidField::SerialNumber),
                octets(&[0x5A, 0x54, 0x45, 0x47, 0xD8, 0x24, 0xCD, id as u8]),
            );
            agent.insert(oid(OidField::RxPower), SnmpValue::Integer(5000));
            if id != 5 {
                agent.insert(oid(OidField::Status), SnmpValue::Integer(4));
            }
        }
        Arc::new(agent)
    }

    fn poller(agent: Arc<FakeAgent>, cache: Arc<dyn CacheStore>) -> OnuPoller {
        OnuPoller::new(agent, cache, oids(), PollerSettings::default())
    }

    #[tokio::test]
    async fn test_list_onus_sorted_with_fields() {
        let agent = populated_agent(Duration::ZERO);
        let poller = poller(Arc::clone(&agent), Arc::new(MemoryCache::new()));

        let onus = poller
            .list_onus(&CancellationToken::new(), 1, 1)
            .await
            .unwrap();

        let ids: Vec<u32> = onus.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
        assert_eq!(onus[0].name, "alice");
        assert_eq!(onus[0].onu_type, "F670L");
        assert_eq!(onus[0].serial_number, "ZTEGD824CD01");
        assert_eq!(onus[0].rx_power, "-20.00");
        assert_eq!(onus[0].status, "Online");
        assert_eq!(onus[2].status, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_list_walks_once() {
        let agent = populated_agent(Duration::from_millis(500));
        let poller = Arc::new(poller(Arc::clone(&agent), Arc::new(MemoryCache::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let poller = Arc::clone(&poller);
                tokio::spawn(async move {
                    poller.list_onus(&CancellationToken::new(), 1, 1).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }

        assert_eq!(agent.walks.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &results[0]));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_snmp() {
        let agent = populated_agent(Duration::ZERO);
        let poller = poller(Arc::clone(&agent), Arc::new(MemoryCache::new()));
        let cancel = CancellationToken::new();

        let first = poller.list_onus(&cancel, 1, 1).await.unwrap();
        let walks = agent.walks.load(Ordering::SeqCst);
        let gets = agent.gets.load(Ordering::SeqCst);

        let second = poller.list_onus(&cancel, 1, 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(agent.walks.load(Ordering::SeqCst), walks);
        assert_eq!(agent.gets.load(Ordering::SeqCst), gets);

        poller.invalidate(1, 1).await.unwrap();
        poller.list_onus(&cancel, 1, 1).await.unwrap();
        assert_eq!(agent.walks.load(Ordering::SeqCst), walks + 1);
    }

    #[tokio::test]
    async fn test_cache_failures_do_not_fail_poll() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|key| Err(OltError::cache("get", key, "connection refused")));
        store
            .expect_set()
            .returning(|key, _, _| Err(OltError::cache("set", key, "connection refused")));

        let agent = populated_agent(Duration::ZERO);
        let poller = poller(Arc::clone(&agent), Arc::new(store));
        let cancel = CancellationToken::new();

        assert_eq!(poller.list_onus(&cancel, 1, 1).await.unwrap().len(), 3);
        assert_eq!(poller.empty_onu_ids(&cancel, 1, 1).await.unwrap().len(), 125);
    }

    #[tokio::test]
    async fn test_empty_onu_ids() {
        let agent = populated_agent(Duration::ZERO);
        let store = Arc::new(MemoryCache::new());
        let poller = poller(Arc::clone(&agent), store.clone());

        let ids = poller
            .empty_onu_ids(&CancellationToken::new(), 1, 1)
            .await
            .unwrap();
        assert_eq!(ids.len(), 125);
        assert_eq!(ids[0], OnuId { board: 1, pon: 1, id: 3 });
        assert_eq!(ids[1].id, 4);
        assert_eq!(ids.last().unwrap().id, 128);

        let cached: Option<Vec<OnuId>> =
            cache::get_json(store.as_ref(), &empty_onu_id_key(1, 1)).await;
        assert_eq!(cached, Some(ids));
    }

    #[tokio::test]
    async fn test_refresh_overwrites_cached_ids() {
        let agent = populated_agent(Duration::ZERO);
        let store = Arc::new(MemoryCache::new());
        let poller = poller(Arc::clone(&agent), store.clone());
        let cancel = CancellationToken::new();

        poller.empty_onu_ids(&cancel, 1, 1).await.unwrap();
        let name = oids().onu_oid(1, 1, 3, OidField::OnuIdName).unwrap();
        agent.insert(name, octets(b"dave"));

        // Still served from cache.
        assert_eq!(poller.empty_onu_ids(&cancel, 1, 1).await.unwrap()[0].id, 3);

        let refreshed = poller.refresh_empty_onu_ids(&cancel, 1, 1).await.unwrap();
        assert_eq!(refreshed[0].id, 4);
        assert_eq!(poller.empty_onu_ids(&cancel, 1, 1).await.unwrap()[0].id, 4);
    }

    #[tokio::test]
    async fn test_serial_numbers() {
        let poller = poller(populated_agent(Duration::ZERO), Arc::new(MemoryCache::new()));
        let serials = poller
            .onu_serial_numbers(&CancellationToken::new(), 1, 1)
            .await
            .unwrap();
        assert_eq!(serials.len(), 3);
        assert_eq!(serials[1].id, 2);
        assert_eq!(serials[1].serial_number, "ZTEGD824CD02");
    }

    #[tokio::test]
    async fn test_pagination() {
        let poller = poller(populated_agent(Duration::ZERO), Arc::new(MemoryCache::new()));
        let cancel = CancellationToken::new();

        let page = poller.list_onus_paginated(&cancel, 1, 1, 1, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.onus.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2]);

        let page = poller.list_onus_paginated(&cancel, 1, 1, 2, 2).await.unwrap();
        assert_eq!(page.onus.iter().map(|o| o.id).collect::<Vec<_>>(), vec![5]);

        let page = poller.list_onus_paginated(&cancel, 1, 1, 9, 2).await.unwrap();
        assert!(page.onus.is_empty());
        assert_eq!(page.total, 3);

        let err = poller.list_onus_paginated(&cancel, 1, 1, 0, 2).await.unwrap_err();
        assert!(matches!(err, OltError::Config(_)));
    }

    #[tokio::test]
    async fn test_onu_detail() {
        let agent = populated_agent(Duration::ZERO);
        let map = oids();
        let oid = |field| map.onu_oid(1, 1, 2, field).unwrap();
        agent.insert(oid(OidField::Description), octets(b"floor 3"));
        agent.insert(oid(OidField::TxPower), SnmpValue::Integer(16000));
        agent.insert(oid(OidField::IpAddress), SnmpValue::IpAddress([10, 0, 0, 2]));
        agent.insert(
            oid(OidField::LastOnline),
            octets(&[0x07, 0xE8, 3, 15, 10, 30, 0, 0]),
        );
        agent.insert(
            oid(OidField::LastOffline),
            octets(&[0x07, 0xE8, 3, 14, 10, 30, 0, 0]),
        );
        agent.insert(oid(OidField::OfflineReason), SnmpValue::Integer(9));
        agent.insert(oid(OidField::OpticalDistance), SnmpValue::Integer(1432));

        let poller =
            poller(Arc::clone(&agent), Arc::new(MemoryCache::new())).with_clock(fixed_now);
        let detail = poller
            .onu_detail(&CancellationToken::new(), 1, 1, 2)
            .await
            .unwrap();

        assert_eq!(detail.name, "bob");
        assert_eq!(detail.description, "floor 3");
        assert_eq!(detail.tx_power, "2.00");
        assert_eq!(detail.ip_address, "10.0.0.2");
        assert_eq!(detail.last_online, "2024-03-15 10:30:00");
        assert_eq!(detail.last_offline, "2024-03-14 10:30:00");
        assert_eq!(detail.last_down_time_duration, "1 days 0 hours 0 minutes 0 seconds");
        assert_eq!(detail.last_offline_reason, "PowerOff");
        assert_eq!(detail.gpon_optical_distance, "1432");
        assert_eq!(detail.uptime, "1 days 1 hours 30 minutes 5 seconds");
    }

    #[tokio::test]
    async fn test_onu_detail_without_last_online_has_no_uptime() {
        let poller = poller(populated_agent(Duration::ZERO), Arc::new(MemoryCache::new()))
            .with_clock(fixed_now);
        let detail = poller
            .onu_detail(&CancellationToken::new(), 1, 1, 1)
            .await
            .unwrap();
        assert_eq!(detail.last_online, "");
        assert_eq!(detail.uptime, "");
    }

    /// Board 1 PON 1 on V2.1 firmware with ONUs 3 and 4, keyed by serial number.
    fn v21_agent() -> (Arc<FakeAgent>, Arc<BoardPonMap>) {
        let map = Arc::new(initialize_board_pon_map(&V2_1).unwrap());
        let agent = FakeAgent::default();
        for id in [4u32, 3] {
            let oid = |field| map.onu_oid(1, 1, id, field).unwrap();
            agent.insert(
                oid(OidField::SerialNumber),
                octets(&[0x5A, 0x54, 0x45, 0x47, 0xC0, 0xFF, 0xEE, id as u8]),
            );
            agent.insert(oid(OidField::OnuType), octets(b"F660"));
            agent.insert(oid(OidField::Status), SnmpValue::Integer(4));
        }
        (Arc::new(agent), map)
    }

    #[tokio::test]
    async fn test_v21_lists_onus_from_serial_table() {
        let (agent, map) = v21_agent();
        let poller = OnuPoller::new(
            agent,
            Arc::new(MemoryCache::new()),
            map,
            PollerSettings::default(),
        );
        let cancel = CancellationToken::new();

        let onus = poller.list_onus(&cancel, 1, 1).await.unwrap();
        assert_eq!(onus.iter().map(|o| o.id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(onus[0].name, "");
        assert_eq!(onus[0].onu_type, "F660");
        assert_eq!(onus[0].serial_number, "ZTEGC0FFEE03");
        assert_eq!(onus[0].status, "Online");
        // No optical power table on this firmware.
        assert_eq!(onus[0].rx_power, "");

        let ids = poller.empty_onu_ids(&cancel, 1, 1).await.unwrap();
        assert_eq!(ids.len(), 126);
        assert_eq!(ids[2].id, 5);
    }

    #[tokio::test]
    async fn test_v21_detail_leaves_unsupported_fields_empty() {
        let (agent, map) = v21_agent();
        let gets_before = agent.gets.load(Ordering::SeqCst);
        let poller = OnuPoller::new(
            Arc::clone(&agent) as Arc<dyn SnmpClient>,
            Arc::new(MemoryCache::new()),
            map,
            PollerSettings::default(),
        );
        let cancel = CancellationToken::new();

        let detail = poller.onu_detail(&cancel, 1, 1, 4).await.unwrap();
        assert_eq!(detail.serial_number, "ZTEGC0FFEE04");
        assert_eq!(detail.onu_type, "F660");
        assert_eq!(detail.status, "Online");
        assert_eq!(detail.rx_power, "");
        assert_eq!(detail.tx_power, "");
        assert_eq!(detail.gpon_optical_distance, "");
        // Row check, type, serial and status only.
        assert_eq!(agent.gets.load(Ordering::SeqCst) - gets_before, 4);

        let err = poller.onu_detail(&cancel, 1, 1, 9).await.unwrap_err();
        assert!(matches!(err, OltError::OnuNotFound { onu: 9, .. }));
    }

    #[tokio::test]
    async fn test_onu_detail_not_found() {
        let poller = poller(populated_agent(Duration::ZERO), Arc::new(MemoryCache::new()));
        let err = poller
            .onu_detail(&CancellationToken::new(), 1, 1, 77)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ONU 77 not found"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_board_rejected() {
        let agent = populated_agent(Duration::ZERO);
        let poller = poller(Arc::clone(&agent), Arc::new(MemoryCache::new()));
        let err = poller
            .list_onus(&CancellationToken::new(), 3, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OltError::Oid(_)));
        assert_eq!(agent.walks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_poll() {
        let agent = populated_agent(Duration::from_secs(10));
        let poller = poller(Arc::clone(&agent), Arc::new(MemoryCache::new()));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let err = poller.list_onus(&cancel, 1, 1).await.unwrap_err();
        assert!(matches!(err, OltError::Cancelled));
    }

    #[tokio::test]
    async fn test_invalidate_missing_keys_is_ok() {
        let poller = poller(populated_agent(Duration::ZERO), Arc::new(MemoryCache::new()));
        tokio_test::assert_ok!(poller.invalidate(2, 16).await);
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(onu_list_key(1, 8), "board_1_pon_8");
        assert_eq!(empty_onu_id_key(2, 3), "board_2_pon_3_empty_onu_id");
    }

    #[test]
    fn test_paginate_clamps_end() {
        let onus: Vec<OnuInfo> = (1..=5)
            .map(|id| OnuInfo {
                id,
                ..OnuInfo::default()
            })
            .collect();
        let page = paginate(onus, 2, 3);
        assert_eq!(page.onus.len(), 2);
        assert_eq!(page.total, 5);
    }
}
