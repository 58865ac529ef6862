//! One Telnet CLI session and its privilege-mode state machine.
//!
//! ```text
//! Disconnected --connect/login--> User --enable--> Enable --configure terminal--> Config
//!      ^                                              ^                              |
//!      +------------------- exit / close ------------+<------------ end -------------+
//! ```
//!
//! Two locks guard a session. The state lock is a short synchronous lock over
//! the mode and timestamps, so status queries never wait on the wire. The
//! command lock owns the socket and is held for the whole send/read exchange
//! of one command or mode transition.

use super::negotiation::TelnetDecoder;
use super::TelnetResult;
use crate::config::TelnetConfig;
use crate::error::TelnetError;
use crate::model::{TelnetBatchResponse, TelnetResponse};
use crate::{OltError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// CSI escape sequences (colors, cursor movement) emitted by the CLI.
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("valid regex"));

/// Time allowed for the `end` sent while closing from config mode.
const CLOSE_UNWIND_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 4096;

/// CLI privilege level of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Disconnected,
    User,
    Enable,
    Config,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Disconnected => "disconnected",
            Mode::User => "user",
            Mode::Enable => "enable",
            Mode::Config => "config",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub connected: bool,
    pub mode: Mode,
    pub last_activity: Option<DateTime<Utc>>,
    /// Seconds since login, zero while disconnected.
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct SessionState {
    mode: Mode,
    connected_at: Option<Instant>,
    last_activity: Option<DateTime<Utc>>,
}

/// Socket plus the Telnet decoder state.
struct Connection {
    stream: TcpStream,
    decoder: TelnetDecoder,
    write_timeout: Duration,
    /// Set once the peer closed, the socket failed or a reply did not arrive
    /// in time. Late output would answer the next command, so the
    /// connection is then discarded.
    broken: bool,
}

impl Connection {
    fn new(stream: TcpStream, write_timeout: Duration) -> Self {
        Self {
            stream,
            decoder: TelnetDecoder::new(),
            write_timeout,
            broken: false,
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> TelnetResult<()> {
        match tokio::time::timeout(self.write_timeout, self.stream.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.broken = true;
                Err(TelnetError::command_failed(format!("failed to send command: {e}"), true))
            }
            Err(_) => {
                self.broken = true;
                Err(TelnetError::timeout("timeout sending command"))
            }
        }
    }

    async fn send_line(&mut self, line: &str) -> TelnetResult<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write_raw(&bytes).await
    }

    /// Read until `done` accepts the text received so far or `timeout` elapses.
    async fn read_until<F>(&mut self, timeout: Duration, what: &str, done: F) -> TelnetResult<String>
    where
        F: Fn(&str) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];
        let mut data = Vec::new();
        let mut replies = Vec::new();

        loop {
            let n = match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_) => {
                    self.broken = true;
                    let output = String::from_utf8_lossy(&data).into_owned();
                    return Err(TelnetError::timeout(format!("timeout waiting for {what}"))
                        .with_raw_output(output));
                }
                Ok(Ok(0)) => {
                    self.broken = true;
                    let output = String::from_utf8_lossy(&data).into_owned();
                    return Err(TelnetError::disconnected("connection closed by OLT")
                        .with_raw_output(output));
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    self.broken = true;
                    let output = String::from_utf8_lossy(&data).into_owned();
                    return Err(TelnetError::command_failed(format!("read error: {e}"), false)
                        .with_raw_output(output));
                }
            };

            self.decoder.decode(&chunk[..n], &mut data, &mut replies);
            if !replies.is_empty() {
                let negotiation = std::mem::take(&mut replies);
                self.write_raw(&negotiation).await?;
            }

            let text = String::from_utf8_lossy(&data);
            if done(&*text) {
                return Ok(text.into_owned());
            }
        }
    }

    async fn expect(&mut self, pattern: &str, timeout: Duration) -> TelnetResult<String> {
        self.read_until(timeout, &format!("'{pattern}'"), |text| text.contains(pattern))
            .await
    }
}

/// Strip the echoed command, every known prompt and ANSI escapes from raw CLI output.
pub fn clean_output(raw: &str, command: &str, prompts: &[&str]) -> String {
    let mut output = raw.replace("\r\n", "\n");
    if !command.is_empty() {
        output = output.replacen(command, "", 1);
    }
    for prompt in prompts.iter().filter(|p| !p.is_empty()) {
        output = output.replace(prompt, "");
    }
    ANSI_ESCAPE.replace_all(&output, "").trim().to_string()
}

/// A single Telnet CLI session with the OLT.
pub struct TelnetSession {
    config: TelnetConfig,
    state: parking_lot::Mutex<SessionState>,
    /// Command lock; `None` while disconnected.
    conn: AsyncMutex<Option<Connection>>,
}

impl TelnetSession {
    pub fn new(config: TelnetConfig) -> Self {
        Self {
            config,
            state: parking_lot::Mutex::new(SessionState {
                mode: Mode::Disconnected,
                connected_at: None,
                last_activity: None,
            }),
            conn: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &TelnetConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn is_connected(&self) -> bool {
        self.mode() != Mode::Disconnected
    }

    fn set_mode(&self, mode: Mode) {
        self.state.lock().mode = mode;
    }

    fn touch(&self) {
        self.state.lock().last_activity = Some(Utc::now());
    }

    /// Drop the connection if the last exchange broke it.
    fn settle<T>(&self, slot: &mut Option<Connection>, result: TelnetResult<T>) -> TelnetResult<T> {
        if slot.as_ref().is_some_and(|c| c.broken) {
            warn!("Telnet connection lost, marking session disconnected");
            *slot = None;
            let mut state = self.state.lock();
            state.mode = Mode::Disconnected;
            state.connected_at = None;
        }
        result
    }

    /// Dial the OLT and log in. A session that is already connected is left as is.
    #[instrument(skip(self), fields(address = %self.config.address()))]
    pub async fn connect(&self) -> TelnetResult<()> {
        let mut slot = self.conn.lock().await;
        if slot.is_some() {
            debug!("Telnet already connected");
            return Ok(());
        }

        info!("Connecting to OLT via Telnet");
        let address = self.config.address();
        let stream =
            match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(&address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(TelnetError::connection_failed(format!(
                        "failed to connect to {address}: {e}"
                    )))
                }
                Err(_) => {
                    return Err(TelnetError::connection_failed(format!(
                        "timeout connecting to {address}"
                    )))
                }
            };

        let mut conn = Connection::new(stream, self.config.write_timeout());
        self.touch();
        self.login(&mut conn).await?;

        *slot = Some(conn);
        {
            let mut state = self.state.lock();
            state.mode = Mode::User;
            state.connected_at = Some(Instant::now());
            state.last_activity = Some(Utc::now());
        }
        info!(mode = %Mode::User, "Telnet connection established");
        Ok(())
    }

    async fn login(&self, conn: &mut Connection) -> TelnetResult<()> {
        let timeout = self.config.timeout();

        debug!("Waiting for username prompt");
        conn.expect(&self.config.login_prompt, timeout)
            .await
            .map_err(|_| TelnetError::auth_failed("username prompt not received"))?;
        conn.send_line(&self.config.username).await?;

        debug!("Waiting for password prompt");
        conn.expect(&self.config.password_prompt, timeout)
            .await
            .map_err(|_| TelnetError::auth_failed("password prompt not received"))?;
        conn.send_line(&self.config.password).await?;

        debug!(prompt = %self.config.user_prompt, "Waiting for user prompt");
        conn.expect(&self.config.user_prompt, timeout)
            .await
            .map_err(|_| TelnetError::auth_failed("login failed - user prompt not received"))?;

        info!("Login successful");
        Ok(())
    }

    /// Unwind config mode, say `exit` and close the socket. Never fails;
    /// the session always ends up disconnected.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let mut slot = self.conn.lock().await;
        let mode = self.mode();
        if let Some(mut conn) = slot.take() {
            if mode == Mode::Config && conn.send_line("end").await.is_ok() {
                let _ = conn.expect(&self.config.enable_prompt, CLOSE_UNWIND_TIMEOUT).await;
            }
            let _ = conn.send_line("exit").await;
            if let Err(e) = conn.stream.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
            info!("Telnet connection closed");
        }

        let mut state = self.state.lock();
        state.mode = Mode::Disconnected;
        state.connected_at = None;
    }

    pub async fn reconnect(&self) -> TelnetResult<()> {
        info!("Reconnecting to OLT");
        self.close().await;
        self.connect().await
    }

    /// Enter privileged mode from user mode. No-op in enable or config mode.
    #[instrument(skip(self))]
    pub async fn enter_enable_mode(&self) -> TelnetResult<()> {
        let mut slot = self.conn.lock().await;
        match self.mode() {
            Mode::Enable | Mode::Config => return Ok(()),
            Mode::User => {}
            Mode::Disconnected => {
                return Err(TelnetError::disconnected(
                    "cannot enter enable mode from disconnected mode",
                ))
            }
        }
        let Some(conn) = slot.as_mut() else {
            return Err(TelnetError::disconnected("not connected to OLT"));
        };

        debug!("Entering enable mode");
        let result = self.enable_exchange(conn).await;
        let result = self.settle(&mut slot, result);
        result?;

        self.set_mode(Mode::Enable);
        info!("Entered enable mode");
        Ok(())
    }

    async fn enable_exchange(&self, conn: &mut Connection) -> TelnetResult<()> {
        let timeout = self.config.timeout();
        let password_prompt = self.config.password_prompt.as_str();
        let enable_prompt = self.config.enable_prompt.as_str();

        self.touch();
        conn.send_line("enable").await?;
        let output = conn
            .read_until(timeout, "enable response", |text| {
                text.contains(password_prompt) || text.contains(enable_prompt)
            })
            .await
            .map_err(|_| TelnetError::auth_failed("failed to enter enable mode"))?;

        if output.contains(enable_prompt) {
            return Ok(());
        }

        conn.send_line(&self.config.enable_password).await?;
        conn.expect(enable_prompt, timeout)
            .await
            .map_err(|_| TelnetError::auth_failed("failed to enter enable mode"))?;
        Ok(())
    }

    /// Enter config mode, passing through enable mode first if needed.
    #[instrument(skip(self))]
    pub async fn enter_config_mode(&self) -> TelnetResult<()> {
        match self.mode() {
            Mode::Config => return Ok(()),
            Mode::Enable => {}
            _ => self.enter_enable_mode().await?,
        }

        let mut slot = self.conn.lock().await;
        let Some(conn) = slot.as_mut() else {
            return Err(TelnetError::disconnected("not connected to OLT"));
        };

        debug!("Entering configuration mode");
        self.touch();
        let result = match conn.send_line("configure terminal").await {
            Ok(()) => conn
                .expect(&self.config.config_prompt, self.config.timeout())
                .await
                .map(drop)
                .map_err(|_| TelnetError::command_failed("failed to enter config mode", true)),
            Err(e) => Err(e),
        };
        self.settle(&mut slot, result)?;

        self.set_mode(Mode::Config);
        info!("Entered configuration mode");
        Ok(())
    }

    /// Leave config mode with `end`. No-op outside config mode.
    #[instrument(skip(self))]
    pub async fn exit_config_mode(&self) -> TelnetResult<()> {
        let mut slot = self.conn.lock().await;
        if self.mode() != Mode::Config {
            return Ok(());
        }
        let Some(conn) = slot.as_mut() else {
            return Err(TelnetError::disconnected("not connected to OLT"));
        };

        debug!("Exiting configuration mode");
        self.touch();
        let result = match conn.send_line("end").await {
            Ok(()) => conn
                .expect(&self.config.enable_prompt, self.config.timeout())
                .await
                .map(drop)
                .map_err(|_| TelnetError::command_failed("failed to exit config mode", true)),
            Err(e) => Err(e),
        };
        self.settle(&mut slot, result)?;

        self.set_mode(Mode::Enable);
        info!("Exited configuration mode");
        Ok(())
    }

    /// Send one command and return its output once a prompt comes back.
    #[instrument(skip(self))]
    pub async fn execute(&self, command: &str) -> TelnetResult<TelnetResponse> {
        let mut slot = self.conn.lock().await;
        let Some(conn) = slot.as_mut() else {
            return Err(TelnetError::disconnected("not connected to OLT").with_command(command));
        };

        let started = Instant::now();
        debug!("Executing command");
        self.touch();

        let prompts = self.config.prompts();
        let result = match conn.send_line(command).await {
            Ok(()) => {
                conn.read_until(self.config.read_timeout(), "prompt", |text| {
                    prompts.iter().any(|p| text.contains(p))
                })
                .await
            }
            Err(e) => Err(e),
        };
        let raw = self
            .settle(&mut slot, result)
            .map_err(|e| e.with_command(command))?;
        self.touch();

        let output = clean_output(&raw, command, &prompts);
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Command executed successfully");
        Ok(TelnetResponse::ok(command, output))
    }

    /// Run commands in order. A failed command is recorded and the batch
    /// continues. Cancellation is checked between commands and returns
    /// [`OltError::BatchCancelled`] with the responses gathered so far.
    pub async fn execute_multi(
        &self,
        cancel: &CancellationToken,
        commands: &[String],
    ) -> Result<TelnetBatchResponse> {
        let started = Instant::now();
        let mut responses = Vec::with_capacity(commands.len());

        for command in commands {
            if cancel.is_cancelled() {
                warn!(completed = responses.len(), total = commands.len(), "Command batch cancelled");
                return Err(OltError::BatchCancelled {
                    total: commands.len(),
                    partial: TelnetBatchResponse::new(responses, started.elapsed()),
                });
            }
            let response = match self.execute(command).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(command = %command, error = %e, "Command failed, continuing batch");
                    TelnetResponse::failed(command.as_str(), &e)
                }
            };
            responses.push(response);
        }

        Ok(TelnetBatchResponse::new(responses, started.elapsed()))
    }

    /// Send a command and read until `pattern` appears, for commands that
    /// answer with a confirmation question rather than a prompt.
    #[instrument(skip(self))]
    pub async fn execute_with_expect(
        &self,
        command: &str,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> TelnetResult<TelnetResponse> {
        let mut slot = self.conn.lock().await;
        let Some(conn) = slot.as_mut() else {
            return Err(TelnetError::disconnected("not connected to OLT").with_command(command));
        };

        debug!("Executing command with expect");
        self.touch();
        let timeout = timeout.unwrap_or_else(|| self.config.read_timeout());
        let result = match conn.send_line(command).await {
            Ok(()) => conn.expect(pattern, timeout).await.map_err(|e| {
                if e.code == crate::error::TelnetErrorCode::Timeout {
                    TelnetError::timeout(format!("expected pattern '{pattern}' not found"))
                        .with_raw_output(e.raw_output.unwrap_or_default())
                } else {
                    e
                }
            }),
            Err(e) => Err(e),
        };
        let raw = self
            .settle(&mut slot, result)
            .map_err(|e| e.with_command(command))?;

        let output = clean_output(&raw, command, &self.config.prompts());
        Ok(TelnetResponse::ok(command, output))
    }

    /// Persist the running configuration with `write`.
    #[instrument(skip(self))]
    pub async fn save_config(&self) -> TelnetResult<()> {
        info!("Saving configuration");
        if self.mode() == Mode::Config {
            self.exit_config_mode().await?;
        }

        self.execute("write").await.map_err(|e| {
            TelnetError::config_save_failed(format!("failed to save config: {e}"))
                .with_command("write")
        })?;

        info!("Configuration saved successfully");
        Ok(())
    }

    pub async fn show_running_config(&self) -> TelnetResult<String> {
        Ok(self.execute("show running-config").await?.output)
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let state = self.state.lock();
        ConnectionInfo {
            host: self.config.host.clone(),
            port: self.config.port,
            connected: state.mode != Mode::Disconnected,
            mode: state.mode,
            last_activity: state.last_activity,
            uptime_secs: state
                .connected_at
                .map(|at| at.elapsed().as_secs())
                .unwrap_or(0),
        }
    }
}
