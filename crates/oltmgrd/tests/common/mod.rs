//! Scripted OLT command line for integration tests
//!
//! Listens on a loopback port and plays the Username/Password login, the
//! `enable` / `configure terminal` / `end` mode ladder and a few canned
//! commands:
//!
//! - `slow`: never answers
//! - `late`: answers after [`LATE_REPLY`], past the client's read timeout
//! - `pause`: answers after [`PAUSE_REPLY`], within the read timeout
//! - `drop`: closes the connection
//! - `reboot`: answers with a confirmation question instead of a prompt
//! - `write`, `show running-config`: canned output
//! - anything else: echoes `output of <command>`

#![allow(dead_code)]

use oltmgrd::TelnetConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const ENABLE_PASSWORD: &str = "enable-secret";

pub const RUNNING_CONFIG: &str = "hostname ZXAN\r\ninterface gpon-olt_1/1/1\r\n!";

pub const LATE_REPLY: Duration = Duration::from_millis(1500);
pub const PAUSE_REPLY: Duration = Duration::from_millis(300);

const IAC: u8 = 255;
const DO: u8 = 253;
const ECHO: u8 = 1;

pub struct FakeOlt {
    pub port: u16,
    logins: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeOlt {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake OLT");
        let port = listener.local_addr().expect("local addr").port();
        let logins = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let logins = Arc::clone(&logins);
            let commands = Arc::clone(&commands);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let logins = Arc::clone(&logins);
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        let _ = serve(stream, logins, commands).await;
                    });
                }
            })
        };

        Self {
            port,
            logins,
            commands,
            task,
        }
    }

    /// Client settings pointing at this server, with short timeouts.
    pub fn config(&self) -> TelnetConfig {
        TelnetConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            enable_password: ENABLE_PASSWORD.to_string(),
            timeout_secs: 2,
            connect_timeout_secs: 2,
            read_timeout_secs: 1,
            write_timeout_secs: 2,
            retry_count: 2,
            retry_delay_secs: 0,
            acquire_timeout_secs: 1,
            ..TelnetConfig::default()
        }
    }

    /// Successful logins so far.
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Every line received after login, across all connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl Drop for FakeOlt {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Level {
    User,
    Enable,
    Config,
}

impl Level {
    fn prompt(self) -> &'static str {
        match self {
            Level::User => "ZXAN>",
            Level::Enable => "ZXAN#",
            Level::Config => "ZXAN(config)#",
        }
    }
}

/// Next input line with negotiation replies and line endings removed.
async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw).await? == 0 {
        return Ok(None);
    }

    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == IAC {
            i += 3;
            continue;
        }
        bytes.push(raw[i]);
        i += 1;
    }
    let line = String::from_utf8_lossy(&bytes);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn reply(writer: &mut OwnedWriteHalf, echo: &str, body: &str, level: Level) -> std::io::Result<()> {
    let mut out = format!("{echo}\r\n");
    if !body.is_empty() {
        out.push_str(body);
        out.push_str("\r\n");
    }
    out.push_str(level.prompt());
    writer.write_all(out.as_bytes()).await
}

async fn serve(
    stream: TcpStream,
    logins: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    writer.write_all(&[IAC, DO, ECHO]).await?;
    writer.write_all(b"\r\nUsername:").await?;
    let Some(username) = read_line(&mut reader).await? else {
        return Ok(());
    };
    writer.write_all(b"\r\nPassword:").await?;
    let Some(password) = read_line(&mut reader).await? else {
        return Ok(());
    };
    if username != USERNAME || password != PASSWORD {
        writer.write_all(b"\r\n% Authentication failed\r\n").await?;
        return Ok(());
    }

    logins.fetch_add(1, Ordering::SeqCst);
    let mut level = Level::User;
    writer.write_all(b"\r\n\x1b[1mWelcome\x1b[0m\r\nZXAN>").await?;

    while let Some(line) = read_line(&mut reader).await? {
        commands.lock().push(line.clone());

        match (line.as_str(), level) {
            ("enable", Level::User) => {
                writer.write_all(b"enable\r\nPassword:").await?;
                let Some(secret) = read_line(&mut reader).await? else {
                    return Ok(());
                };
                if secret != ENABLE_PASSWORD {
                    writer.write_all(b"\r\n% Access denied\r\n").await?;
                    return Ok(());
                }
                level = Level::Enable;
                writer.write_all(b"\r\nZXAN#").await?;
            }
            ("configure terminal", Level::Enable) => {
                level = Level::Config;
                reply(&mut writer, &line, "", level).await?;
            }
            ("end", Level::Config) => {
                level = Level::Enable;
                reply(&mut writer, &line, "", level).await?;
            }
            ("exit", _) | ("drop", _) => return Ok(()),
            ("slow", _) => {}
            ("late", _) => {
                tokio::time::sleep(LATE_REPLY).await;
                reply(&mut writer, &line, "output of late", level).await?;
            }
            ("pause", _) => {
                tokio::time::sleep(PAUSE_REPLY).await;
                reply(&mut writer, &line, "output of pause", level).await?;
            }
            ("reboot", _) => {
                writer
                    .write_all(b"reboot\r\nConfirm to reboot? [yes/no]:")
                    .await?;
            }
            ("write", Level::Enable) => {
                reply(&mut writer, &line, "Building configuration...\r\n[OK]", level).await?;
            }
            ("write", _) => {
                reply(&mut writer, &line, "%Error 20200: Invalid input", level).await?;
            }
            ("show running-config", _) => {
                reply(&mut writer, &line, RUNNING_CONFIG, level).await?;
            }
            (other, _) => {
                let body = format!("output of {other}");
                reply(&mut writer, &line, &body, level).await?;
            }
        }
    }
    Ok(())
}
