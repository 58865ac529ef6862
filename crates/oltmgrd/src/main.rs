//! oltmgrd command line
//!
//! Loads the configuration, wires the SNMP poller and the Telnet session
//! manager, runs one operation against the OLT and prints the result as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use olt_types::{initialize_board_pon_map, BoardPonMap};
use oltmgrd::config::DEFAULT_CONFIG_PATH;
use oltmgrd::{
    CacheStore, MemoryCache, OltError, OltmgrConfig, OnuPoller, PollerSettings, RedisCache,
    SessionManager, UdpSnmpClient,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// GPON OLT management over SNMP and Telnet
#[derive(Parser, Debug)]
#[command(name = "oltmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the table OIDs of one board/PON
    Oids { board: u8, pon: u8 },

    /// List the ONUs on a PON
    Onus {
        board: u8,
        pon: u8,
        /// 1-based page; lists everything when omitted
        #[arg(long)]
        page: Option<usize>,
        #[arg(long, default_value = "10")]
        page_size: usize,
    },

    /// Show every field of one ONU
    Onu { board: u8, pon: u8, onu: u32 },

    /// List the free ONU IDs on a PON
    EmptyIds {
        board: u8,
        pon: u8,
        /// Re-walk the PON instead of reading the cache
        #[arg(long)]
        refresh: bool,
    },

    /// List ONU IDs with their serial numbers
    Serials { board: u8, pon: u8 },

    /// Drop the cached entries of a PON
    Invalidate { board: u8, pon: u8 },

    /// Run CLI commands on the OLT
    Exec {
        #[arg(required = true)]
        commands: Vec<String>,
        /// Run the commands in config mode
        #[arg(long)]
        config_mode: bool,
        /// Read the output of a single command until this text appears
        #[arg(long, conflicts_with = "config_mode")]
        expect: Option<String>,
        /// Read timeout for --expect, in seconds
        #[arg(long, requires = "expect")]
        expect_timeout: Option<u64>,
        /// Retry the commands, reconnecting between attempts
        #[arg(long)]
        retry: bool,
    },

    /// Save the running configuration
    Save,

    /// Print the running configuration
    RunningConfig,

    /// Show the Telnet session status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = OltmgrConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!(firmware = %config.olt.firmware, "oltmgrd: Configuration loaded");

    let cancel = setup_signal_handler();

    match run(config, args.command, &cancel).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "oltmgrd: Operation failed");
            Err(e)
        }
    }
}

/// Human-readable logs on stderr, filtered by RUST_LOG when it is set
fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))
}

/// Cancel in-flight work on SIGINT
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("oltmgrd: Received SIGINT, cancelling");
            token.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn board_pon_map(config: &OltmgrConfig) -> anyhow::Result<Arc<BoardPonMap>> {
    let map = initialize_board_pon_map(config.olt.firmware.profile())
        .context("building board/PON OID map")?;
    map.validate()?;
    Ok(Arc::new(map))
}

async fn cache_store(config: &OltmgrConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if !config.redis.enabled {
        info!("oltmgrd: Redis disabled, using in-process cache");
        return Ok(Arc::new(MemoryCache::new()));
    }
    match RedisCache::connect(&config.redis).await {
        Ok(redis) => Ok(Arc::new(redis)),
        Err(e) => {
            warn!(error = %e, "oltmgrd: Redis unavailable, using in-process cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

async fn poller(config: &OltmgrConfig) -> anyhow::Result<OnuPoller> {
    let oids = board_pon_map(config)?;
    let cache = cache_store(config).await?;
    let snmp = Arc::new(UdpSnmpClient::new(&config.snmp));
    Ok(OnuPoller::new(
        snmp,
        cache,
        oids,
        PollerSettings::from(&config.olt),
    ))
}

async fn run(config: OltmgrConfig, command: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Oids { board, pon } => {
            let map = board_pon_map(&config)?;
            print_json(map.get(board, pon)?)
        }
        Command::Onus {
            board,
            pon,
            page,
            page_size,
        } => {
            let poller = poller(&config).await?;
            match page {
                Some(page) => print_json(
                    &poller
                        .list_onus_paginated(cancel, board, pon, page, page_size)
                        .await?,
                ),
                None => print_json(&poller.list_onus(cancel, board, pon).await?),
            }
        }
        Command::Onu { board, pon, onu } => {
            let poller = poller(&config).await?;
            print_json(&poller.onu_detail(cancel, board, pon, onu).await?)
        }
        Command::EmptyIds {
            board,
            pon,
            refresh,
        } => {
            let poller = poller(&config).await?;
            let ids = if refresh {
                poller.refresh_empty_onu_ids(cancel, board, pon).await?
            } else {
                poller.empty_onu_ids(cancel, board, pon).await?
            };
            print_json(&ids)
        }
        Command::Serials { board, pon } => {
            let poller = poller(&config).await?;
            print_json(&poller.onu_serial_numbers(cancel, board, pon).await?)
        }
        Command::Invalidate { board, pon } => {
            let poller = poller(&config).await?;
            poller.invalidate(board, pon).await?;
            info!(board, pon, "oltmgrd: Cache invalidated");
            Ok(())
        }
        telnet_command => {
            config.telnet.validate()?;
            let manager = SessionManager::new(config.telnet.clone());
            let result = run_telnet(&manager, telnet_command, cancel).await;
            manager.close().await;
            result
        }
    }
}

async fn run_telnet(
    manager: &SessionManager,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Exec {
            commands,
            expect: Some(pattern),
            expect_timeout,
            ..
        } => {
            let [command] = commands.as_slice() else {
                anyhow::bail!("--expect takes exactly one command");
            };
            let timeout = expect_timeout.map(Duration::from_secs);
            print_json(
                &manager
                    .execute_with_expect(cancel, command, &pattern, timeout)
                    .await?,
            )
        }
        Command::Exec {
            commands,
            config_mode,
            retry,
            ..
        } => {
            let result = if retry {
                manager
                    .with_retry(cancel, || async {
                        if config_mode {
                            manager.execute_in_config_mode(cancel, &commands).await
                        } else {
                            manager.execute_commands(cancel, &commands).await
                        }
                    })
                    .await
            } else if config_mode {
                manager.execute_in_config_mode(cancel, &commands).await
            } else {
                manager.execute_commands(cancel, &commands).await
            };
            let batch = match result {
                Ok(batch) => batch,
                Err(OltError::BatchCancelled { total, partial }) => {
                    print_json(&partial)?;
                    anyhow::bail!(
                        "command batch cancelled after {} of {} commands",
                        partial.responses.len(),
                        total
                    );
                }
                Err(e) => return Err(e.into()),
            };
            if !batch.success {
                warn!(failed = batch.failed_count(), "oltmgrd: Some commands failed");
            }
            print_json(&batch)
        }
        Command::Save => {
            manager.save_configuration(cancel).await?;
            info!("oltmgrd: Configuration saved");
            Ok(())
        }
        Command::RunningConfig => {
            println!("{}", manager.show_running_config(cancel).await?);
            Ok(())
        }
        Command::Status => print_json(&manager.connection_status()),
        other => anyhow::bail!("not a Telnet command: {:?}", other),
    }
}
