use clap::{ArgAction, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use potbridge::bridge::{list_ports, BridgeHandle, RunSummary, SerialConnector};
use potbridge::config::BridgeConfig;
use potbridge::telemetry::WireFormat;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "potbridge", version, about = "Serial pot/switch telemetry to virtual joystick bridge")]
struct Cli {
    /// Config file, defaults to ~/.config/potbridge/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge until Ctrl-C (default)
    Run {
        /// Serial port, overrides the config file
        #[arg(short, long)]
        port: Option<String>,

        #[arg(short, long)]
        baud: Option<u32>,

        /// Wire format: text or binary
        #[arg(short, long)]
        format: Option<WireFormat>,

        /// Log telemetry snapshots once per second
        #[arg(short, long)]
        monitor: bool,
    },
    /// List serial ports
    ListPorts,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let config_path = cli.config.unwrap_or_else(BridgeConfig::default_path);

    match cli.command.unwrap_or(Command::Run {
        port: None,
        baud: None,
        format: None,
        monitor: false,
    }) {
        Command::Run {
            port,
            baud,
            format,
            monitor,
        } => {
            let mut config = BridgeConfig::load_or_default(&config_path).await?;
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baud) = baud {
                config.serial.baud = baud;
            }
            if let Some(format) = format {
                config.serial.wire_format = format;
            }
            config.validate()?;
            run(config, monitor).await
        }
        Command::ListPorts => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}\t{}", port.name, port.description);
            }
            Ok(())
        }
        Command::PrintConfig => {
            let config = BridgeConfig::load_or_default(&config_path).await?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: BridgeConfig, monitor: bool) -> Result<()> {
    let mut handle = BridgeHandle::spawn(config, Box::new(SerialConnector::new()));

    let mut status = handle.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!("Bridge {}", current);
        }
    });

    if monitor {
        let mut telemetry = handle.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                match telemetry.has_changed() {
                    Ok(true) => {
                        let snapshot = telemetry.borrow_and_update().clone();
                        info!(
                            "pots={:?} switches={:?} cal={} at {}",
                            snapshot.pots,
                            snapshot.switches,
                            snapshot.calibration,
                            snapshot.timestamp.format("%H:%M:%S%.3f")
                        );
                    }
                    Ok(false) => debug!("No new telemetry"),
                    Err(_) => break,
                }
            }
        });
    }

    let finished = tokio::select! {
        result = handle.wait() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Ctrl-C received, shutting down");
            handle.stop().await
        }
    };

    let summary = result.map_err(|e| eyre!("Bridge failed: {}", e))?;
    report(&summary);
    Ok(())
}

fn report(summary: &RunSummary) {
    info!(
        "{} frames, {} key taps, {} idle periods ({} warnings)",
        summary.frames, summary.key_taps, summary.idle_entries, summary.idle_warnings
    );
    if summary.key_failures > 0 {
        warn!("{} key taps failed", summary.key_failures);
    }
    if summary.decode.dropped() > 0 {
        warn!(
            "Dropped input: {} field count, {} non-integer, {} bad length, {} crc, {} payload size, {} overflow",
            summary.decode.field_count,
            summary.decode.non_integer,
            summary.decode.bad_length,
            summary.decode.crc_mismatch,
            summary.decode.payload_size,
            summary.decode.overflow
        );
    }
}

fn setup(verbose: u8) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(verbose);
    Ok(())
}

fn setup_logging_env(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
