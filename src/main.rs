//! PLC Pulse - Main Entry Point
//!
//! Headless console front-end: opens the bridge channel and the cloud store,
//! then takes commands on stdin and prints notices as they arrive.

use std::sync::Arc;

use anyhow::Context;
use plc_pulse::app::Session;
use plc_pulse::domain::config::{AppConfig, LoggingConfig};
use plc_pulse::domain::profile::{DeviceProfile, LinkSettings, RtuSettings};
use plc_pulse::helpers::get_or_create_data_dir;
use plc_pulse::services::cloud::{MemoryStore, RemoteStore, RestStore};
use plc_pulse::services::connector_for;
use plc_pulse::utils::{load_config, save_config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const HELP: &str = "\
commands:
  connect                                  connect with the configured profile
  connect tcp <ip> <port> [coil] [unit]    connect to a Modbus TCP device
  connect rtu <port> <baud> [coil] [unit]  connect to a Modbus RTU device
  disconnect                               close the device link
  save                                     save the active profile to the cloud
  remember                                 make the active profile the default in config.toml
  status                                   show connection, current value and stats
  profiles                                 list saved profiles
  quit                                     exit";

enum Input {
    Event(Option<plc_pulse::eventing::AppEvent>),
    Line(std::io::Result<Option<String>>),
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = load_config().context("Failed to load config.toml")?;
    let _guard = init_tracing(&config.logging)?;

    tracing::info!("Starting PLC Pulse...");

    let connector = connector_for(&config.bridge.endpoint, config.bridge.retry.clone().into());
    let store: Arc<dyn RemoteStore> = if config.cloud.enabled {
        Arc::new(RestStore::new(&config.cloud).context("Failed to create cloud client")?)
    } else {
        tracing::warn!("Cloud sync disabled, profiles are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    let mut session = Session::new(connector, store);
    session.start(&config.bridge.endpoint);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            event = session.next_event() => Input::Event(event),
            line = lines.next_line() => Input::Line(line),
            _ = tokio::signal::ctrl_c() => Input::Quit,
        };

        let keep_going = match input {
            Input::Event(Some(event)) => {
                session.handle(event);
                session.drain();
                true
            }
            Input::Event(None) | Input::Quit => false,
            Input::Line(line) => match line.context("Failed to read stdin")? {
                Some(line) => run_command(&mut session, &mut config, line.trim()),
                None => false,
            },
        };

        for notice in session.take_notices() {
            println!("{}", notice);
        }
        if !keep_going {
            break;
        }
    }

    session.shutdown();
    tracing::info!("PLC Pulse stopped");
    Ok(())
}

/// Console output plus an optional daily log file in the data directory
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    let (file_layer, guard) = if logging.file {
        let dir = get_or_create_data_dir().context("Failed to create data directory")?;
        let appender = tracing_appender::rolling::daily(dir, "plc-pulse.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Run one console command; returns false to quit
fn run_command(session: &mut Session, config: &mut AppConfig, line: &str) -> bool {
    let args: Vec<&str> = line.split_whitespace().collect();
    match args.as_slice() {
        [] => {}
        ["connect"] => {
            let _ = session.connect(config.profile_or_default());
        }
        ["connect", rest @ ..] => match profile_from_args(&config.profile_or_default(), rest) {
            Ok(profile) => {
                let _ = session.connect(profile);
            }
            Err(message) => println!("{}", message),
        },
        ["disconnect"] => session.disconnect(),
        ["save"] => {
            let _ = session.save_active_profile();
        }
        ["remember"] => remember_active(session, config),
        ["status"] => print_status(session),
        ["profiles"] => print_profiles(session),
        ["quit"] | ["exit"] => return false,
        ["help"] => println!("{}", HELP),
        _ => println!("unknown command: {} (try 'help')", line),
    }
    true
}

/// Build a profile from `connect tcp|rtu ...` arguments. Coil, unit, logging
/// and serial framing come from `base` unless overridden.
fn profile_from_args(base: &DeviceProfile, args: &[&str]) -> Result<DeviceProfile, String> {
    let (link, overrides) = match args {
        ["tcp", ip, port, rest @ ..] => {
            let port = port.parse().map_err(|_| format!("invalid port: {}", port))?;
            (DeviceProfile::tcp(*ip, port).link, rest)
        }
        ["rtu", com_port, baud, rest @ ..] => {
            let baud_rate = baud.parse().map_err(|_| format!("invalid baud rate: {}", baud))?;
            let framing = match &base.link {
                LinkSettings::Rtu(rtu) => rtu.clone(),
                LinkSettings::Tcp(_) => RtuSettings::default(),
            };
            let link = LinkSettings::Rtu(RtuSettings {
                com_port: com_port.to_string(),
                baud_rate,
                ..framing
            });
            (link, rest)
        }
        _ => return Err("usage: connect tcp <ip> <port> [coil] [unit] | connect rtu <port> <baud> [coil] [unit]".to_string()),
    };

    let (coil_address, unit_id) = match overrides {
        [] => (base.coil_address, base.unit_id),
        [coil] => (parse_coil(coil)?, base.unit_id),
        [coil, unit] => (
            parse_coil(coil)?,
            unit.parse().map_err(|_| format!("invalid unit id: {}", unit))?,
        ),
        _ => return Err("too many arguments (try 'help')".to_string()),
    };

    Ok(DeviceProfile {
        link,
        coil_address,
        unit_id,
        enable_logging: base.enable_logging,
        id: None,
        created_at: None,
    })
}

fn parse_coil(raw: &str) -> Result<u16, String> {
    raw.parse().map_err(|_| format!("invalid coil address: {}", raw))
}

/// Store the active profile as the default in the local config file
fn remember_active(session: &Session, config: &mut AppConfig) {
    let Some(profile) = session.config().active() else {
        println!("no active profile (connect first)");
        return;
    };

    let previous = config.profile.replace(profile.clone());
    match save_config(config) {
        Ok(()) => println!("default profile set to {} {}", profile.link.label(), profile.address()),
        Err(e) => {
            config.profile = previous;
            tracing::error!("Failed to write config: {}", e);
            println!("failed to write config: {}", e);
        }
    }
}

fn print_status(session: &Session) {
    let data = session.data();
    let stats = data.stats();

    println!("device:  {}", session.status());
    println!(
        "server:  {}",
        if session.machine().channel_open() { "open" } else { "closed" }
    );
    println!(
        "cloud:   {}",
        if session.config().cloud_reachable() { "reachable" } else { "unreachable" }
    );
    if let Some(profile) = session.config().active() {
        println!("profile: {} {}", profile.link.label(), profile.address());
    }
    match data.current() {
        Some(sample) => println!("current: {}", sample),
        None => println!("current: no data yet"),
    }
    println!(
        "samples: {} total, {} on ({:.1}%)",
        stats.total, stats.true_count, stats.true_percentage
    );

    let window: String = data
        .chart_window()
        .iter()
        .map(|s| if s.value { '#' } else { '_' })
        .collect();
    if !window.is_empty() {
        println!("recent:  {}", window);
    }
}

fn print_profiles(session: &Session) {
    let (shown, more) = session.config().saved_preview();
    if shown.is_empty() {
        println!("no saved profiles");
        return;
    }
    for profile in shown {
        println!(
            "  {} {} coil {} unit {}",
            profile.link.label(),
            profile.address(),
            profile.coil_address,
            profile.unit_id
        );
    }
    if more > 0 {
        println!("  ... and {} more", more);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_args_keep_configured_coil_and_unit() {
        let mut base = DeviceProfile::rtu("COM1", 9600).with_coil(7, 3);
        base.enable_logging = false;
        if let LinkSettings::Rtu(rtu) = &mut base.link {
            rtu.stop_bits = 2;
        }

        let tcp = profile_from_args(&base, &["tcp", "10.0.0.9", "502"]).expect("tcp");
        assert_eq!(tcp.address(), "10.0.0.9:502");
        assert_eq!((tcp.coil_address, tcp.unit_id), (7, 3));
        assert!(!tcp.enable_logging);

        let rtu = profile_from_args(&base, &["rtu", "COM4", "19200"]).expect("rtu");
        let LinkSettings::Rtu(settings) = &rtu.link else {
            panic!("expected rtu link");
        };
        assert_eq!(settings.com_port, "COM4");
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.stop_bits, 2);
        assert_eq!((rtu.coil_address, rtu.unit_id), (7, 3));
    }

    #[test]
    fn test_connect_args_overrides_and_errors() {
        let base = DeviceProfile::default();

        let profile = profile_from_args(&base, &["tcp", "10.0.0.9", "502", "12"]).expect("coil");
        assert_eq!((profile.coil_address, profile.unit_id), (12, 1));
        let profile =
            profile_from_args(&base, &["rtu", "COM2", "9600", "4", "9"]).expect("coil and unit");
        assert_eq!((profile.coil_address, profile.unit_id), (4, 9));
        assert!(profile.id.is_none());

        assert!(profile_from_args(&base, &["tcp", "10.0.0.9", "http"]).is_err());
        assert!(profile_from_args(&base, &["tcp", "10.0.0.9", "502", "x"]).is_err());
        assert!(profile_from_args(&base, &["tcp", "10.0.0.9", "502", "1", "2", "3"]).is_err());
        assert!(profile_from_args(&base, &["serial", "COM1"]).is_err());
    }
}
