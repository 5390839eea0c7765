//! `simbridge` – runs one simulation bridge node.
//!
//! 1. Loads `~/.simbridge/config.toml` (or `--config <path>`); on first run
//!    the defaults are written there.
//! 2. Starts the WebSocket bridge so external clients can publish wheel and
//!    joystick commands and receive the JPEG stream.
//! 3. Starts the node: command handlers plus the 30 Hz simulation loop
//!    driving the built-in kinematic simulator.
//! 4. Intercepts **Ctrl-C** to stop the loop at its next tick boundary.
//!
//! Exits with status 1 when the node stops on a fatal error.

mod config;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use simbridge_hal::KinematicSim;
use simbridge_middleware::{EventBus, WsBridge};
use simbridge_runtime::{SimulationWrapperNode, init_tracing};
use simbridge_types::BridgeError;

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| format!("{arg} needs a file path"))?;
                parsed.config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => parsed.help = true,
            other => match other.strip_prefix("--config=") {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => return Err(format!("unknown argument {other:?}")),
            },
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!("Usage: simbridge [--config <path>]");
    println!();
    println!("  -c, --config <path>   Config file (default: ~/.simbridge/config.toml)");
    println!("  -h, --help            Show this help");
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "Argument error".red(), e);
            print_usage();
            return ExitCode::from(2);
        }
    };
    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let _guard = init_tracing("simbridge");
    print_banner();

    let cfg = match load_config(args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cfg)) {
        Ok(ticks) => {
            println!("{}", format!("  ✓ Node stopped after {ticks} ticks.").green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "node terminated");
            eprintln!("{}: {}", "Fatal".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve, load and validate the configuration.
fn load_config(explicit: Option<PathBuf>) -> Result<config::Config, String> {
    let path = explicit.clone().unwrap_or_else(config::config_path);
    if explicit.is_some() && !path.exists() {
        return Err(format!("{} does not exist", path.display()));
    }

    if explicit.is_none() && !path.exists() {
        match config::save_to(&config::Config::default(), &path) {
            Ok(()) => println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "could not write default config"),
        }
    } else {
        println!(
            "  Config loaded from {}",
            path.display().to_string().bold()
        );
    }

    let cfg = config::load_from(&path)?;
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(cfg)
}

/// Start the bridge and the node, then wait for the loop to exit.
async fn run(cfg: config::Config) -> Result<u64, BridgeError> {
    let bus = EventBus::default();
    let bridge_addr = cfg.bridge_socket_addr()?;

    let map = cfg.simulator.map_name.clone();
    let engine = KinematicSim::new(cfg.simulator)?;
    let node = SimulationWrapperNode::new(cfg.node, bus.clone(), engine)?;
    let topics = node.topics().clone();

    let handle = node.start()?;
    let stop = handle.stop_handle();

    // ── WebSocket bridge ──────────────────────────────────────────────────
    let bridge = WsBridge::new(
        bus.clone(),
        topics.wheel_cmd.clone(),
        topics.joy.clone(),
        topics.image.clone(),
    );
    let bridge_stop = stop.clone();
    let bridge_failure: Arc<OnceLock<BridgeError>> = Arc::new(OnceLock::new());
    let bridge_failure_slot = Arc::clone(&bridge_failure);
    tokio::spawn(async move {
        if let Err(e) = bridge.run(bridge_addr).await {
            error!(error = %e, "WebSocket bridge failed; stopping node");
            let _ = bridge_failure_slot.set(e);
            bridge_stop.stop();
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping at the next tick …".yellow().bold());
        ctrlc_stop.stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process with SIGKILL instead");
    }

    println!("  Map:        {}", map.bold());
    println!("  Bridge:     {}", format!("ws://{bridge_addr}").cyan());
    println!("  Wheel cmd:  {}", topics.wheel_cmd);
    println!("  Joystick:   {}", topics.joy);
    println!("  Images:     {}", topics.image);
    println!();
    info!("press Ctrl-C to stop");

    let ticks = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| BridgeError::engine("loop", format!("join failed: {e}")))??;

    // A bridge failure stops the loop cleanly; it is still fatal.
    match bridge_failure.get() {
        Some(e) => Err(e.clone()),
        None => Ok(ticks),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ _           ____       _     __         "#.bold().cyan());
    println!("{}", r#"  / ___/(_)___ ___  / __ )_____(_)___/ /___ ____ "#.bold().cyan());
    println!("{}", r#"  \__ \/ / __ `__ \/ __  / ___/ / __  / __ `/ _ \"#.bold().cyan());
    println!("{}", r#" ___/ / / / / / / / /_/ / /  / / /_/ / /_/ /  __/"#.bold().cyan());
    println!("{}", r#"/____/_/_/ /_/ /_/_____/_/  /_/\__,_/\__, /\___/ "#.bold().cyan());
    println!("{}", r#"                                    /____/       "#.bold().cyan());
    println!();
    println!("  {} {}",
        "SimBridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Simulator ↔ robot middleware bridge");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_uses_default_path() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn config_flag_forms() {
        let expected = Some(PathBuf::from("/etc/simbridge.toml"));
        assert_eq!(args(&["--config", "/etc/simbridge.toml"]).unwrap().config, expected);
        assert_eq!(args(&["-c", "/etc/simbridge.toml"]).unwrap().config, expected);
        assert_eq!(args(&["--config=/etc/simbridge.toml"]).unwrap().config, expected);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--turbo"]).is_err());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(missing)).is_err());
    }

    #[test]
    fn explicit_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[node]\nimage_queue_size = 0\n").unwrap();
        assert!(load_config(Some(path)).is_err());
    }
}
