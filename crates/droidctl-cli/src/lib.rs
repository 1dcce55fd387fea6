//! droidctl CLI - subcommands over the adb bridge
//!
//! One subcommand per bridge operation. Structured results (devices,
//! apps, hierarchies, logs) render as JSON on stdout; logging goes to
//! stderr so output stays pipeable.
//!
//! # Usage
//!
//! ```bash
//! # List connected devices
//! droidctl devices
//!
//! # Dump the UI hierarchy of the first connected device
//! droidctl dump
//!
//! # Find clickable elements by text, on a specific device
//! droidctl -s emulator-5554 find --text "Sign in"
//!
//! # Tap, type, press enter
//! droidctl tap 540 1200
//! droidctl text "hello world"
//! droidctl key enter
//!
//! # Enable debug logging
//! RUST_LOG=droidctl_adb=debug droidctl devices
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use droidctl_adb::{keycodes, Bridge, BridgeConfig, IntentSpec};
use droidctl_core::{LogPriority, UiNode};
use droidctl_dump::{find_by_class, find_by_id, find_by_text};

/// droidctl - remote control and UI introspection for Android devices
#[derive(Parser, Debug)]
#[command(name = "droidctl", version, about)]
pub struct Args {
    /// Target device serial; defaults to the first connected device
    #[arg(short = 's', long = "serial", global = true)]
    device: Option<String>,

    /// Path to the adb executable (otherwise resolved from PATH and
    /// common SDK locations)
    #[arg(long, global = true)]
    adb: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected devices
    Devices,
    /// List installed packages
    Apps {
        /// Include system packages
        #[arg(long)]
        all: bool,
    },
    /// Run a shell command on the device
    Shell {
        /// The command and its arguments
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Dump the UI hierarchy as JSON
    Dump {
        /// Capture enhanced view attributes (slower; toggles a device
        /// debug setting around the dump)
        #[arg(long)]
        attrs: bool,
    },
    /// Search the UI hierarchy for matching nodes
    Find {
        /// Match nodes by exact resource id
        #[arg(long)]
        id: Option<String>,
        /// Match nodes by text
        #[arg(long)]
        text: Option<String>,
        /// Match nodes by class-name substring
        #[arg(long)]
        class: Option<String>,
        /// With --text: require exact equality instead of
        /// case-insensitive containment
        #[arg(long)]
        exact: bool,
    },
    /// Show the foreground activity
    Activity,
    /// Capture the screen as a PNG file
    Screenshot {
        /// Output file
        #[arg(short, long, default_value = "screenshot.png")]
        output: PathBuf,
    },
    /// Tap at screen coordinates
    Tap { x: i32, y: i32 },
    /// Long-press at screen coordinates
    LongPress {
        x: i32,
        y: i32,
        /// Press duration in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },
    /// Swipe between two points
    Swipe {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        /// Gesture duration in milliseconds
        #[arg(long, default_value_t = 300)]
        duration_ms: u64,
    },
    /// Drag and drop between two points
    Drag {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        /// Gesture duration in milliseconds
        #[arg(long, default_value_t = 300)]
        duration_ms: u64,
    },
    /// Type text into the focused element
    Text { text: String },
    /// Send a key event by name (enter, back, home, ...) or numeric code
    Key { key: String },
    /// Launch an app by package name
    Launch { package: String },
    /// Start an activity via an intent
    Intent {
        /// Intent action, e.g. android.intent.action.VIEW
        #[arg(short, long)]
        action: Option<String>,
        /// Intent category
        #[arg(short, long)]
        category: Option<String>,
        /// Data URI
        #[arg(short, long)]
        data: Option<String>,
        /// Target package
        #[arg(short, long)]
        package: Option<String>,
        /// Target activity class within the package
        #[arg(long)]
        class: Option<String>,
        /// String extra as key=value; repeatable
        #[arg(short = 'e', long = "extra", value_parser = parse_extra)]
        extras: Vec<(String, String)>,
    },
    /// Show recent log records
    Logs {
        /// Only records from this package
        #[arg(short, long)]
        package: Option<String>,
        /// Number of records to fetch
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: u32,
        /// Minimum priority (verbose, debug, info, warn, error, fatal)
        #[arg(long, value_parser = parse_priority)]
        priority: Option<LogPriority>,
    },
    /// Clear the device log buffer
    ClearLogs,
}

fn parse_extra(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn parse_priority(raw: &str) -> std::result::Result<LogPriority, String> {
    match raw.to_ascii_lowercase().as_str() {
        "v" | "verbose" => Ok(LogPriority::Verbose),
        "d" | "debug" => Ok(LogPriority::Debug),
        "i" | "info" => Ok(LogPriority::Info),
        "w" | "warn" | "warning" => Ok(LogPriority::Warn),
        "e" | "error" => Ok(LogPriority::Error),
        "f" | "fatal" => Ok(LogPriority::Fatal),
        other => Err(format!("unknown priority '{other}'")),
    }
}

/// CLI entry point: parse arguments, run one operation, tear down.
pub async fn run() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = match &args.adb {
        Some(path) => BridgeConfig::with_command(path),
        None => BridgeConfig::default(),
    };
    let bridge = Bridge::new(config);

    let result = dispatch(&bridge, &args).await;
    bridge.cleanup().await;
    result
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("droidctl_adb=warn".parse()?)
                .add_directive("droidctl_dump=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn dispatch(bridge: &Bridge, args: &Args) -> Result<()> {
    let device = args.device.as_deref();

    match &args.command {
        Command::Devices => {
            let devices = bridge.devices().await?;
            print_json(&devices)
        }
        Command::Apps { all } => {
            let apps = bridge.app_list(device, *all).await?;
            print_json(&apps)
        }
        Command::Shell { command } => {
            let result = bridge.shell(device, &command.join(" ")).await?;
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr);
            }
            Ok(())
        }
        Command::Dump { attrs } => {
            let hierarchy = if *attrs {
                bridge.view_attributes(device).await?
            } else {
                bridge.view_hierarchy(device).await?
            };
            print_json(&hierarchy)
        }
        Command::Find {
            id,
            text,
            class,
            exact,
        } => {
            let hierarchy = bridge.view_hierarchy(device).await?;
            let matches: Vec<&UiNode> = match (id, text, class) {
                (Some(id), None, None) => find_by_id(&hierarchy.root, id),
                (None, Some(text), None) => find_by_text(&hierarchy.root, text, *exact),
                (None, None, Some(class)) => find_by_class(&hierarchy.root, class),
                _ => bail!("find requires exactly one of --id, --text or --class"),
            };
            debug!(count = matches.len(), "search finished");
            print_json(&matches)
        }
        Command::Activity => {
            let activity = bridge.current_activity(device).await?;
            match activity {
                Some(activity) => print_json(&activity),
                None => bail!("could not determine the foreground activity"),
            }
        }
        Command::Screenshot { output } => {
            let png = bridge.screenshot(device).await?;
            std::fs::write(output, &png)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{} ({} bytes)", output.display(), png.len());
            Ok(())
        }
        Command::Tap { x, y } => {
            bridge.tap(device, *x, *y).await?;
            Ok(())
        }
        Command::LongPress { x, y, duration_ms } => {
            bridge
                .long_press(device, *x, *y, Some(Duration::from_millis(*duration_ms)))
                .await?;
            Ok(())
        }
        Command::Swipe {
            start_x,
            start_y,
            end_x,
            end_y,
            duration_ms,
        } => {
            bridge
                .swipe(
                    device,
                    *start_x,
                    *start_y,
                    *end_x,
                    *end_y,
                    Some(Duration::from_millis(*duration_ms)),
                )
                .await?;
            Ok(())
        }
        Command::Drag {
            start_x,
            start_y,
            end_x,
            end_y,
            duration_ms,
        } => {
            bridge
                .drag(
                    device,
                    *start_x,
                    *start_y,
                    *end_x,
                    *end_y,
                    Some(Duration::from_millis(*duration_ms)),
                )
                .await?;
            Ok(())
        }
        Command::Text { text } => {
            bridge.input_text(device, text).await?;
            Ok(())
        }
        Command::Key { key } => {
            let code = match key.parse::<i32>() {
                Ok(code) => code,
                Err(_) => keycodes::from_name(key)
                    .with_context(|| format!("unknown key '{key}'"))?,
            };
            bridge.key_event(device, code).await?;
            Ok(())
        }
        Command::Launch { package } => {
            let result = bridge
                .start_intent(device, &IntentSpec::launch(package.as_str()))
                .await?;
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            Ok(())
        }
        Command::Intent {
            action,
            category,
            data,
            package,
            class,
            extras,
        } => {
            let intent = IntentSpec {
                action: action.clone(),
                category: category.clone(),
                data_uri: data.clone(),
                package: package.clone(),
                class_name: class.clone(),
                extras: extras.clone(),
            };
            let result = bridge.start_intent(device, &intent).await?;
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            Ok(())
        }
        Command::Logs {
            package,
            lines,
            priority,
        } => {
            let entries = bridge
                .logs(device, package.as_deref(), *lines, *priority)
                .await?;
            print_json(&entries)
        }
        Command::ClearLogs => {
            let cleared = bridge.clear_logs(device).await?;
            if !cleared {
                bail!("failed to clear the log buffer");
            }
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_extra() {
        assert_eq!(
            parse_extra("key=value"),
            Ok(("key".to_string(), "value".to_string()))
        );
        assert_eq!(
            parse_extra("k=a=b"),
            Ok(("k".to_string(), "a=b".to_string()))
        );
        assert!(parse_extra("no-equals").is_err());
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("warn"), Ok(LogPriority::Warn));
        assert_eq!(parse_priority("E"), Ok(LogPriority::Error));
        assert!(parse_priority("loud").is_err());
    }
}
