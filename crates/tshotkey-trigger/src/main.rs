//! tshotkeytrigger: press a virtual button in a locally running control
//! application, then exit.
//!
//! # Usage
//!
//! ```text
//! tshotkeytrigger --button-id <ID> [OPTIONS]
//!
//! Options:
//!   --button-id <ID>           Button to press, e.g. toggle.mute
//!   -s, --setup                Interactive setup: bind the button to a hotkey
//!   -v, --verbose              Debug logging
//!   --host <HOST>              Control application host [default: localhost]
//!   --port <PORT>              Control application port [default: 5899]
//!   --response-timeout <SECS>  Wait limit for the server, 0 disables [default: 30]
//!                              (setup mode: bounds authorization only if given)
//!   --config <PATH>            Settings file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                    | Flag                 |
//! |-----------------------------|----------------------|
//! | `TSHOTKEY_BUTTON_ID`        | `--button-id`        |
//! | `TSHOTKEY_HOST`             | `--host`             |
//! | `TSHOTKEY_PORT`             | `--port`             |
//! | `TSHOTKEY_RESPONSE_TIMEOUT` | `--response-timeout` |
//!
//! Flags win over environment variables, which win over the settings file.
//!
//! # Exit codes
//!
//! `0` on success; otherwise the numeric value of
//! [`tshotkey_core::ErrorCode`].  Help and version output exit with `0`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use tshotkey_core::ErrorCode;
use tshotkey_trigger::application::run_trigger;
use tshotkey_trigger::domain::{Overrides, TriggerConfig};
use tshotkey_trigger::infrastructure::settings_file::load_settings;
use tshotkey_trigger::infrastructure::{ConsoleSetup, FileCredentialStore};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Presses a virtual button in the control application via its WebSocket API.
#[derive(Debug, Parser)]
#[command(
    name = "tshotkeytrigger",
    about = "Trigger a hotkey button in a locally running control application",
    version,
    after_help = "Example:\n  tshotkeytrigger --button-id \"toggle.mute\""
)]
struct Cli {
    /// Identifier of the button to press.
    #[arg(long, env = "TSHOTKEY_BUTTON_ID")]
    button_id: String,

    /// Interactive setup: authorize this client and bind the button to a hotkey.
    #[arg(short, long)]
    setup: bool,

    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Host of the control application [default: localhost].
    #[arg(long, env = "TSHOTKEY_HOST")]
    host: Option<String>,

    /// WebSocket port of the control application [default: 5899].
    #[arg(long, env = "TSHOTKEY_PORT")]
    port: Option<u16>,

    /// Seconds to wait for the server before giving up; 0 waits forever [default: 30].
    ///
    /// With --setup the wait for authorization is unbounded unless this is given.
    #[arg(long, env = "TSHOTKEY_RESPONSE_TIMEOUT", value_name = "SECS")]
    response_timeout: Option<u64>,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the settings file and merges the command-line values over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be read or parsed.
    fn into_trigger_config(self) -> anyhow::Result<TriggerConfig> {
        let settings = load_settings(self.config.as_deref()).with_context(|| match &self.config {
            Some(path) => format!("cannot use settings file {}", path.display()),
            None => "cannot use default settings file".to_string(),
        })?;
        let overrides = Overrides {
            host: self.host,
            port: self.port,
            response_timeout_secs: self.response_timeout,
        };
        Ok(TriggerConfig::resolve(
            self.button_id,
            self.setup,
            overrides,
            settings,
        ))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// No `#[tokio::main]`: the runtime is created by the trigger use case so that
/// a failure to create it maps onto its own exit code.
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are successful outcomes.
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ErrorCode::Success,
                _ => ErrorCode::Parameters,
            };
            let _ = e.print();
            return code.into();
        }
    };

    init_logging(cli.verbose);

    let config = match cli.into_trigger_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            eprintln!("tshotkeytrigger: {e:#}");
            return ErrorCode::Settings.into();
        }
    };
    debug!(?config, "configuration resolved");

    let store = match FileCredentialStore::from_platform() {
        Ok(store) => store,
        Err(e) => {
            let code = e.error_code();
            eprintln!("tshotkeytrigger: {e}");
            return code.into();
        }
    };

    let setup = ConsoleSetup::stdio(config.countdown);
    let code = run_trigger(&config, store, setup);
    if !code.is_success() {
        eprintln!("tshotkeytrigger: {code}");
    }
    code.into()
}

/// Initialises `tracing` on stderr.
///
/// `RUST_LOG` wins when set and valid; otherwise warnings and errors only, or
/// debug output with `--verbose`.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
