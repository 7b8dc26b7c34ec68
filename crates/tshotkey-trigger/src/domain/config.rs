//! Run configuration and the settings-file schema.
//!
//! A [`TriggerConfig`] is resolved once at startup from three sources, in
//! decreasing precedence:
//!
//! 1. command-line flags and `TSHOTKEY_*` environment variables ([`Overrides`]),
//! 2. the optional TOML settings file ([`Settings`]),
//! 3. built-in defaults.
//!
//! Example settings file:
//!
//! ```toml
//! [connection]
//! host = "localhost"
//! port = 5899
//! response_timeout_secs = 30
//! # subprotocol = "ts-hotkeys"
//!
//! [setup]
//! countdown_secs = 10
//! ```
//!
//! Every field has a serde default, so a partial file (or none at all) works.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default host of the control application.
pub const DEFAULT_HOST: &str = "localhost";

/// Default WebSocket port of the control application.
pub const DEFAULT_PORT: u16 = 5899;

/// Default bound on waiting for the server, in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Default setup countdown, in seconds.
pub const DEFAULT_COUNTDOWN_SECS: u64 = 10;

// ── Settings file schema ──────────────────────────────────────────────────────

/// Contents of the optional settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub setup: SetupSettings,
}

/// `[connection]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// `0` disables the timeout.
    pub response_timeout_secs: u64,
    /// WebSocket subprotocol to request, if the server requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subprotocol: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            subprotocol: None,
        }
    }
}

/// `[setup]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SetupSettings {
    pub countdown_secs: u64,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        }
    }
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// Values given on the command line or through the environment.
///
/// `None` means "not given", so the settings file or the default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub response_timeout_secs: Option<u64>,
}

/// Everything one trigger run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Identifier of the button to press, e.g. `toggle.mute`.
    pub button_id: String,
    /// Run the interactive setup ritual.
    pub setup_mode: bool,
    pub host: String,
    pub port: u16,
    /// Bound on the WebSocket handshake; `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Bound on waiting for the server's reply to `auth`; `None` waits forever.
    ///
    /// In setup mode that reply waits on a human accepting the authorization
    /// request, so only an explicit command-line or environment value applies.
    pub response_timeout: Option<Duration>,
    pub subprotocol: Option<String>,
    /// Length of the setup countdown.
    pub countdown: Duration,
}

impl TriggerConfig {
    /// A configuration with every optional value at its default.
    pub fn new(button_id: impl Into<String>) -> Self {
        Self::resolve(button_id, false, Overrides::default(), Settings::default())
    }

    /// Merges `overrides` over `settings`.
    pub fn resolve(
        button_id: impl Into<String>,
        setup_mode: bool,
        overrides: Overrides,
        settings: Settings,
    ) -> Self {
        let explicit_timeout = overrides.response_timeout_secs;
        let timeout_secs = explicit_timeout.unwrap_or(settings.connection.response_timeout_secs);
        let connect_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        let response_timeout = if setup_mode && explicit_timeout.is_none() {
            None
        } else {
            connect_timeout
        };
        Self {
            button_id: button_id.into(),
            setup_mode,
            host: overrides.host.unwrap_or(settings.connection.host),
            port: overrides.port.unwrap_or(settings.connection.port),
            connect_timeout,
            response_timeout,
            subprotocol: settings.connection.subprotocol.filter(|p| !p.is_empty()),
            countdown: Duration::from_secs(settings.setup.countdown_secs),
        }
    }

    /// The WebSocket URL of the control application.
    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.bracketed_host(), self.port)
    }

    /// The `Origin` the client presents during the handshake.
    pub fn origin(&self) -> String {
        format!("http://{}", self.bracketed_host())
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
