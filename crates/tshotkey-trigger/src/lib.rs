//! tshotkey-trigger library crate.
//!
//! Everything the `tshotkeytrigger` binary needs besides argument parsing:
//! the resolved run configuration, the trigger use case, and the adapters
//! for the filesystem, the console and the WebSocket.
//!
//! # Architecture
//!
//! ```text
//! main.rs            clap CLI, logging, exit code
//!   domain/          TriggerConfig + settings-file schema (no I/O)
//!   application/     run_trigger: store + setup + session + transport
//!   infrastructure/
//!     credential_file  API key file under the platform data directory
//!     settings_file    optional TOML settings
//!     console_setup    interactive setup ritual on stdin/stdout
//!     ws_transport     tokio-tungstenite driver for the session
//! ```
//!
//! The protocol logic itself lives in `tshotkey-core`; this crate only wires
//! it to real I/O.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: the trigger use case.
pub mod application;

/// Infrastructure layer: file, console and WebSocket adapters.
pub mod infrastructure;
