//! Domain layer for tshotkey-trigger.
//!
//! Plain configuration types.  Reading files, environment variables or the
//! command line happens elsewhere; this module only says what a run needs and
//! how the sources are merged.

pub mod config;

pub use config::{ConnectionSettings, Overrides, Settings, SetupSettings, TriggerConfig};
