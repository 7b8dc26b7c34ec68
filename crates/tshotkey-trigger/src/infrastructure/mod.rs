//! Infrastructure layer for tshotkey-trigger.
//!
//! OS-facing adapters: the credential file, the settings file, the console
//! used by the setup ritual, and the WebSocket transport driver.
//!
//! **Dependency rule**: this layer may depend on `domain` and `tshotkey_core`.
//! Only the application layer and `main.rs` import it; the domain never does.

pub mod console_setup;
pub mod credential_file;
pub mod settings_file;
pub mod ws_transport;

pub use console_setup::ConsoleSetup;
pub use credential_file::FileCredentialStore;
pub use ws_transport::drive_session;
