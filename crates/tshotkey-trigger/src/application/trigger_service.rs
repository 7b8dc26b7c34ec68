//! The trigger use case: one run from credential load to button release.
//!
//! ```text
//! setup mode?  ── prepare() ──► Session::new (loads the key)
//!                                   │
//!                     current-thread tokio runtime
//!                                   │
//!                         drive_session until terminal
//!                                   │
//!                               ErrorCode
//! ```
//!
//! Every failure is mapped onto an [`ErrorCode`]; nothing here returns early
//! with a bare error.

use std::future::Future;

use tracing::{error, info, warn};

use tshotkey_core::domain::credential::CredentialStore;
use tshotkey_core::domain::error::ErrorCode;
use tshotkey_core::domain::session::{Session, SetupInteraction};

use crate::domain::config::TriggerConfig;
use crate::infrastructure::ws_transport::drive_session;

/// Runs one trigger cycle, ending early on Ctrl+C.
pub fn run_trigger<S, U>(config: &TriggerConfig, store: S, setup: U) -> ErrorCode
where
    S: CredentialStore,
    U: SetupInteraction,
{
    run_trigger_until(config, store, setup, ctrl_c())
}

/// Runs one trigger cycle, ending early when `interrupt` resolves.
///
/// `interrupt` is polled on the runtime this function creates.
pub fn run_trigger_until<S, U, F>(
    config: &TriggerConfig,
    store: S,
    mut setup: U,
    interrupt: F,
) -> ErrorCode
where
    S: CredentialStore,
    U: SetupInteraction,
    F: Future<Output = ()>,
{
    if config.setup_mode {
        if let Err(e) = setup.prepare() {
            error!("setup aborted before connecting: {e}");
            return ErrorCode::Setup;
        }
    }

    let mut session = match Session::new(config.button_id.as_str(), config.setup_mode, store, setup)
    {
        Ok(session) => session,
        Err(e) => {
            error!("{e}");
            return e.error_code();
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("cannot create event loop: {e}");
            return ErrorCode::TransportInit;
        }
    };

    let code = runtime.block_on(drive_session(&mut session, config, interrupt));
    if code.is_success() {
        info!("trigger cycle for '{}' complete", config.button_id);
    }
    code
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
