//! # tshotkey-core
//!
//! Core library for `tshotkeytrigger`: the session state machine that drives
//! one trigger run, the streaming JSON field extractor it decodes inbound
//! messages with, and the typed outbound message builder.
//!
//! This crate opens no sockets and touches no files.  The transport and the
//! credential store are traits implemented by the binary crate.
//!
//! # Architecture overview (for beginners)
//!
//! `tshotkeytrigger` presses a virtual button in a locally running control
//! application.  The application speaks JSON over a WebSocket:
//!
//! 1. We send an `auth` message carrying our stored API key.
//! 2. The application answers (and, the first time, pushes a new key at
//!    `payload.apiKey`).
//! 3. We send `buttonPress` with `state: true`, then with `state: false`.
//!
//! The crate is split into:
//!
//! - **`protocol`** – field paths, the streaming extractor, and the message
//!   builder.  Inbound messages are never parsed into a full document; the
//!   extractor walks them byte by byte and reports only the watched field.
//!
//! - **`domain`** – the API key type, the exit-code taxonomy, and the
//!   [`Session`] state machine with its [`Transport`], [`CredentialStore`] and
//!   [`SetupInteraction`] ports.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root.
pub use domain::credential::{ApiKey, CredentialStore, SaveOutcome, StoreError, MAX_API_KEY_LEN};
pub use domain::error::ErrorCode;
pub use domain::session::{
    Session, SessionError, SessionState, SetupError, SetupInteraction, Transport, TransportEvent,
};
pub use protocol::extractor::{FieldExtractor, FieldMatch, FieldValue, ParseError, ParseErrorKind};
pub use protocol::messages::{BuildError, MessageBuilder, MESSAGE_BUFFER_LEN};
pub use protocol::path::{FieldPath, PathError};
