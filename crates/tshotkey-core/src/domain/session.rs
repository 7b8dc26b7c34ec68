//! Session state machine: one connection, one trigger cycle.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Init ──begin_connect──► Authenticating ──Writable──► AwaitingAuth
//!                                                          │
//!                       accepted (see "Acceptance" below)  │
//!                                                          ▼
//! Complete ◄──Writable── SendUp ◄──Writable── SendDown ◄───┘
//!
//! any state ──ConnectionError / Closed / TimedOut / parse error──► Error(code)
//! ```
//!
//! The session never performs I/O.  The transport driver reports what
//! happened on the socket as a [`TransportEvent`], and the session answers by
//! calling back into the [`Transport`] it was handed: "tell me when I may
//! write", "send this text frame", or "stop everything".  Exactly one outbound
//! message is ever in flight.
//!
//! # Acceptance
//!
//! The control application does not send an explicit "auth ok" message.  While
//! in [`SessionState::AwaitingAuth`]:
//!
//! - a value at `payload.apiKey` is saved through the [`CredentialStore`]; in
//!   setup mode the human-guided [`SetupInteraction`] then runs, and the
//!   session moves on to the button events;
//! - in normal mode, any complete well-formed inbound message also moves the
//!   session on, whether or not it carried a key.
//!
//! Setup mode waits specifically for the key, since the key is the point of
//! the setup run.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::credential::{ApiKey, CredentialStore, SaveOutcome, StoreError};
use crate::domain::error::ErrorCode;
use crate::protocol::extractor::{FieldExtractor, FieldValue};
use crate::protocol::messages::{BuildError, MessageBuilder, RenderedMessage, API_KEY_PATH};
use crate::protocol::path::{FieldPath, PathError};

/// Where the session is in its single trigger cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, credential loaded, not yet connecting.
    Init,
    /// Connect requested; the auth message goes out on the first writable slot.
    Authenticating,
    /// Auth sent; waiting for the server to accept it.
    AwaitingAuth,
    /// Accepted; the button-down event goes out on the next writable slot.
    SendDown,
    /// Button-down sent; the button-up event goes out on the next writable slot.
    SendUp,
    /// Button-up sent.
    Complete,
    /// Terminal failure.
    Error(ErrorCode),
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Error(_))
    }
}

/// Something the transport driver observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent<'a> {
    /// The connection is established and the handshake completed.
    Connected,
    /// The transport can take one outbound message now.
    Writable,
    /// A chunk of an inbound text message.  `is_final` marks its last chunk.
    Received { chunk: &'a [u8], is_final: bool },
    /// The connect request could not be initiated at all.
    ConnectFailed,
    /// The connection was refused or failed after being established.
    ConnectionError,
    /// The peer closed the connection.
    Closed,
    /// The server did not answer the handshake, or no inbound message arrived,
    /// within the configured timeout.
    TimedOut,
    /// The user interrupted the run.
    Interrupted,
}

/// Calls the session makes back into the transport driver.
pub trait Transport {
    /// Asks for a [`TransportEvent::Writable`] as soon as a message can be sent.
    fn request_writable(&mut self);

    /// Queues one outbound text frame.
    fn send_text(&mut self, text: String);

    /// Abandons all pending transport activity; the event wait must end.
    fn cancel(&mut self);
}

/// Errors from the interactive setup ritual.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("setup aborted: {0}")]
    Aborted(String),
}

/// The human-guided setup ritual, driven from inside the session.
///
/// Implementations block the calling thread until the human is done.
#[cfg_attr(test, mockall::automock)]
pub trait SetupInteraction {
    /// Runs once before connecting, e.g. to ask the human to open the
    /// control application first.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the console cannot be used.
    fn prepare(&mut self) -> Result<(), SetupError> {
        Ok(())
    }

    /// Called when the auth message has been sent in setup mode, so the human
    /// can accept the authorization request in the control application.
    fn announce_auth_request(&mut self);

    /// Runs the ritual that lets the human bind `button_id`, returning when
    /// the button events should be sent.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the console cannot be used.
    fn perform(&mut self, button_id: &str) -> Result<(), SetupError>;
}

/// Errors raised while creating a session, before any connection exists.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid button identifier: {0}")]
    InvalidButton(#[source] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Path(#[from] PathError),
}

impl SessionError {
    /// The exit code this error terminates the run with.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidButton(BuildError::EmptyButtonId) => ErrorCode::Parameters,
            SessionError::InvalidButton(_) => ErrorCode::MessageBuild,
            SessionError::Store(e) => e.error_code(),
            SessionError::Path(_) => ErrorCode::Parameters,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One trigger run: the state, the credential and the collaborators it uses.
pub struct Session<S, U> {
    state: SessionState,
    button_id: String,
    setup_mode: bool,
    credential: Option<ApiKey>,
    store: S,
    setup: U,
    builder: MessageBuilder,
    extractor: FieldExtractor,
}

impl<S, U> Session<S, U>
where
    S: CredentialStore,
    U: SetupInteraction,
{
    /// Creates a session and loads the stored credential.
    ///
    /// A button message is rendered once up front, so an identifier that
    /// cannot be sent is rejected before any connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for an unusable button identifier or a store
    /// failure while loading.
    pub fn new(
        button_id: impl Into<String>,
        setup_mode: bool,
        mut store: S,
        setup: U,
    ) -> Result<Self, SessionError> {
        let button_id = button_id.into();
        let builder = MessageBuilder::new();
        builder
            .button_press(&button_id, true)
            .map_err(SessionError::InvalidButton)?;

        let credential = store.load()?;
        match &credential {
            Some(key) => info!("API key loaded: {}", key.redacted()),
            None => info!("no API key stored, the server will be asked for one"),
        }

        let extractor = FieldExtractor::new([FieldPath::parse(API_KEY_PATH)?])?;

        Ok(Self {
            state: SessionState::Init,
            button_id,
            setup_mode,
            credential,
            store,
            setup,
            builder,
            extractor,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn button_id(&self) -> &str {
        &self.button_id
    }

    pub fn setup_mode(&self) -> bool {
        self.setup_mode
    }

    /// The credential currently in use.
    pub fn credential(&self) -> Option<&ApiKey> {
        self.credential.as_ref()
    }

    /// `Some` once the session has reached a terminal state.
    pub fn exit_code(&self) -> Option<ErrorCode> {
        match self.state {
            SessionState::Complete => Some(ErrorCode::Success),
            SessionState::Error(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Consumes the session, returning its collaborators.
    pub fn into_parts(self) -> (S, U) {
        (self.store, self.setup)
    }

    /// Marks the connect request as issued.
    pub fn begin_connect(&mut self) {
        if self.state == SessionState::Init {
            debug!("connecting");
            self.state = SessionState::Authenticating;
        } else {
            warn!(state = ?self.state, "begin_connect ignored");
        }
    }

    /// Reacts to one transport event.
    pub fn handle(&mut self, event: TransportEvent<'_>, transport: &mut dyn Transport) {
        if self.state.is_terminal() {
            debug!(state = ?self.state, ?event, "event after session finished, ignored");
            return;
        }

        match event {
            TransportEvent::Connected => {
                debug!("connection established");
                if self.state == SessionState::Authenticating {
                    transport.request_writable();
                }
            }
            TransportEvent::Writable => self.on_writable(transport),
            TransportEvent::Received { chunk, is_final } => {
                self.on_received(chunk, is_final, transport)
            }
            TransportEvent::ConnectFailed => {
                self.fail(ErrorCode::ConnectionInit, "connect request failed", transport)
            }
            TransportEvent::ConnectionError => {
                self.fail(ErrorCode::Connection, "connection error", transport)
            }
            TransportEvent::Closed => {
                self.fail(ErrorCode::Connection, "connection closed by peer", transport)
            }
            TransportEvent::TimedOut => {
                self.fail(ErrorCode::Timeout, "no response from server", transport)
            }
            TransportEvent::Interrupted => {
                self.fail(ErrorCode::Interrupted, "interrupted", transport)
            }
        }
    }

    fn on_writable(&mut self, transport: &mut dyn Transport) {
        debug!(state = ?self.state, "writable");
        let (message, next) = match self.state {
            SessionState::Authenticating => {
                (self.builder.auth(self.credential.as_ref()), SessionState::AwaitingAuth)
            }
            SessionState::SendDown => (
                self.builder.button_press(&self.button_id, true),
                SessionState::SendUp,
            ),
            SessionState::SendUp => (
                self.builder.button_press(&self.button_id, false),
                SessionState::Complete,
            ),
            _ => return,
        };

        let message = match message {
            Ok(m) => m,
            Err(e) => {
                error!("cannot build message: {e}");
                self.fail(ErrorCode::MessageBuild, "message build failed", transport);
                return;
            }
        };

        self.send(message, transport);
        self.state = next;

        match next {
            SessionState::AwaitingAuth => {
                if self.setup_mode {
                    self.setup.announce_auth_request();
                }
            }
            SessionState::SendUp => transport.request_writable(),
            SessionState::Complete => info!("button '{}' triggered", self.button_id),
            _ => {}
        }
    }

    fn send(&mut self, message: RenderedMessage, transport: &mut dyn Transport) {
        debug!(kind = message.kind(), len = message.as_str().len(), "sending");
        transport.send_text(message.into_text());
    }

    fn on_received(&mut self, chunk: &[u8], is_final: bool, transport: &mut dyn Transport) {
        debug!(len = chunk.len(), is_final, "received");

        let mut keys: Vec<FieldValue> = Vec::new();
        if let Err(e) = self.extractor.feed(chunk, |m| keys.push(m.value)) {
            error!("{e}");
            self.fail(ErrorCode::JsonParse, "malformed inbound message", transport);
            return;
        }

        for value in keys {
            if self.state != SessionState::AwaitingAuth {
                debug!(state = ?self.state, "API key outside of auth phase, ignored");
                continue;
            }
            self.on_api_key(value, transport);
            if self.state.is_terminal() {
                return;
            }
        }

        if !is_final {
            return;
        }
        if let Err(e) = self.extractor.finish() {
            error!("{e}");
            self.fail(ErrorCode::JsonParse, "malformed inbound message", transport);
            return;
        }

        if self.state == SessionState::AwaitingAuth && !self.setup_mode {
            debug!("message received after auth, treating auth as accepted");
            self.accept(transport);
        }
    }

    fn on_api_key(&mut self, value: FieldValue, transport: &mut dyn Transport) {
        let raw = match value {
            FieldValue::String(raw) => raw,
            other => {
                warn!(value = ?other, "payload.apiKey is not a string, ignored");
                return;
            }
        };

        match ApiKey::new(raw) {
            Ok(key) => match self.store.save(&key) {
                Ok(SaveOutcome::Written) => {
                    info!("API key saved: {}", key.redacted());
                    self.credential = Some(key);
                }
                Ok(SaveOutcome::Unchanged) => {
                    debug!("API key unchanged");
                    self.credential = Some(key);
                }
                Err(e) => {
                    error!("cannot save API key: {e}");
                    self.fail(e.error_code(), "credential store failed", transport);
                    return;
                }
            },
            Err(e) => {
                warn!("received API key not saved: {e}");
            }
        }

        if self.setup_mode {
            if let Err(e) = self.setup.perform(&self.button_id) {
                error!("{e}");
                self.fail(ErrorCode::Setup, "setup interaction failed", transport);
                return;
            }
        }
        self.accept(transport);
    }

    fn accept(&mut self, transport: &mut dyn Transport) {
        self.state = SessionState::SendDown;
        transport.request_writable();
    }

    fn fail(&mut self, code: ErrorCode, reason: &str, transport: &mut dyn Transport) {
        error!(code = code.code(), "{reason}");
        self.state = SessionState::Error(code);
        self.extractor.reset();
        transport.cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::MockCredentialStore;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<String>,
        writable_requests: usize,
        cancelled: bool,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl Transport for RecordingTransport {
        fn request_writable(&mut self) {
            self.writable_requests += 1;
        }

        fn send_text(&mut self, text: String) {
            if let Some(log) = &self.log {
                let kind = serde_json::from_str::<Value>(&text).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string();
                log.lock().unwrap().push(format!("send:{kind}"));
            }
            self.sent.push(text);
        }

        fn cancel(&mut self) {
            self.cancelled = true;
        }
    }

    fn store_with(key: Option<&'static str>) -> MockCredentialStore {
        let mut store = MockCredentialStore::new();
        store
            .expect_load()
            .times(1)
            .returning(move || Ok(key.map(|k| ApiKey::new(k).unwrap())));
        store
    }

    fn sent_json(t: &RecordingTransport, i: usize) -> Value {
        serde_json::from_str(&t.sent[i]).unwrap()
    }

    fn final_chunk(bytes: &[u8]) -> TransportEvent<'_> {
        TransportEvent::Received {
            chunk: bytes,
            is_final: true,
        }
    }

    type TestSession = Session<MockCredentialStore, MockSetupInteraction>;

    fn connect_and_auth(session: &mut TestSession, transport: &mut RecordingTransport) {
        session.begin_connect();
        session.handle(TransportEvent::Connected, transport);
        session.handle(TransportEvent::Writable, transport);
    }

    #[test]
    fn test_new_loads_credential_and_starts_in_init() {
        let session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();

        assert_eq!(session.state(), SessionState::Init);
        assert_eq!(session.credential().map(ApiKey::as_str), Some("abc123"));
        assert_eq!(session.exit_code(), None);
    }

    #[test]
    fn test_new_rejects_empty_button_id_with_parameters_code() {
        let err = Session::new("", false, MockCredentialStore::new(), MockSetupInteraction::new())
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::Parameters);
    }

    #[test]
    fn test_new_rejects_oversized_button_id_before_connecting() {
        let long = "b".repeat(2000);
        let err = Session::new(long, false, MockCredentialStore::new(), MockSetupInteraction::new())
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::MessageBuild);
    }

    #[test]
    fn test_new_propagates_oversized_stored_key() {
        let mut store = MockCredentialStore::new();
        store
            .expect_load()
            .returning(|| Err(StoreError::KeyTooLong { len: 45, max: 39 }));

        let err = Session::new("toggle.mute", false, store, MockSetupInteraction::new())
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::ApiKeyTooLong);
    }

    #[test]
    fn test_normal_mode_full_cycle_sends_auth_down_up_and_completes() {
        // Arrange
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();

        // Act: connect and authenticate
        connect_and_auth(&mut session, &mut transport);

        // Assert
        assert_eq!(session.state(), SessionState::AwaitingAuth);
        assert_eq!(transport.sent.len(), 1);
        let auth = sent_json(&transport, 0);
        assert_eq!(auth["type"], json!("auth"));
        assert_eq!(auth["payload"]["content"]["apiKey"], json!("abc123"));

        // Act: any message counts as acceptance
        session.handle(final_chunk(br#"{"type":"hello"}"#), &mut transport);
        assert_eq!(session.state(), SessionState::SendDown);

        session.handle(TransportEvent::Writable, &mut transport);
        assert_eq!(session.state(), SessionState::SendUp);
        session.handle(TransportEvent::Writable, &mut transport);

        // Assert
        assert_eq!(session.state(), SessionState::Complete);
        assert_eq!(session.exit_code(), Some(ErrorCode::Success));
        assert_eq!(transport.sent.len(), 3);
        assert_eq!(
            sent_json(&transport, 1),
            json!({"type": "buttonPress", "payload": {"state": true, "button": "toggle.mute"}})
        );
        assert_eq!(
            sent_json(&transport, 2),
            json!({"type": "buttonPress", "payload": {"state": false, "button": "toggle.mute"}})
        );
        assert!(!transport.cancelled);
    }

    #[test]
    fn test_partial_message_does_not_accept_auth_until_final_chunk() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        session.handle(
            TransportEvent::Received {
                chunk: br#"{"type":"#,
                is_final: false,
            },
            &mut transport,
        );
        assert_eq!(session.state(), SessionState::AwaitingAuth);

        session.handle(final_chunk(br#""hello"}"#), &mut transport);
        assert_eq!(session.state(), SessionState::SendDown);
    }

    #[test]
    fn test_connection_error_before_connect_sends_nothing() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();

        session.begin_connect();
        session.handle(TransportEvent::ConnectionError, &mut transport);

        assert_eq!(session.state(), SessionState::Error(ErrorCode::Connection));
        assert_eq!(session.exit_code(), Some(ErrorCode::Connection));
        assert!(transport.sent.is_empty());
        assert!(transport.cancelled);
    }

    #[test]
    fn test_connect_failed_maps_to_connection_init() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(None),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();

        session.begin_connect();
        session.handle(TransportEvent::ConnectFailed, &mut transport);

        assert_eq!(session.exit_code(), Some(ErrorCode::ConnectionInit));
    }

    #[test]
    fn test_malformed_inbound_message_is_fatal() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        session.handle(final_chunk(br#"{"type":}"#), &mut transport);

        assert_eq!(session.state(), SessionState::Error(ErrorCode::JsonParse));
        assert_eq!(transport.sent.len(), 1);
        assert!(transport.cancelled);
    }

    #[test]
    fn test_truncated_inbound_message_is_fatal() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        session.handle(final_chunk(br#"{"type":"hel"#), &mut transport);

        assert_eq!(session.exit_code(), Some(ErrorCode::JsonParse));
    }

    #[test]
    fn test_timeout_while_awaiting_auth() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        session.handle(TransportEvent::TimedOut, &mut transport);

        assert_eq!(session.exit_code(), Some(ErrorCode::Timeout));
    }

    #[test]
    fn test_timeout_during_handshake_sends_nothing() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();

        session.begin_connect();
        session.handle(TransportEvent::TimedOut, &mut transport);

        assert_eq!(session.exit_code(), Some(ErrorCode::Timeout));
        assert!(transport.sent.is_empty());
        assert!(transport.cancelled);
    }

    #[test]
    fn test_pushed_key_is_saved_in_normal_mode() {
        // Arrange
        let mut store = store_with(None);
        store
            .expect_save()
            .withf(|k| k.as_str() == "newkey")
            .times(1)
            .returning(|_| Ok(SaveOutcome::Written));
        let mut session =
            Session::new("toggle.mute", false, store, MockSetupInteraction::new()).unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);
        assert_eq!(sent_json(&transport, 0)["payload"]["content"]["apiKey"], json!(""));

        // Act
        session.handle(
            final_chunk(br#"{"type":"auth","payload":{"apiKey":"newkey"}}"#),
            &mut transport,
        );

        // Assert
        assert_eq!(session.state(), SessionState::SendDown);
        assert_eq!(session.credential().map(ApiKey::as_str), Some("newkey"));
    }

    #[test]
    fn test_oversized_pushed_key_is_not_saved_and_run_continues() {
        let mut store = store_with(Some("old"));
        store.expect_save().times(0);
        let mut session =
            Session::new("toggle.mute", false, store, MockSetupInteraction::new()).unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        let msg = format!(
            r#"{{"payload":{{"apiKey":"{}"}}}}"#,
            "k".repeat(crate::domain::credential::MAX_API_KEY_LEN + 1)
        );
        session.handle(final_chunk(msg.as_bytes()), &mut transport);

        assert_eq!(session.state(), SessionState::SendDown);
        assert_eq!(session.credential().map(ApiKey::as_str), Some("old"));
    }

    #[test]
    fn test_store_write_failure_aborts_run() {
        let mut store = store_with(None);
        store.expect_save().returning(|_| {
            Err(StoreError::Write {
                path: "/nope/api_key".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });
        let mut session =
            Session::new("toggle.mute", false, store, MockSetupInteraction::new()).unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);

        session.handle(
            final_chunk(br#"{"payload":{"apiKey":"newkey"}}"#),
            &mut transport,
        );

        assert_eq!(session.exit_code(), Some(ErrorCode::DataFileWrite));
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn test_setup_mode_saves_key_then_runs_setup_then_sends_buttons() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut store = store_with(None);
        let store_log = Arc::clone(&log);
        store
            .expect_save()
            .withf(|k| k.as_str() == "newkey")
            .times(1)
            .returning(move |_| {
                store_log.lock().unwrap().push("save".to_string());
                Ok(SaveOutcome::Written)
            });

        let mut setup = MockSetupInteraction::new();
        let announce_log = Arc::clone(&log);
        setup.expect_announce_auth_request().times(1).returning(move || {
            announce_log.lock().unwrap().push("announce".to_string());
        });
        let setup_log = Arc::clone(&log);
        setup
            .expect_perform()
            .withf(|id| id == "toggle.mute")
            .times(1)
            .returning(move |_| {
                setup_log.lock().unwrap().push("setup".to_string());
                Ok(())
            });

        let mut session = Session::new("toggle.mute", true, store, setup).unwrap();
        let mut transport = RecordingTransport {
            log: Some(Arc::clone(&log)),
            ..Default::default()
        };

        // Act
        connect_and_auth(&mut session, &mut transport);
        session.handle(final_chunk(br#"{"type":"status"}"#), &mut transport);
        assert_eq!(session.state(), SessionState::AwaitingAuth);

        session.handle(
            final_chunk(br#"{"type":"auth","payload":{"apiKey":"newkey"}}"#),
            &mut transport,
        );
        session.handle(TransportEvent::Writable, &mut transport);
        session.handle(TransportEvent::Writable, &mut transport);

        // Assert
        assert_eq!(session.exit_code(), Some(ErrorCode::Success));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "send:auth",
                "announce",
                "save",
                "setup",
                "send:buttonPress",
                "send:buttonPress"
            ]
        );
    }

    #[test]
    fn test_setup_failure_maps_to_setup_code() {
        let mut store = store_with(None);
        store.expect_save().returning(|_| Ok(SaveOutcome::Written));
        let mut setup = MockSetupInteraction::new();
        setup.expect_announce_auth_request().return_const(());
        setup
            .expect_perform()
            .returning(|_| Err(SetupError::Aborted("stdin closed".to_string())));

        let mut session = Session::new("toggle.mute", true, store, setup).unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);
        session.handle(
            final_chunk(br#"{"payload":{"apiKey":"newkey"}}"#),
            &mut transport,
        );

        assert_eq!(session.exit_code(), Some(ErrorCode::Setup));
        assert!(transport.cancelled);
    }

    #[test]
    fn test_events_after_completion_are_ignored() {
        let mut session = Session::new(
            "toggle.mute",
            false,
            store_with(Some("abc123")),
            MockSetupInteraction::new(),
        )
        .unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);
        session.handle(final_chunk(b"{}"), &mut transport);
        session.handle(TransportEvent::Writable, &mut transport);
        session.handle(TransportEvent::Writable, &mut transport);

        session.handle(TransportEvent::Closed, &mut transport);
        session.handle(TransportEvent::Writable, &mut transport);

        assert_eq!(session.exit_code(), Some(ErrorCode::Success));
        assert_eq!(transport.sent.len(), 3);
    }

    #[test]
    fn test_key_arriving_after_acceptance_is_not_saved() {
        let mut store = store_with(Some("abc123"));
        store.expect_save().times(0);
        let mut session =
            Session::new("toggle.mute", false, store, MockSetupInteraction::new()).unwrap();
        let mut transport = RecordingTransport::default();
        connect_and_auth(&mut session, &mut transport);
        session.handle(final_chunk(b"{}"), &mut transport);

        session.handle(
            final_chunk(br#"{"payload":{"apiKey":"late"}}"#),
            &mut transport,
        );

        assert_eq!(session.state(), SessionState::SendDown);
        assert_eq!(session.credential().map(ApiKey::as_str), Some("abc123"));
    }
}
