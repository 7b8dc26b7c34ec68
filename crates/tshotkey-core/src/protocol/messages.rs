//! Outbound message types and the length-checked message builder.
//!
//! The control application understands two messages from us:
//!
//! ```json
//! {"type":"auth","payload":{"identifier":"tshotkeytrigger","version":"0",
//!   "name":"HotKey CLI Trigger","description":"Triggers hotkeys via CLI",
//!   "content":{"apiKey":"<credential>"}}}
//!
//! {"type":"buttonPress","payload":{"state":true,"button":"toggle.mute"}}
//! ```
//!
//! Every message is rendered into one buffer of [`MESSAGE_BUFFER_LEN`] bytes.
//! [`MessageBuilder`] checks field lengths before rendering and rejects a
//! message that would not fit, instead of cutting it short.

use serde::Serialize;
use thiserror::Error;

use crate::domain::credential::{ApiKey, MAX_API_KEY_LEN};

/// Size of the buffer every outbound message is rendered into.
pub const MESSAGE_BUFFER_LEN: usize = 1024;

/// Client identifier announced in the `auth` message.
pub const CLIENT_IDENTIFIER: &str = "tshotkeytrigger";

/// Protocol version announced in the `auth` message.
pub const CLIENT_PROTOCOL_VERSION: &str = "0";

/// Display name shown by the control application when asking for authorization.
pub const CLIENT_NAME: &str = "HotKey CLI Trigger";

/// Description shown next to [`CLIENT_NAME`].
pub const CLIENT_DESCRIPTION: &str = "Triggers hotkeys via CLI";

/// Field path of the credential in inbound messages.
pub const API_KEY_PATH: &str = "payload.apiKey";

/// Errors raised while building an outbound message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The button identifier is empty.
    #[error("button identifier must not be empty")]
    EmptyButtonId,

    /// The credential exceeds the maximum accepted length.
    #[error("credential is {len} bytes, the maximum is {max}")]
    CredentialTooLong { len: usize, max: usize },

    /// The rendered message does not fit the send buffer.
    #[error("{kind} message is {len} bytes, the send buffer holds {max}")]
    MessageTooLarge {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// serde_json refused to render the message.
    #[error("failed to render message: {0}")]
    Render(String),
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// All messages this client sends.
///
/// Serialises as `{"type": <variant>, "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Client registration carrying the stored credential.
    Auth(AuthPayload),
    /// A virtual button changing state.
    ButtonPress(ButtonPressPayload),
}

impl OutboundMessage {
    /// The wire name of the message, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Auth(_) => "auth",
            OutboundMessage::ButtonPress(_) => "buttonPress",
        }
    }
}

/// Payload of the `auth` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthPayload {
    pub identifier: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub content: AuthContent,
}

/// Credential section of [`AuthPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContent {
    pub api_key: String,
}

/// Payload of the `buttonPress` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonPressPayload {
    /// `true` for pressed, `false` for released.
    pub state: bool,
    pub button: String,
}

/// A message rendered and ready to hand to the transport as a text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    kind: &'static str,
    text: String,
}

impl RenderedMessage {
    /// The wire name of the message.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The JSON text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the message, returning the JSON text.
    pub fn into_text(self) -> String {
        self.text
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Builds and renders outbound messages, enforcing the send-buffer limit.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    limit: usize,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            limit: MESSAGE_BUFFER_LEN,
        }
    }
}

impl MessageBuilder {
    /// A builder with the standard [`MESSAGE_BUFFER_LEN`] limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder with a custom buffer limit.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    /// Renders the `auth` message for `api_key`.
    ///
    /// An absent key is sent as an empty string, which asks the control
    /// application to issue a new one.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the credential or the rendered message is too long.
    pub fn auth(&self, api_key: Option<&ApiKey>) -> Result<RenderedMessage, BuildError> {
        let key = api_key.map(ApiKey::as_str).unwrap_or_default();
        if key.len() > MAX_API_KEY_LEN {
            return Err(BuildError::CredentialTooLong {
                len: key.len(),
                max: MAX_API_KEY_LEN,
            });
        }
        self.render(&OutboundMessage::Auth(AuthPayload {
            identifier: CLIENT_IDENTIFIER.to_string(),
            version: CLIENT_PROTOCOL_VERSION.to_string(),
            name: CLIENT_NAME.to_string(),
            description: CLIENT_DESCRIPTION.to_string(),
            content: AuthContent {
                api_key: key.to_string(),
            },
        }))
    }

    /// Renders a `buttonPress` message.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if `button` is empty or the message does not fit.
    pub fn button_press(&self, button: &str, pressed: bool) -> Result<RenderedMessage, BuildError> {
        if button.is_empty() {
            return Err(BuildError::EmptyButtonId);
        }
        self.render(&OutboundMessage::ButtonPress(ButtonPressPayload {
            state: pressed,
            button: button.to_string(),
        }))
    }

    /// Serialises `message` into a buffer pre-sized to the limit.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MessageTooLarge`] when the output exceeds the limit.
    pub fn render(&self, message: &OutboundMessage) -> Result<RenderedMessage, BuildError> {
        let mut buf = Vec::with_capacity(self.limit);
        serde_json::to_writer(&mut buf, message).map_err(|e| BuildError::Render(e.to_string()))?;
        if buf.len() > self.limit {
            return Err(BuildError::MessageTooLarge {
                kind: message.kind(),
                len: buf.len(),
                max: self.limit,
            });
        }
        let text = String::from_utf8(buf).map_err(|e| BuildError::Render(e.to_string()))?;
        Ok(RenderedMessage {
            kind: message.kind(),
            text,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
