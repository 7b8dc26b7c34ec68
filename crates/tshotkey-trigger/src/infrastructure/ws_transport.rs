//! WebSocket transport driver for the session state machine.
//!
//! [`drive_session`] owns the socket and the event wait.  It translates what
//! happens on the WebSocket into [`TransportEvent`]s for the session, and
//! carries out what the session asks for through the [`Transport`] trait:
//!
//! ```text
//! connect_async ──ok──► Connected
//!               ├─err─► ConnectFailed / ConnectionError
//!               └─no upgrade response within connect_timeout─► TimedOut
//!
//! loop:
//!   while a writable slot was requested:
//!       Writable → session queues one message → send it
//!   stop if the session finished or cancelled
//!   wait for the next frame (bounded by the response timeout while the
//!   session awaits auth acceptance), or Ctrl+C:
//!       Text/Binary → Received { is_final: true }
//!       Close / end of stream → Closed
//!       error → ConnectionError
//!       timeout → TimedOut
//!       interrupt → Interrupted
//! ```
//!
//! tungstenite reassembles fragmented frames, so every inbound message is
//! delivered as a single final chunk.  Ping/pong is answered by tungstenite.

use std::collections::VecDeque;
use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest, handshake::client::Request, http::HeaderValue,
        Error as WsError, Message as WsMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use tshotkey_core::domain::credential::CredentialStore;
use tshotkey_core::domain::error::ErrorCode;
use tshotkey_core::domain::session::{
    Session, SessionState, SetupInteraction, Transport, TransportEvent,
};

use crate::domain::config::TriggerConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The session's view of the socket: requests recorded between dispatches.
#[derive(Debug, Default)]
struct Outbox {
    writable_requested: bool,
    queue: VecDeque<String>,
    cancelled: bool,
}

impl Transport for Outbox {
    fn request_writable(&mut self) {
        self.writable_requested = true;
    }

    fn send_text(&mut self, text: String) {
        if !self.queue.is_empty() {
            warn!(queued = self.queue.len(), "message queued while another is in flight");
        }
        self.queue.push_back(text);
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.writable_requested = false;
        self.queue.clear();
    }
}

/// Connects to the control application and runs `session` to completion.
///
/// Returns when the session reaches a terminal state or `interrupt` resolves.
/// The returned code is the session's exit code.
pub async fn drive_session<S, U, F>(
    session: &mut Session<S, U>,
    config: &TriggerConfig,
    interrupt: F,
) -> ErrorCode
where
    S: CredentialStore,
    U: SetupInteraction,
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut outbox = Outbox::default();
    let url = config.url();

    session.begin_connect();

    let request = match build_request(config) {
        Ok(request) => request,
        Err(e) => {
            error!("cannot build connect request for {url}: {e}");
            session.handle(TransportEvent::ConnectFailed, &mut outbox);
            return exit_code(session);
        }
    };

    info!("connecting to {url}");
    let handshake = async {
        match config.connect_timeout {
            Some(limit) => timeout(limit, connect_async(request)).await.ok(),
            None => Some(connect_async(request).await),
        }
    };
    let connected = tokio::select! {
        result = handshake => result,
        () = &mut interrupt => {
            session.handle(TransportEvent::Interrupted, &mut outbox);
            return exit_code(session);
        }
    };

    let mut ws = match connected {
        None => {
            error!("no handshake response from {url}");
            session.handle(TransportEvent::TimedOut, &mut outbox);
            return exit_code(session);
        }
        Some(Ok((ws, response))) => {
            debug!(status = %response.status(), "WebSocket handshake complete");
            ws
        }
        Some(Err(e)) => {
            error!("cannot connect to {url}: {e}");
            let event = if is_init_error(&e) {
                TransportEvent::ConnectFailed
            } else {
                TransportEvent::ConnectionError
            };
            session.handle(event, &mut outbox);
            return exit_code(session);
        }
    };

    session.handle(TransportEvent::Connected, &mut outbox);

    loop {
        while outbox.writable_requested && !outbox.cancelled && !session.is_finished() {
            outbox.writable_requested = false;
            session.handle(TransportEvent::Writable, &mut outbox);
            if let Err(e) = flush(&mut ws, &mut outbox).await {
                error!("send failed: {e}");
                if session.is_finished() {
                    // The last message never left; the press is incomplete.
                    return ErrorCode::Connection;
                }
                session.handle(TransportEvent::ConnectionError, &mut outbox);
            }
        }

        if session.is_finished() || outbox.cancelled {
            break;
        }

        let limit = match session.state() {
            SessionState::AwaitingAuth => config.response_timeout,
            _ => None,
        };
        let next = async {
            match limit {
                Some(limit) => timeout(limit, ws.next()).await.ok(),
                None => Some(ws.next().await),
            }
        };

        let incoming = tokio::select! {
            incoming = next => incoming,
            () = &mut interrupt => {
                session.handle(TransportEvent::Interrupted, &mut outbox);
                break;
            }
        };

        match incoming {
            None => session.handle(TransportEvent::TimedOut, &mut outbox),
            Some(None) => {
                debug!("stream ended");
                session.handle(TransportEvent::Closed, &mut outbox);
            }
            Some(Some(Ok(message))) => dispatch_message(session, message, &mut outbox),
            Some(Some(Err(e))) => {
                error!("WebSocket error: {e}");
                session.handle(TransportEvent::ConnectionError, &mut outbox);
            }
        }
    }

    if session.state() == SessionState::Complete {
        if let Err(e) = ws.close(None).await {
            debug!("close after completion failed: {e}");
        }
    }

    exit_code(session)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Builds the upgrade request, adding `Sec-WebSocket-Protocol` when configured.
///
/// The request carries `Origin: http://<host>` like a browser client would.
/// No subprotocol is offered by default: tungstenite rejects a handshake whose
/// response does not select one of the offered subprotocols, so offering
/// `tsclient` is opt-in through `[connection] subprotocol`.
fn build_request(config: &TriggerConfig) -> Result<Request, WsError> {
    let mut request = config.url().as_str().into_client_request()?;
    let origin = HeaderValue::from_str(&config.origin())
        .map_err(|e| WsError::HttpFormat(e.into()))?;
    request.headers_mut().insert("Origin", origin);
    if let Some(protocol) = &config.subprotocol {
        let value =
            HeaderValue::from_str(protocol).map_err(|e| WsError::HttpFormat(e.into()))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

/// Errors that mean the connect request itself was unusable.
fn is_init_error(e: &WsError) -> bool {
    matches!(e, WsError::Url(_) | WsError::HttpFormat(_))
}

async fn flush(ws: &mut WsStream, outbox: &mut Outbox) -> Result<(), WsError> {
    while let Some(text) = outbox.queue.pop_front() {
        debug!(len = text.len(), "sending text frame");
        ws.send(WsMessage::Text(text)).await?;
    }
    Ok(())
}

fn dispatch_message<S, U>(session: &mut Session<S, U>, message: WsMessage, outbox: &mut Outbox)
where
    S: CredentialStore,
    U: SetupInteraction,
{
    match message {
        WsMessage::Text(text) => session.handle(
            TransportEvent::Received {
                chunk: text.as_bytes(),
                is_final: true,
            },
            outbox,
        ),
        WsMessage::Binary(data) => session.handle(
            TransportEvent::Received {
                chunk: &data,
                is_final: true,
            },
            outbox,
        ),
        WsMessage::Close(frame) => {
            debug!(?frame, "close frame received");
            session.handle(TransportEvent::Closed, outbox);
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
            debug!("control frame");
        }
    }
}

fn exit_code<S, U>(session: &Session<S, U>) -> ErrorCode
where
    S: CredentialStore,
    U: SetupInteraction,
{
    session.exit_code().unwrap_or(ErrorCode::Connection)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
