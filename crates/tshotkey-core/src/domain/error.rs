//! Process exit codes.

use std::fmt;

/// Terminal classification of a run, used directly as the process exit code.
///
/// The numeric values are stable; scripts invoking the tool may depend on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    /// A required parameter is missing or invalid.
    Parameters = 1,
    /// The connection was refused, dropped or errored.
    Connection = 2,
    /// The connect request could not be initiated.
    ConnectionInit = 3,
    /// The event loop could not be created.
    TransportInit = 4,
    /// An inbound message was malformed.
    JsonParse = 5,
    /// The data directory path is too long.
    DataPathTooLong = 6,
    /// The credential file path is too long.
    DataFilePathTooLong = 7,
    /// The credential exceeds the maximum length.
    ApiKeyTooLong = 8,
    /// The credential file could not be opened or created, including when no
    /// data directory can be located at all.
    DataFileOpen = 9,
    /// The credential file could not be written.
    DataFileWrite = 10,
    /// The server did not respond in time.
    Timeout = 11,
    /// An outbound message would overflow the send buffer.
    MessageBuild = 12,
    /// The interactive setup ritual failed.
    Setup = 13,
    /// The settings file is unreadable or malformed.
    Settings = 14,
    /// Interrupted by the user before completion.
    Interrupted = 15,
}

impl ErrorCode {
    /// The numeric exit code.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// A short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Parameters => "missing or invalid parameters",
            ErrorCode::Connection => "connection error",
            ErrorCode::ConnectionInit => "could not initiate connection",
            ErrorCode::TransportInit => "could not create transport",
            ErrorCode::JsonParse => "malformed message from server",
            ErrorCode::DataPathTooLong => "data directory path too long",
            ErrorCode::DataFilePathTooLong => "credential file path too long",
            ErrorCode::ApiKeyTooLong => "API key too long",
            ErrorCode::DataFileOpen => "could not open credential file",
            ErrorCode::DataFileWrite => "could not write credential file",
            ErrorCode::Timeout => "timed out waiting for the server",
            ErrorCode::MessageBuild => "message too large for send buffer",
            ErrorCode::Setup => "setup interaction failed",
            ErrorCode::Settings => "invalid settings file",
            ErrorCode::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit code {})", self.description(), self.code())
    }
}

impl From<ErrorCode> for std::process::ExitCode {
    fn from(code: ErrorCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}
