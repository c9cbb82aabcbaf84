//! Error types for the Assuan engine
//!
//! Provides a unified error type for all operations, plus the numeric
//! wire codes carried by `ERR` lines.

use thiserror::Error;

/// Result type alias using AssuanError
pub type Result<T> = std::result::Result<T, AssuanError>;

/// Unified error type for Assuan operations
#[derive(Debug, Error)]
pub enum AssuanError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying stream closed or errored; the session is dead.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    // -------------------------------------------------------------------------
    // Framing Errors
    // -------------------------------------------------------------------------
    /// Line exceeded the configured maximum.
    #[error("framing error: {0}")]
    Framing(String),

    /// Stream ended before the line terminator.
    #[error("incomplete line: {0}")]
    IncompleteLine(String),

    /// Invalid percent escape. `offset` is the byte position of the bad
    /// escape within the line.
    #[error("invalid percent escape at byte {offset}")]
    Encoding { offset: usize },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// A well-formed line arrived in a state that does not accept it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer answered a command with `ERR <code> <message>`.
    #[error("remote error {code}: {}", message.as_deref().unwrap_or("(no description)"))]
    Remote { code: u32, message: Option<String> },

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    /// Command attempted after BYE was sent or received.
    #[error("session closed")]
    SessionClosed,

    // -------------------------------------------------------------------------
    // Application Errors
    // -------------------------------------------------------------------------
    /// Failure raised by a server-side command handler. Converted to an
    /// `ERR` response at the dispatch boundary, never fatal to the session.
    #[error("handler error {code}: {message}")]
    Handler { code: u32, message: String },
}

impl AssuanError {
    /// Shorthand for a handler failure with an explicit wire code
    pub fn handler(code: u32, message: impl Into<String>) -> Self {
        AssuanError::Handler {
            code,
            message: message.into(),
        }
    }

    /// The wire code this error carries when rendered as an `ERR` line
    pub fn wire_code(&self) -> u32 {
        match self {
            AssuanError::Io(_) => code::ASS_GENERAL,
            AssuanError::TransportClosed(_) => code::ASS_CONNECT_FAILED,
            AssuanError::Framing(_) => code::ASS_LINE_TOO_LONG,
            AssuanError::IncompleteLine(_) => code::ASS_INCOMPLETE_LINE,
            AssuanError::Encoding { .. } => code::INV_REQUEST,
            AssuanError::ProtocolViolation(_) => code::ASS_UNEXPECTED_CMD,
            AssuanError::Remote { code, .. } => *code,
            AssuanError::SessionClosed => code::ASS_CONNECT_FAILED,
            AssuanError::Handler { code, .. } => *code,
        }
    }
}

/// Numeric error codes used on `ERR` lines.
///
/// These are the gpg-error / libassuan identifiers the reference
/// implementations exchange, kept so sessions interoperate with GnuPG
/// tooling.
pub mod code {
    /// Catch-all application failure
    pub const GENERAL: u32 = 1;
    /// Response line could not be parsed
    pub const INV_RESPONSE: u32 = 76;
    /// Malformed argument to a command (e.g. OPTION syntax)
    pub const INV_PARAMETER: u32 = 90;
    /// Request line could not be parsed
    pub const INV_REQUEST: u32 = 170;
    /// OPTION named an option the server does not accept
    pub const UNKNOWN_OPTION: u32 = 174;
    /// Reserved command word with no registered implementation
    pub const UNKNOWN_COMMAND_RESERVED: u32 = 175;

    /// Unspecific server fault (handler panic or internal error)
    pub const ASS_GENERAL: u32 = 257;
    /// Accept call failed on the listening socket
    pub const ASS_ACCEPT_FAILED: u32 = 258;
    /// Connect call failed, or session used after close
    pub const ASS_CONNECT_FAILED: u32 = 259;
    /// Stream ended before the line terminator
    pub const ASS_INCOMPLETE_LINE: u32 = 262;
    /// Raw line longer than the configured maximum
    pub const ASS_LINE_TOO_LONG: u32 = 263;
    /// Command received while another is in flight
    pub const ASS_NESTED_COMMANDS: u32 = 264;
    /// D/END/CAN received with no command or inquiry in flight
    pub const ASS_UNEXPECTED_CMD: u32 = 274;
    /// Command name with no registered handler
    pub const ASS_UNKNOWN_CMD: u32 = 275;
    /// Inquiry answered with CAN
    pub const ASS_CANCELED: u32 = 277;
    /// INQUIRE for a keyword the client cannot answer
    pub const ASS_UNKNOWN_INQUIRE: u32 = 281;
}
