//! Server state machine
//!
//! Drives the server half of a session: reads command lines, dispatches
//! to registered handlers, relays handler-emitted data/status lines and
//! INQUIRE sub-dialogs, and terminates every command with exactly one
//! `OK`/`ERR`.
//!
//! ## Dispatch model
//!
//! Command names map to handlers through a runtime registry keyed by
//! the upper-cased name. A handler receives the per-connection
//! [`ServerSession`] (its channel for data, status and inquiries) plus
//! the decoded parameter text, and returns the `OK` comment text or an
//! error that the engine renders as an `ERR` line. Handler failures
//! never tear down the session; framing failures always do.
//!
//! Built-in commands (`BYE`, `RESET`, `OPTION`, `NOP`, and the reserved
//! words `AUTH`/`QUIT`/`HELP`) are served when no handler is registered
//! under the same name. `BYE` cannot be overridden.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use bytes::{Bytes, BytesMut};

use crate::config::Config;
use crate::error::{code, AssuanError, Result};
use crate::protocol::{LineReader, LineWriter, Message};

/// A registered command handler
pub type Handler =
    Box<dyn Fn(&mut ServerSession<'_>, Option<&str>) -> Result<Option<String>> + Send + Sync>;

/// Per-session state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Between commands, waiting for the next request line
    Idle,
    /// A handler is running for the current command
    AwaitingHandlerCompletion,
    /// An INQUIRE is outstanding; only D/END/CAN are acceptable
    AwaitingInquiryResponse,
    /// BYE was processed; no further commands are accepted
    Closed,
}

/// Command registry plus configuration, shared across sessions
pub struct Server {
    config: Config,
    handlers: HashMap<String, Handler>,
}

impl Server {
    /// Create a server with no registered commands
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `name` (matched case-insensitively).
    ///
    /// Re-registering a name replaces the previous handler.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut ServerSession<'_>, Option<&str>) -> Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers
            .insert(name.to_ascii_uppercase(), Box::new(handler));
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drive one session over the given duplex stream halves.
    ///
    /// Blocks until the client sends `BYE`, the stream reaches EOF at a
    /// line boundary, or a fatal framing/transport error occurs.
    pub fn serve<R: Read, W: Write>(&self, reader: R, writer: W) -> Result<()> {
        let mut session = ServerSession {
            reader: LineReader::new(
                Box::new(BufReader::new(reader)),
                self.config.max_line_len,
            ),
            writer: LineWriter::new(Box::new(writer), self.config.max_line_len),
            extra_escape: self.config.extra_escape.clone(),
            options: HashMap::new(),
            vars: HashMap::new(),
            state: SessionState::Idle,
        };

        session.respond(&Message::Ok(Some(self.config.greeting.clone())))?;

        loop {
            let Some(line) = session.reader.read_line()? else {
                // client went away without BYE; nothing in flight, so
                // this is a clean shutdown
                tracing::debug!("client disconnected");
                return Ok(());
            };
            tracing::debug!("C: {}", String::from_utf8_lossy(&line));

            let message = match Message::parse_request(&line) {
                Ok(message) => message,
                Err(AssuanError::Encoding { offset }) => {
                    session.respond_err(&AssuanError::handler(
                        code::INV_REQUEST,
                        format!("Invalid request (bad escape at byte {offset})"),
                    ))?;
                    continue;
                }
                Err(AssuanError::ProtocolViolation(_)) => {
                    session.respond_err(&AssuanError::handler(
                        code::INV_REQUEST,
                        "Invalid request",
                    ))?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match message {
                Message::Bye(_) => {
                    session.respond(&Message::Ok(Some("closing connection".into())))?;
                    session.state = SessionState::Closed;
                    return Ok(());
                }
                Message::Command { name, parameters } => {
                    match self.dispatch(&mut session, &name, parameters.as_deref()) {
                        Ok(()) => {}
                        // BYE arrived mid-inquiry: the closing OK has
                        // already been written, so this is a clean end
                        Err(AssuanError::SessionClosed) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                // D/END/CAN only make sense while an inquiry is open,
                // and the inquiry loop consumes those itself
                Message::Data(_) | Message::End | Message::Cancel => {
                    session.respond_err(&AssuanError::handler(
                        code::ASS_UNEXPECTED_CMD,
                        "Unexpected command",
                    ))?;
                }
                other => {
                    tracing::warn!(?other, "unroutable request line");
                    session.respond_err(&AssuanError::handler(
                        code::INV_REQUEST,
                        "Invalid request",
                    ))?;
                }
            }
        }
    }

    fn dispatch(
        &self,
        session: &mut ServerSession<'_>,
        name: &str,
        parameters: Option<&str>,
    ) -> Result<()> {
        let key = name.to_ascii_uppercase();

        let result = if let Some(handler) = self.handlers.get(&key) {
            session.state = SessionState::AwaitingHandlerCompletion;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(session, parameters))) {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(command = %key, "handler panicked");
                    Err(AssuanError::handler(
                        code::ASS_GENERAL,
                        "Unspecific Assuan server fault",
                    ))
                }
            }
        } else {
            self.builtin(session, &key, parameters)
        };

        match result {
            Ok(text) => session.respond(&Message::Ok(text))?,
            Err(e) if is_fatal(&e) => {
                session.state = SessionState::Closed;
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(command = %key, error = %e, "command failed");
                session.respond_err(&e)?;
            }
        }
        session.state = SessionState::Idle;
        Ok(())
    }

    /// Default implementations for the protocol's housekeeping commands
    fn builtin(
        &self,
        session: &mut ServerSession<'_>,
        name: &str,
        parameters: Option<&str>,
    ) -> Result<Option<String>> {
        match name {
            "RESET" => {
                session.options.clear();
                session.vars.clear();
                Ok(None)
            }
            "NOP" => Ok(None),
            "OPTION" => {
                let arg = parameters.unwrap_or("");
                let (option, value) = parse_option(arg)?;
                if !self.config.valid_options.iter().any(|o| o == &option) {
                    if self.config.strict_options {
                        return Err(AssuanError::handler(
                            code::UNKNOWN_OPTION,
                            "Unknown option",
                        ));
                    }
                    tracing::debug!(option = %option, "skipping unknown option");
                } else {
                    session.options.insert(option, value);
                }
                Ok(None)
            }
            "AUTH" | "QUIT" | "HELP" => Err(AssuanError::handler(
                code::UNKNOWN_COMMAND_RESERVED,
                "Unknown command (reserved)",
            )),
            _ => {
                tracing::warn!(command = %name, "unknown command");
                Err(AssuanError::handler(
                    code::ASS_UNKNOWN_CMD,
                    "Unknown command",
                ))
            }
        }
    }
}

/// The per-connection half the engine hands to handlers
pub struct ServerSession<'a> {
    reader: LineReader<Box<dyn BufRead + 'a>>,
    writer: LineWriter<Box<dyn Write + 'a>>,
    extra_escape: Vec<u8>,
    options: HashMap<String, Option<String>>,
    vars: HashMap<String, String>,
    state: SessionState,
}

impl ServerSession<'_> {
    /// Current state machine phase
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Value of an option set by the client via `OPTION`
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(|v| v.as_deref())
    }

    /// All options set by the client
    pub fn options(&self) -> &HashMap<String, Option<String>> {
        &self.options
    }

    /// Store a session-scoped value (handler scratch space, cleared by RESET)
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Read back a session-scoped value
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.as_str())
    }

    /// Emit one or more `D` lines carrying `payload`
    pub fn send_data(&mut self, payload: &[u8]) -> Result<()> {
        self.check_in_command()?;
        tracing::debug!(len = payload.len(), "S: D <payload>");
        self.writer.write_data(payload, &self.extra_escape)
    }

    /// Emit a status line `S <keyword> <parameters>`
    pub fn send_status(&mut self, keyword: &str, parameters: &str) -> Result<()> {
        self.check_in_command()?;
        self.respond(&Message::Status {
            keyword: keyword.to_string(),
            parameters: parameters.to_string(),
        })
    }

    /// Emit a comment line (ignorable by the peer)
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.check_in_command()?;
        self.respond(&Message::Comment(text.to_string()))
    }

    /// Ask the client for data mid-command.
    ///
    /// Writes `INQUIRE <keyword> [parameters]`, then blocks until the
    /// client answers with `D` lines terminated by `END` (returned as
    /// the concatenated payload) or with `CAN` (returned as `None`).
    pub fn inquire(&mut self, keyword: &str, parameters: Option<&str>) -> Result<Option<Bytes>> {
        self.check_in_command()?;
        self.respond(&Message::Inquire {
            keyword: keyword.to_string(),
            parameters: parameters.map(|p| p.to_string()),
        })?;
        self.state = SessionState::AwaitingInquiryResponse;

        let mut payload = BytesMut::new();
        let outcome = loop {
            let Some(line) = self.reader.read_line()? else {
                self.state = SessionState::Closed;
                return Err(AssuanError::TransportClosed(
                    "stream closed during inquiry".into(),
                ));
            };
            tracing::debug!("C: {}", String::from_utf8_lossy(&line));

            match Message::parse_request(&line) {
                Ok(Message::Data(chunk)) => payload.extend_from_slice(&chunk),
                Ok(Message::End) => break Some(payload.freeze()),
                Ok(Message::Cancel) => break None,
                Ok(Message::Bye(_)) => {
                    self.respond(&Message::Ok(Some("closing connection".into())))?;
                    self.state = SessionState::Closed;
                    return Err(AssuanError::SessionClosed);
                }
                Ok(_) => {
                    self.state = SessionState::AwaitingHandlerCompletion;
                    return Err(AssuanError::ProtocolViolation(
                        "expected D, END or CAN while an inquiry is open".into(),
                    ));
                }
                Err(e) => {
                    self.state = SessionState::AwaitingHandlerCompletion;
                    return Err(e);
                }
            }
        };

        self.state = SessionState::AwaitingHandlerCompletion;
        Ok(outcome)
    }

    fn check_in_command(&self) -> Result<()> {
        match self.state {
            SessionState::AwaitingHandlerCompletion => Ok(()),
            SessionState::Closed => Err(AssuanError::SessionClosed),
            state => Err(AssuanError::ProtocolViolation(format!(
                "no command in flight (state {state:?})"
            ))),
        }
    }

    fn respond(&mut self, message: &Message) -> Result<()> {
        let line = message.encode(&self.extra_escape);
        tracing::debug!("S: {}", String::from_utf8_lossy(&line));
        self.writer.write_line(&line)
    }

    fn respond_err(&mut self, error: &AssuanError) -> Result<()> {
        self.respond(&Message::Err {
            code: error.wire_code(),
            message: Some(error_message(error)),
        })
    }
}

/// Whether an error must end the session instead of becoming an `ERR` line
fn is_fatal(error: &AssuanError) -> bool {
    matches!(
        error,
        AssuanError::Io(_)
            | AssuanError::Framing(_)
            | AssuanError::IncompleteLine(_)
            | AssuanError::TransportClosed(_)
            | AssuanError::SessionClosed
    )
}

fn error_message(error: &AssuanError) -> String {
    match error {
        AssuanError::Handler { message, .. } => message.clone(),
        AssuanError::Remote { message, .. } => message
            .clone()
            .unwrap_or_else(|| "General error".to_string()),
        other => other.to_string(),
    }
}

/// Parse `OPTION` arguments: `name`, `--name`, `name=value` and
/// `name value` forms are all accepted; a value without a separating
/// space or `=` is invalid.
fn parse_option(arg: &str) -> Result<(String, Option<String>)> {
    let invalid = || AssuanError::handler(code::INV_PARAMETER, "Invalid parameter");

    let arg = arg
        .strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .unwrap_or(arg);

    let name_len = arg
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .count();
    if name_len == 0 {
        return Err(invalid());
    }
    let name = arg[..name_len].to_string();
    let rest = &arg[name_len..];

    let after_spaces = rest.trim_start_matches(' ');
    let had_space = after_spaces.len() != rest.len();
    let (had_equal, after_equal) = match after_spaces.strip_prefix('=') {
        Some(r) => (true, r),
        None => (false, after_spaces),
    };
    let value = after_equal.trim_matches(' ');

    if !value.is_empty() && !had_space && !had_equal {
        return Err(invalid());
    }
    let value = if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    };
    Ok((name, value))
}
