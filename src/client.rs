//! Client state machine
//!
//! Drives the client half of a session: sends one command at a time,
//! collects the continuation data/status lines, answers server
//! inquiries through a caller-supplied responder, and surfaces the
//! terminal `OK`/`ERR` as a [`Result`].

use std::io::{BufRead, BufReader, Read, Write};

use bytes::{Bytes, BytesMut};

use crate::config::Config;
use crate::error::{AssuanError, Result};
use crate::protocol::{LineReader, LineWriter, Message};

/// Answers a server inquiry: return the payload to send, or `None` to
/// cancel the inquiry with `CAN`.
pub type InquiryResponder<'r> = dyn FnMut(&str, Option<&str>) -> Result<Option<Vec<u8>>> + 'r;

/// The collected outcome of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Comment text carried on the terminal `OK` line, if any
    pub message: Option<String>,

    /// Status lines in arrival order, as (keyword, parameters) pairs
    pub status: Vec<(String, String)>,

    /// Concatenated payload of all `D` lines, if any arrived
    pub data: Option<Bytes>,
}

/// Client-side session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Ready,
    Closed,
}

/// One client session over a duplex byte stream
pub struct Client<'a> {
    reader: LineReader<Box<dyn BufRead + 'a>>,
    writer: LineWriter<Box<dyn Write + 'a>>,
    config: Config,
    state: ClientState,
}

impl<'a> Client<'a> {
    /// Wrap the two halves of a duplex stream.
    ///
    /// Call [`Client::handshake`] next to consume the server greeting.
    pub fn new<R, W>(reader: R, writer: W, config: Config) -> Self
    where
        R: Read + 'a,
        W: Write + 'a,
    {
        let max = config.max_line_len;
        Self {
            reader: LineReader::new(Box::new(BufReader::new(reader)), max),
            writer: LineWriter::new(Box::new(writer), max),
            config,
            state: ClientState::Ready,
        }
    }

    /// Consume the server's `OK` greeting, returning its text.
    ///
    /// Servers speak first; this must be called once before the first
    /// [`Client::invoke`].
    pub fn handshake(&mut self) -> Result<Option<String>> {
        match self.read_response()? {
            Message::Ok(text) => Ok(text),
            Message::Err { code, message } => Err(AssuanError::Remote { code, message }),
            other => Err(AssuanError::ProtocolViolation(format!(
                "expected greeting, got {other:?}"
            ))),
        }
    }

    /// Issue `name [parameters]` and collect the full response.
    ///
    /// `responder` is consulted for each `INQUIRE` the server issues
    /// mid-command; pass `None` to cancel any inquiry. Returns the
    /// accumulated reply on `OK`, [`AssuanError::Remote`] on `ERR`.
    pub fn invoke(
        &mut self,
        name: &str,
        parameters: Option<&str>,
        mut responder: Option<&mut InquiryResponder<'_>>,
    ) -> Result<Reply> {
        if self.state == ClientState::Closed {
            return Err(AssuanError::SessionClosed);
        }

        self.write_request(&Message::Command {
            name: name.to_string(),
            parameters: parameters.map(|p| p.to_string()),
        })?;

        let mut status = Vec::new();
        let mut data = BytesMut::new();
        let mut saw_data = false;
        // responder failure cancels the inquiry but the exchange still
        // runs to its terminal line before the error surfaces
        let mut deferred: Option<AssuanError> = None;

        loop {
            match self.read_response()? {
                Message::Data(chunk) => {
                    saw_data = true;
                    data.extend_from_slice(&chunk);
                }
                Message::Status {
                    keyword,
                    parameters,
                } => status.push((keyword, parameters)),
                Message::Comment(text) => {
                    tracing::debug!(comment = %text, "ignoring comment line");
                }
                Message::Inquire {
                    keyword,
                    parameters,
                } => {
                    let answer = match responder.as_deref_mut() {
                        Some(responder) => match responder(&keyword, parameters.as_deref()) {
                            Ok(answer) => answer,
                            Err(e) => {
                                deferred = Some(e);
                                None
                            }
                        },
                        None => {
                            tracing::debug!(keyword, "no inquiry responder, cancelling");
                            None
                        }
                    };
                    self.answer_inquiry(answer)?;
                }
                Message::Ok(message) => {
                    if let Some(e) = deferred {
                        return Err(e);
                    }
                    return Ok(Reply {
                        message,
                        status,
                        data: saw_data.then(|| data.freeze()),
                    });
                }
                Message::Err { code, message } => {
                    return Err(deferred.unwrap_or(AssuanError::Remote { code, message }));
                }
                other => {
                    return Err(AssuanError::ProtocolViolation(format!(
                        "unexpected line while awaiting response: {other:?}"
                    )));
                }
            }
        }
    }

    /// End the session with `BYE` and wait for the server's `OK`.
    ///
    /// The session is closed afterwards regardless of the outcome.
    pub fn bye(&mut self) -> Result<Option<String>> {
        if self.state == ClientState::Closed {
            return Ok(None);
        }
        self.state = ClientState::Closed;
        self.write_request(&Message::Bye(None))?;
        match self.read_response()? {
            Message::Ok(text) => Ok(text),
            Message::Err { code, message } => Err(AssuanError::Remote { code, message }),
            other => Err(AssuanError::ProtocolViolation(format!(
                "expected terminal response to BYE, got {other:?}"
            ))),
        }
    }

    /// Whether BYE has been sent on this session
    pub fn is_closed(&self) -> bool {
        self.state == ClientState::Closed
    }

    fn answer_inquiry(&mut self, answer: Option<Vec<u8>>) -> Result<()> {
        match answer {
            Some(payload) => {
                tracing::debug!(len = payload.len(), "answering inquiry");
                self.writer.write_data(&payload, &self.config.extra_escape)?;
                self.write_request(&Message::End)
            }
            None => self.write_request(&Message::Cancel),
        }
    }

    fn write_request(&mut self, message: &Message) -> Result<()> {
        let line = message.encode(&self.config.extra_escape);
        tracing::debug!("C: {}", String::from_utf8_lossy(&line));
        self.writer.write_line(&line)
    }

    fn read_response(&mut self) -> Result<Message> {
        match self.next_message() {
            Ok(message) => Ok(message),
            Err(e) => {
                // any framing or parse failure desynchronizes the
                // response stream; the session cannot be reused
                self.state = ClientState::Closed;
                Err(e)
            }
        }
    }

    fn next_message(&mut self) -> Result<Message> {
        let Some(line) = self.reader.read_line()? else {
            return Err(AssuanError::TransportClosed(
                "server closed the stream".into(),
            ));
        };
        tracing::debug!("S: {}", String::from_utf8_lossy(&line));
        Message::parse_response(&line)
    }
}
