//! Message definitions
//!
//! Typed representation of every protocol line kind, with parsing from
//! and serialization to raw lines (terminator excluded).
//!
//! Parsing is direction-aware: the same bytes mean different things on
//! the two halves of the wire, so servers use [`Message::parse_request`]
//! and clients use [`Message::parse_response`]. Serialization via
//! [`Message::encode`] is total.

use crate::error::{AssuanError, Result};
use crate::protocol::escape;

/// A decoded protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Success terminator with optional comment text
    Ok(Option<String>),

    /// Failure terminator: numeric code plus optional description
    Err { code: u32, message: Option<String> },

    /// One chunk of a multi-chunk payload, already percent-decoded
    Data(Vec<u8>),

    /// Out-of-band status notification; never terminates a command
    Status { keyword: String, parameters: String },

    /// Ignorable annotation line
    Comment(String),

    /// Server request for additional data mid-command
    Inquire {
        keyword: String,
        parameters: Option<String>,
    },

    /// Terminates the data sequence answering an inquiry
    End,

    /// Aborts the current inquiry
    Cancel,

    /// Session termination request with optional comment text
    Bye(Option<String>),

    /// Client-issued request line (server-received only)
    Command {
        name: String,
        parameters: Option<String>,
    },
}

impl Message {
    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize to a raw line, without the terminator.
    ///
    /// `extra_escape` extends the mandatory percent-escape set for
    /// parameter text and data payloads.
    pub fn encode(&self, extra_escape: &[u8]) -> Vec<u8> {
        match self {
            Message::Ok(text) => with_text(b"OK", text.as_deref(), extra_escape),
            Message::Err { code, message } => {
                let mut line = format!("ERR {code}").into_bytes();
                if let Some(text) = message {
                    line.push(b' ');
                    line.extend_from_slice(&escape::encode(text.as_bytes(), extra_escape));
                }
                line
            }
            Message::Data(payload) => {
                if payload.is_empty() {
                    b"D".to_vec()
                } else {
                    let mut line = b"D ".to_vec();
                    line.extend_from_slice(&escape::encode(payload, extra_escape));
                    line
                }
            }
            Message::Status {
                keyword,
                parameters,
            } => {
                let mut line = format!("S {keyword}").into_bytes();
                if !parameters.is_empty() {
                    line.push(b' ');
                    line.extend_from_slice(&escape::encode(parameters.as_bytes(), extra_escape));
                }
                line
            }
            Message::Comment(text) => with_text(b"#", Some(text).filter(|t| !t.is_empty()).map(|t| t.as_str()), extra_escape),
            Message::Inquire {
                keyword,
                parameters,
            } => {
                let mut line = format!("INQUIRE {keyword}").into_bytes();
                if let Some(params) = parameters {
                    line.push(b' ');
                    line.extend_from_slice(&escape::encode(params.as_bytes(), extra_escape));
                }
                line
            }
            Message::End => b"END".to_vec(),
            Message::Cancel => b"CAN".to_vec(),
            Message::Bye(text) => with_text(b"BYE", text.as_deref(), extra_escape),
            Message::Command { name, parameters } => {
                with_text(name.as_bytes(), parameters.as_deref(), extra_escape)
            }
        }
    }

    // =========================================================================
    // Parsing: client -> server lines
    // =========================================================================

    /// Parse a line received by a server.
    ///
    /// Produces `Data`, `End`, `Cancel`, `Bye` or `Command`. The command
    /// name must be a non-empty run of word characters; any parameters
    /// must be separated by at least one space and are percent-decoded.
    pub fn parse_request(line: &[u8]) -> Result<Message> {
        // Data lines keep a single space and the raw remainder: spaces
        // inside the payload are significant.
        if line == b"D" {
            return Ok(Message::Data(Vec::new()));
        }
        if let Some(rest) = line.strip_prefix(b"D ") {
            return Ok(Message::Data(escape::decode(rest)?));
        }

        let (name, parameters) = split_command(line)?;
        if name.eq_ignore_ascii_case("END") {
            return Ok(Message::End);
        }
        if name.eq_ignore_ascii_case("CAN") {
            return Ok(Message::Cancel);
        }
        if name.eq_ignore_ascii_case("BYE") {
            return Ok(Message::Bye(parameters));
        }
        Ok(Message::Command { name, parameters })
    }

    // =========================================================================
    // Parsing: server -> client lines
    // =========================================================================

    /// Parse a line received by a client.
    ///
    /// Produces `Ok`, `Err`, `Data`, `Status`, `Comment` or `Inquire`.
    pub fn parse_response(line: &[u8]) -> Result<Message> {
        if line == b"D" {
            return Ok(Message::Data(Vec::new()));
        }
        if let Some(rest) = line.strip_prefix(b"D ") {
            return Ok(Message::Data(escape::decode(rest)?));
        }
        if line == b"#" {
            return Ok(Message::Comment(String::new()));
        }
        if let Some(rest) = line.strip_prefix(b"# ") {
            let text = escape::decode(rest)?;
            return Ok(Message::Comment(decode_text(&text)?));
        }

        let (word, parameters) = split_command(line).map_err(|_| invalid_response(line))?;
        match word.as_str() {
            "OK" => Ok(Message::Ok(parameters)),
            "ERR" => {
                let params = parameters.ok_or_else(|| invalid_response(line))?;
                let mut fields = params.splitn(2, ' ');
                let code: u32 = fields
                    .next()
                    .and_then(|c| c.parse().ok())
                    .ok_or_else(|| invalid_response(line))?;
                let message = fields.next().map(|m| m.trim().to_string());
                Ok(Message::Err { code, message })
            }
            "S" => {
                let params = parameters.ok_or_else(|| invalid_response(line))?;
                let mut fields = params.splitn(2, ' ');
                let keyword = fields
                    .next()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| invalid_response(line))?
                    .to_string();
                let parameters = fields.next().unwrap_or("").to_string();
                Ok(Message::Status {
                    keyword,
                    parameters,
                })
            }
            "INQUIRE" => {
                let params = parameters.ok_or_else(|| invalid_response(line))?;
                let mut fields = params.splitn(2, ' ');
                let keyword = fields
                    .next()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| invalid_response(line))?
                    .to_string();
                let parameters = fields.next().map(|p| p.to_string());
                Ok(Message::Inquire {
                    keyword,
                    parameters,
                })
            }
            _ => Err(invalid_response(line)),
        }
    }

    /// True for the `Ok`/`Err` lines that end a command
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Ok(_) | Message::Err { .. })
    }
}

/// `<word> [parameters]`: leading word characters, then at least one
/// space before any parameters, which are percent-decoded.
fn split_command(line: &[u8]) -> Result<(String, Option<String>)> {
    let word_len = line
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if word_len == 0 {
        return Err(AssuanError::ProtocolViolation(
            "request line does not start with a command word".into(),
        ));
    }
    // word characters only, so this is pure ASCII
    let name = String::from_utf8_lossy(&line[..word_len]).into_owned();

    let rest = &line[word_len..];
    if rest.is_empty() {
        return Ok((name, None));
    }
    if rest[0] != b' ' {
        return Err(AssuanError::ProtocolViolation(
            "command word not followed by a space".into(),
        ));
    }
    let params = &rest[rest.iter().take_while(|b| **b == b' ').count()..];
    if params.is_empty() {
        return Ok((name, None));
    }
    let decoded = escape::decode(params)?;
    Ok((name, Some(decode_text(&decoded)?)))
}

fn with_text(prefix: &[u8], text: Option<&str>, extra_escape: &[u8]) -> Vec<u8> {
    let mut line = prefix.to_vec();
    if let Some(text) = text {
        line.push(b' ');
        line.extend_from_slice(&escape::encode(text.as_bytes(), extra_escape));
    }
    line
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AssuanError::ProtocolViolation("parameter text is not valid UTF-8".into()))
}

fn invalid_response(line: &[u8]) -> AssuanError {
    AssuanError::ProtocolViolation(format!(
        "invalid response line: {:?}",
        String::from_utf8_lossy(line)
    ))
}
