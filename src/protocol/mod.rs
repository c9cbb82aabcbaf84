//! Protocol Module
//!
//! Wire format of the Assuan protocol: line framing, percent escaping
//! and the typed message model.
//!
//! ## Wire Format
//!
//! One message per line, terminated by `\n` (an optional preceding `\r`
//! is stripped). Lines are capped at a configurable maximum, 1000 bytes
//! by default.
//!
//! ```text
//! client -> server                server -> client
//! ----------------                ----------------
//! <COMMAND> [params]              OK [text]
//! D <escaped payload>             ERR <code> [text]
//! END                             D <escaped payload>
//! CAN                             S <KEYWORD> [text]
//! BYE [text]                      INQUIRE <KEYWORD> [params]
//!                                 # <text>
//! ```
//!
//! Bytes that would break line syntax (`%`, CR, LF, NUL, plus any
//! application-reserved bytes) travel as `%XX` escapes.

mod codec;
pub mod escape;
mod message;

pub use codec::{LineReader, LineWriter};
pub use message::Message;
