//! Configuration for Assuan sessions
//!
//! Centralized configuration with sensible defaults.

/// Configuration shared by client and server sessions
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Framing Configuration
    // -------------------------------------------------------------------------
    /// Maximum raw line length in bytes, excluding the terminator.
    ///
    /// The protocol historically fixes this at 1000; both peers must
    /// agree or long data lines will be rejected as framing errors.
    pub max_line_len: usize,

    /// Bytes escaped as `%XX` in addition to the mandatory set
    /// (`%`, CR, LF, NUL). Deployments that keep e.g. spaces or colons
    /// out of parameter syntax list them here.
    pub extra_escape: Vec<u8>,

    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// Text of the `OK` greeting written when a session opens
    pub greeting: String,

    /// Option names the server accepts via `OPTION`
    pub valid_options: Vec<String>,

    /// Reject unknown options with `ERR 174` instead of skipping them
    pub strict_options: bool,

    /// Max concurrent sessions accepted by the socket server
    pub max_connections: usize,
}

/// Default maximum line length (excluding terminator)
pub const DEFAULT_LINE_LENGTH: usize = 1000;

impl Default for Config {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_LINE_LENGTH,
            extra_escape: Vec::new(),
            greeting: "Your orders please".to_string(),
            valid_options: Vec::new(),
            strict_options: true,
            max_connections: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the maximum raw line length (excluding terminator)
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.config.max_line_len = len;
        self
    }

    /// Add a byte to the escape set beyond the mandatory `% \r \n NUL`
    pub fn escape_byte(mut self, byte: u8) -> Self {
        self.config.extra_escape.push(byte);
        self
    }

    /// Set the server greeting text
    pub fn greeting(mut self, text: impl Into<String>) -> Self {
        self.config.greeting = text.into();
        self
    }

    /// Declare an option name the server accepts
    pub fn valid_option(mut self, name: impl Into<String>) -> Self {
        self.config.valid_options.push(name.into());
        self
    }

    /// Whether unknown options are rejected (true) or skipped (false)
    pub fn strict_options(mut self, strict: bool) -> Self {
        self.config.strict_options = strict;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
