//! Transport Adapter
//!
//! Boundary glue between the protocol engine and the operating system:
//! Unix-domain sockets, stdio pipe pairs, and a thread-per-connection
//! accept loop. The engine itself only ever sees the two halves of a
//! duplex byte stream.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::client::Client;
use crate::config::Config;
use crate::error::Result;
use crate::server::Server;

// =============================================================================
// Client-side constructors
// =============================================================================

/// Connect to a server over a Unix-domain socket.
///
/// Performs the greeting handshake before returning, so the client is
/// ready for [`Client::invoke`].
pub fn connect_unix(path: impl AsRef<Path>, config: Config) -> Result<Client<'static>> {
    let stream = UnixStream::connect(path.as_ref())?;
    let reader = stream.try_clone()?;
    let mut client = Client::new(reader, stream, config);
    let greeting = client.handshake()?;
    tracing::debug!(?greeting, "connected to {}", path.as_ref().display());
    Ok(client)
}

/// Talk to a server over this process's stdin/stdout (pipe pair).
pub fn connect_stdio(config: Config) -> Result<Client<'static>> {
    let mut client = Client::new(io::stdin(), io::stdout(), config);
    let greeting = client.handshake()?;
    tracing::debug!(?greeting, "connected over stdio");
    Ok(client)
}

// =============================================================================
// Server-side runners
// =============================================================================

/// Serve a single session over this process's stdin/stdout.
pub fn serve_stdio(server: &Server) -> Result<()> {
    server.serve(io::stdin(), io::stdout())
}

/// Accept connections on a Unix-domain socket, one session thread per
/// connection, bounded by `Config::max_connections`.
///
/// Runs until accepting fails. Connections beyond the cap are dropped
/// immediately rather than queued.
pub fn serve_unix(server: Arc<Server>, listener: UnixListener) -> Result<()> {
    let max_connections = server.config().max_connections;
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();

    tracing::info!(max_connections, "listening on unix socket");
    loop {
        let (stream, _addr) = listener.accept()?;

        sessions.retain(|handle| !handle.is_finished());
        if sessions.len() >= max_connections {
            tracing::warn!("connection limit reached, dropping new connection");
            drop(stream);
            continue;
        }

        let server = Arc::clone(&server);
        sessions.push(thread::spawn(move || {
            if let Err(e) = serve_stream(&server, stream) {
                tracing::warn!(error = %e, "session ended with error");
            }
        }));
    }
}

fn serve_stream(server: &Server, stream: UnixStream) -> Result<()> {
    let reader = stream.try_clone()?;
    server.serve(reader, stream)
}
