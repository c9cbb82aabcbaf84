//! Pinentry-style demo server
//!
//! Serves a small pinentry command set over stdio or a Unix socket:
//! SETDESC/SETPROMPT/SETERROR/SETTITLE, GETINFO, GETPIN, CONFIRM and
//! MESSAGE, plus the engine's built-ins (BYE, RESET, OPTION, NOP).

use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use assuan::error::code;
use assuan::{AssuanError, Config, Server};

/// Minimal pinentry over the Assuan protocol
#[derive(Parser, Debug)]
#[command(name = "assuan-pinentry")]
#[command(about = "Pinentry-style Assuan demo server")]
#[command(version)]
struct Args {
    /// Listen on this Unix socket instead of serving one session on stdio
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// PIN returned by GETPIN; omitted, GETPIN asks the client via INQUIRE
    #[arg(short, long)]
    pin: Option<String>,

    /// Maximum concurrent socket sessions
    #[arg(short, long, default_value = "10")]
    max_connections: usize,
}

fn build_server(args: &Args) -> Server {
    let config = Config::builder()
        .greeting("Your orders please")
        .valid_option("display")
        .valid_option("ttyname")
        .valid_option("lc-ctype")
        .strict_options(false)
        .max_connections(args.max_connections)
        .build();

    let mut server = Server::new(config);

    for name in ["SETDESC", "SETPROMPT", "SETERROR", "SETTITLE"] {
        let key = name.trim_start_matches("SET").to_ascii_lowercase();
        server.register(name, move |session, params| {
            session.set_var(key.clone(), params.unwrap_or(""));
            Ok(None)
        });
    }

    server.register("GETINFO", |session, params| match params {
        Some("pid") => {
            session.send_data(process::id().to_string().as_bytes())?;
            Ok(None)
        }
        Some("version") => {
            session.send_data(assuan::VERSION.as_bytes())?;
            Ok(None)
        }
        _ => Err(AssuanError::handler(
            code::INV_PARAMETER,
            "Invalid parameter",
        )),
    });

    let pin = args.pin.clone();
    server.register("GETPIN", move |session, _params| {
        if let Some(prompt) = session.var("prompt") {
            let prompt = prompt.to_string();
            session.send_status("PROMPT", &prompt)?;
        }
        let pin = match &pin {
            Some(pin) => pin.clone().into_bytes(),
            None => {
                // no configured PIN: ask the peer for one
                let desc = session.var("desc").map(str::to_string);
                match session.inquire("PASSPHRASE", desc.as_deref())? {
                    Some(answer) => answer.to_vec(),
                    None => {
                        return Err(AssuanError::handler(
                            code::ASS_CANCELED,
                            "IPC call has been cancelled",
                        ))
                    }
                }
            }
        };
        session.send_data(&pin)?;
        Ok(None)
    });

    server.register("CONFIRM", |session, _params| {
        let desc = session.var("desc").map(str::to_string);
        match session.inquire("CONFIRM", desc.as_deref())? {
            Some(_) => Ok(Some("confirmed".into())),
            None => Err(AssuanError::handler(
                code::ASS_CANCELED,
                "IPC call has been cancelled",
            )),
        }
    });

    server.register("MESSAGE", |session, _params| {
        if let Some(desc) = session.var("desc") {
            tracing::info!(desc, "MESSAGE");
        }
        Ok(None)
    });

    server
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,assuan=debug"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = build_server(&args);

    let outcome = match &args.socket {
        Some(path) => {
            // stale socket file from a previous run
            let _ = std::fs::remove_file(path);
            match UnixListener::bind(path) {
                Ok(listener) => {
                    tracing::info!("listening on {}", path.display());
                    assuan::transport::serve_unix(Arc::new(server), listener)
                }
                Err(e) => Err(e.into()),
            }
        }
        None => assuan::transport::serve_stdio(&server),
    };

    if let Err(e) = outcome {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
