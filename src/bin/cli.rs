//! Assuan CLI Client
//!
//! Connects to an Assuan server on a Unix socket, issues one command,
//! prints the status lines and decoded data, then says BYE.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use assuan::{AssuanError, Config};

/// One-shot Assuan client
#[derive(Parser, Debug)]
#[command(name = "assuan-cli")]
#[command(about = "CLI client for Assuan servers")]
#[command(version)]
struct Args {
    /// Path to the server's Unix socket
    #[arg(short, long)]
    socket: PathBuf,

    /// Answer any INQUIRE with this text (default: cancel inquiries)
    #[arg(short, long)]
    answer: Option<String>,

    /// Command to issue (e.g. GETINFO)
    command: String,

    /// Command parameters
    parameters: Option<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut client = match assuan::transport::connect_unix(&args.socket, Config::default()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("connect failed: {e}");
            std::process::exit(1);
        }
    };

    let answer = args.answer.clone();
    let mut responder = move |keyword: &str, _params: Option<&str>| -> assuan::Result<Option<Vec<u8>>> {
        eprintln!("INQUIRE {keyword}");
        Ok(answer.as_ref().map(|a| a.clone().into_bytes()))
    };

    let result = client.invoke(
        &args.command,
        args.parameters.as_deref(),
        Some(&mut responder),
    );
    let _ = client.bye();

    match result {
        Ok(reply) => {
            for (keyword, parameters) in &reply.status {
                println!("S {keyword} {parameters}");
            }
            if let Some(data) = &reply.data {
                println!("{}", String::from_utf8_lossy(data));
            }
            if let Some(message) = &reply.message {
                eprintln!("OK {message}");
            }
        }
        Err(AssuanError::Remote { code, message }) => {
            eprintln!(
                "ERR {code} {}",
                message.as_deref().unwrap_or("(no description)")
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
