//! End-to-end tests over a real Unix socket
//!
//! A server thread and a client exercise the full path: socket
//! transport, framing, dispatch, inquiry sub-dialog and teardown.

use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assuan::error::code;
use assuan::transport;
use assuan::{AssuanError, Config, Server};

fn demo_server() -> Server {
    let mut server = Server::new(
        Config::builder()
            .greeting("demo agent ready")
            .valid_option("display")
            .build(),
    );
    server.register("ECHO", |session, params| {
        session.send_data(params.unwrap_or("").as_bytes())?;
        Ok(None)
    });
    server.register("SHOW", |session, _| {
        Ok(Some(session.option("display").unwrap_or("unset").to_string()))
    });
    server.register("SIGN", |session, _| {
        match session.inquire("KEYDATA", None)? {
            Some(payload) => {
                session.send_status("SIG_CREATED", "D 42")?;
                session.send_data(&payload)?;
                Ok(Some("signature follows".into()))
            }
            None => Err(AssuanError::handler(
                code::ASS_CANCELED,
                "IPC call has been cancelled",
            )),
        }
    });
    server
}

/// Bind a socket in a scratch dir and serve sessions until the test ends
fn spawn_server(sessions: usize) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let server = Arc::new(demo_server());

    thread::spawn(move || {
        for _ in 0..sessions {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let reader = stream.try_clone().unwrap();
                let _ = server.serve(reader, stream);
            });
        }
    });

    (dir, path)
}

fn connect(path: &std::path::Path) -> assuan::Client<'static> {
    // the listener thread may not be accepting yet
    for _ in 0..50 {
        match transport::connect_unix(path, Config::default()) {
            Ok(client) => return client,
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
    panic!("could not connect to {}", path.display());
}

#[test]
fn test_echo_over_unix_socket() {
    let (_dir, path) = spawn_server(1);
    let mut client = connect(&path);

    let reply = client
        .invoke("ECHO", Some("hello over the socket"), None)
        .unwrap();
    assert_eq!(reply.data.as_deref(), Some(&b"hello over the socket"[..]));

    client.bye().unwrap();
}

#[test]
fn test_inquiry_round_trip_over_socket() {
    let (_dir, path) = spawn_server(1);
    let mut client = connect(&path);

    // payload long enough to be split across several D lines
    let keydata: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let sent = keydata.clone();
    let mut responder = move |keyword: &str, _: Option<&str>| -> assuan::Result<Option<Vec<u8>>> {
        assert_eq!(keyword, "KEYDATA");
        Ok(Some(sent.clone()))
    };

    let reply = client.invoke("SIGN", None, Some(&mut responder)).unwrap();
    assert_eq!(reply.message.as_deref(), Some("signature follows"));
    assert_eq!(reply.status, vec![("SIG_CREATED".into(), "D 42".into())]);
    assert_eq!(reply.data.as_deref(), Some(keydata.as_slice()));

    client.bye().unwrap();
}

#[test]
fn test_sessions_are_independent() {
    let (_dir, path) = spawn_server(2);

    let mut first = connect(&path);
    let mut second = connect(&path);

    // an option set on one session must not leak into the other
    first.invoke("OPTION", Some("display=:0"), None).unwrap();
    let own = first.invoke("SHOW", None, None).unwrap();
    assert_eq!(own.message.as_deref(), Some(":0"));
    let other = second.invoke("SHOW", None, None).unwrap();
    assert_eq!(other.message.as_deref(), Some("unset"));

    first.bye().unwrap();
    second.bye().unwrap();
}

#[test]
fn test_unknown_command_over_socket() {
    let (_dir, path) = spawn_server(1);
    let mut client = connect(&path);

    match client.invoke("FROB", Some("foo"), None).unwrap_err() {
        AssuanError::Remote { code: c, message } => {
            assert_eq!(c, code::ASS_UNKNOWN_CMD);
            assert_eq!(message.as_deref(), Some("Unknown command"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    client.bye().unwrap();
}
