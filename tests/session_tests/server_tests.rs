//! Server state machine tests
//!
//! Each test drives a server session with a scripted client transcript
//! and checks the exact sequence of emitted lines.

use std::io::Cursor;

use assuan::error::code;
use assuan::{AssuanError, Config, Result, Server};

/// Run one session against a scripted client and return (outcome, lines)
fn run(server: &Server, script: &str) -> (Result<()>, Vec<String>) {
    let mut out = Vec::new();
    let result = server.serve(Cursor::new(script.as_bytes().to_vec()), &mut out);
    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    (result, lines)
}

fn echo_server() -> Server {
    let mut server = Server::new(Config::default());
    server.register("ECHO", |session, params| {
        session.send_status("ECHOING", "1 line")?;
        session.send_data(params.unwrap_or("").as_bytes())?;
        Ok(Some("done".into()))
    });
    server
}

// =============================================================================
// Greeting and Teardown
// =============================================================================

#[test]
fn test_greeting_is_first_line() {
    let (result, lines) = run(&Server::new(Config::default()), "BYE\n");
    result.unwrap();
    assert_eq!(
        lines,
        vec!["OK Your orders please", "OK closing connection"]
    );
}

#[test]
fn test_eof_without_bye_is_clean() {
    let (result, lines) = run(&Server::new(Config::default()), "");
    result.unwrap();
    assert_eq!(lines, vec!["OK Your orders please"]);
}

#[test]
fn test_configured_greeting() {
    let server = Server::new(Config::builder().greeting("pinentry ready").build());
    let (_, lines) = run(&server, "BYE\n");
    assert_eq!(lines[0], "OK pinentry ready");
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_handler_emissions_arrive_in_order_before_terminal() {
    let (result, lines) = run(&echo_server(), "ECHO hello there\nBYE\n");
    result.unwrap();
    assert_eq!(
        lines,
        vec![
            "OK Your orders please",
            "S ECHOING 1 line",
            "D hello there",
            "OK done",
            "OK closing connection",
        ]
    );
}

#[test]
fn test_command_names_are_case_insensitive() {
    let (_, lines) = run(&echo_server(), "echo hi\nBYE\n");
    assert!(lines.contains(&"D hi".to_string()));
}

#[test]
fn test_unknown_command_leaves_session_usable() {
    let (result, lines) = run(&echo_server(), "FROB foo\nECHO ok\nBYE\n");
    result.unwrap();
    assert_eq!(lines[1], format!("ERR {} Unknown command", code::ASS_UNKNOWN_CMD));
    // the session stayed in Idle and served the next command
    assert!(lines.contains(&"D ok".to_string()));
}

#[test]
fn test_reserved_commands_answer_reserved_code() {
    for verb in ["AUTH", "QUIT", "HELP"] {
        let (_, lines) = run(&echo_server(), &format!("{verb}\nBYE\n"));
        assert_eq!(
            lines[1],
            format!(
                "ERR {} Unknown command (reserved)",
                code::UNKNOWN_COMMAND_RESERVED
            ),
            "verb {verb}"
        );
    }
}

#[test]
fn test_nop_and_reset_builtin() {
    let (result, lines) = run(&Server::new(Config::default()), "NOP\nRESET\nBYE\n");
    result.unwrap();
    assert_eq!(
        lines,
        vec![
            "OK Your orders please",
            "OK",
            "OK",
            "OK closing connection",
        ]
    );
}

// =============================================================================
// Error Isolation
// =============================================================================

#[test]
fn test_handler_error_becomes_err_line() {
    let mut server = echo_server();
    server.register("FAIL", |_, _| {
        Err(AssuanError::handler(code::GENERAL, "no such key"))
    });
    let (result, lines) = run(&server, "FAIL\nECHO still alive\nBYE\n");
    result.unwrap();
    assert_eq!(lines[1], format!("ERR {} no such key", code::GENERAL));
    assert!(lines.contains(&"D still alive".to_string()));
}

#[test]
fn test_handler_panic_is_contained() {
    let mut server = echo_server();
    server.register("BOOM", |_, _| panic!("handler bug"));
    let (result, lines) = run(&server, "BOOM\nECHO survived\nBYE\n");
    result.unwrap();
    assert_eq!(
        lines[1],
        format!("ERR {} Unspecific Assuan server fault", code::ASS_GENERAL)
    );
    assert!(lines.contains(&"D survived".to_string()));
}

// =============================================================================
// Malformed Input
// =============================================================================

#[test]
fn test_malformed_request_gets_invalid_request_err() {
    let (result, lines) = run(&echo_server(), " invalid\nBYE\n");
    result.unwrap();
    assert_eq!(lines[1], format!("ERR {} Invalid request", code::INV_REQUEST));
}

#[test]
fn test_bad_escape_in_parameters_rejected() {
    let (result, lines) = run(&echo_server(), "ECHO bad%G5\nBYE\n");
    result.unwrap();
    assert!(lines[1].starts_with(&format!("ERR {}", code::INV_REQUEST)), "{}", lines[1]);
}

#[test]
fn test_stray_data_line_in_idle() {
    let (result, lines) = run(&echo_server(), "D orphan\nEND\nCAN\nBYE\n");
    result.unwrap();
    let expected = format!("ERR {} Unexpected command", code::ASS_UNEXPECTED_CMD);
    assert_eq!(&lines[1..4], &[expected.clone(), expected.clone(), expected]);
}

#[test]
fn test_over_long_line_ends_session() {
    let mut script = vec![b'x'; 1001];
    script.push(b'\n');
    let mut out = Vec::new();
    let result = echo_server().serve(Cursor::new(script), &mut out);
    assert!(matches!(result.unwrap_err(), AssuanError::Framing(_)));
}

#[test]
fn test_command_line_of_exactly_max_length_is_dispatched() {
    // an unknown command padded to exactly the limit still parses
    let mut script = String::from("FROB ");
    script.push_str(&"x".repeat(1000 - script.len()));
    script.push('\n');
    script.push_str("BYE\n");
    let (result, lines) = run(&echo_server(), &script);
    result.unwrap();
    assert_eq!(lines[1], format!("ERR {} Unknown command", code::ASS_UNKNOWN_CMD));
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn test_option_stored_and_visible_to_handlers() {
    let mut server = Server::new(Config::builder().valid_option("display").build());
    server.register("SHOW", |session, _| {
        Ok(Some(session.option("display").unwrap_or("unset").to_string()))
    });
    let (result, lines) = run(
        &server,
        "OPTION display=:0\nSHOW\nRESET\nSHOW\nBYE\n",
    );
    result.unwrap();
    assert_eq!(lines[1], "OK");
    assert_eq!(lines[2], "OK :0");
    // RESET clears accumulated options
    assert_eq!(lines[4], "OK unset");
}

#[test]
fn test_unknown_option_strict_vs_lenient() {
    let strict = Server::new(Config::default());
    let (_, lines) = run(&strict, "OPTION nope=1\nBYE\n");
    assert_eq!(lines[1], format!("ERR {} Unknown option", code::UNKNOWN_OPTION));

    let lenient = Server::new(Config::builder().strict_options(false).build());
    let (_, lines) = run(&lenient, "OPTION nope=1\nBYE\n");
    assert_eq!(lines[1], "OK");
}

#[test]
fn test_option_bad_syntax() {
    let (_, lines) = run(&Server::new(Config::default()), "OPTION in|valid\nBYE\n");
    assert_eq!(lines[1], format!("ERR {} Invalid parameter", code::INV_PARAMETER));
}

// =============================================================================
// Inquiries
// =============================================================================

fn signing_server() -> Server {
    let mut server = Server::new(Config::default());
    server.register("SIGN", |session, _| {
        match session.inquire("KEYDATA", Some("need the key"))? {
            Some(payload) => {
                // prove the handler saw the decoded payload intact
                session.send_data(&payload)?;
                Ok(Some("signed".into()))
            }
            None => Err(AssuanError::handler(
                code::ASS_CANCELED,
                "IPC call has been cancelled",
            )),
        }
    });
    server
}

#[test]
fn test_inquiry_round_trip() {
    let (result, lines) = run(
        &signing_server(),
        "SIGN\nD part one%0A\nD part two\nEND\nBYE\n",
    );
    result.unwrap();
    assert_eq!(
        lines,
        vec![
            "OK Your orders please",
            "INQUIRE KEYDATA need the key",
            "D part one%0Apart two",
            "OK signed",
            "OK closing connection",
        ]
    );
}

#[test]
fn test_inquiry_empty_answer() {
    let (result, lines) = run(&signing_server(), "SIGN\nEND\nBYE\n");
    result.unwrap();
    // END with no D lines yields an empty payload, not a cancellation
    assert_eq!(lines[2], "D");
    assert_eq!(lines[3], "OK signed");
}

#[test]
fn test_inquiry_cancelled() {
    let (result, lines) = run(&signing_server(), "SIGN\nCAN\nBYE\n");
    result.unwrap();
    assert_eq!(
        lines[2],
        format!("ERR {} IPC call has been cancelled", code::ASS_CANCELED)
    );
    assert_eq!(lines[3], "OK closing connection");
}

#[test]
fn test_unexpected_command_during_inquiry_fails_command() {
    let (result, lines) = run(&signing_server(), "SIGN\nNOP\nBYE\n");
    result.unwrap();
    assert_eq!(lines[1], "INQUIRE KEYDATA need the key");
    assert!(lines[2].starts_with("ERR"), "{}", lines[2]);
}

#[test]
fn test_bye_during_inquiry_closes_session_cleanly() {
    // the client walked away politely, so serve reports a clean end
    let (result, lines) = run(&signing_server(), "SIGN\nBYE\n");
    result.unwrap();
    assert_eq!(
        lines,
        vec![
            "OK Your orders please",
            "INQUIRE KEYDATA need the key",
            "OK closing connection",
        ]
    );
}
