//! Session-level tests: server and client state machines, plus
//! end-to-end runs over a Unix socket

mod end_to_end_tests;
mod server_tests;
