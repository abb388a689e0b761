// crates/chat-client/tests/cli.rs
use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;

fn client() -> Command {
    Command::cargo_bin("chat-client").unwrap()
}

#[test]
fn invalid_port() {
    client()
        .args(["127.0.0.1", "port"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid port"));
}

#[test]
fn unknown_host() {
    client()
        .args(["no-such-host.invalid", "2000"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unknown host"));
}

#[test]
fn connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    client()
        .args(["127.0.0.1", &port.to_string()])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("refused"));
}
