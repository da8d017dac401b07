use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: ybrix <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_chat_help() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: ybrix chat"))
        .stdout(predicate::str::contains("--chat-url <CHAT_URL>"))
        .stdout(predicate::str::contains("--image-url <IMAGE_URL>"))
        .stdout(predicate::str::contains("--view-port <VIEW_PORT>"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: ybrix <COMMAND>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_prints_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"message": "Hello", "history": []})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "response": "Hi there"})))
        .expect(1)
        .mount(&server)
        .await;

    let chat_url = format!("{}/api/chat", server.uri());
    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("ybrix")
            .unwrap()
            .args(["ask", "Hello", "--chat-url", &chat_url])
            .assert()
            .success()
            .stdout(predicate::str::contains("Hi there"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "response": "quota exceeded"})))
        .mount(&server)
        .await;

    let chat_url = format!("{}/api/chat", server.uri());
    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("ybrix")
            .unwrap()
            .args(["ask", "Hello", "--chat-url", &chat_url])
            .assert()
            .failure()
            .stderr(predicate::str::contains("quota exceeded"));
    })
    .await
    .unwrap();
}

#[test]
fn test_ask_blank_message_fails() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.args(["ask", "   ", "--chat-url", "http://127.0.0.1:9/api/chat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to send"));
}

#[test]
fn test_chat_session_reads_commands_until_eof() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.args(["chat", "--chat-url", "http://127.0.0.1:9/api/chat"])
        .write_stdin("/help\n/settings\n/close\n/bogus\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("/upload <path>"))
        .stdout(predicate::str::contains("chat endpoint:  http://127.0.0.1:9/api/chat"))
        .stdout(predicate::str::contains("Unknown command /bogus"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_waits_for_reply_in_flight_at_eof() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"message": "Hello"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "response": "Late but here"}))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let chat_url = format!("{}/api/chat", server.uri());
    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("ybrix")
            .unwrap()
            .args(["chat", "--chat-url", &chat_url])
            .write_stdin("Hello\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("You ["))
            .stdout(predicate::str::contains("YBrix is typing..."))
            .stdout(predicate::str::is_match(r"YBrix \[[^\]]+\]: Late but here").unwrap());
    })
    .await
    .unwrap();
}

#[test]
fn test_chat_blank_image_prompt_keeps_dialog_open() {
    let mut cmd = Command::cargo_bin("ybrix").unwrap();
    cmd.args(["chat", "--chat-url", "http://127.0.0.1:9/api/chat"])
        .write_stdin("/image\n   \n/close\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Describe the image to generate"))
        .stdout(predicate::str::contains("[error] Please enter a description"))
        .stdout(predicate::str::contains("Generate image").not());
}
