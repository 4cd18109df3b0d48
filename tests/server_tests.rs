//! Live-server tests speaking raw HTTP over a socket: protocol error
//! codes, static file serving, worker dispatch, script execution and
//! session cookie behavior.

use smartserve::{ServerConfig, ServerHandle, SmartServer};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;

mod common;
use common::http::{header, parse_response, send_request};

const COUNTER_SCRIPT: &str =
    r#"{$= "brojPoziva" "0" @pparamGet 1 + "brojPoziva" @pparamSet "visits=" "brojPoziva" "0" @pparamGet $}"#;

const SUM_SCRIPT: &str = r#"{$= "a+b=" "a" "0" @paramGet "b" "0" @paramGet + $}"#;

fn start_server(timeout_secs: u64) -> (ServerHandle, SocketAddr, TempDir) {
    // ensure coroutines have enough stack for tests
    may::config().set_stack_size(0x8000);

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
    fs::write(dir.path().join("hello.txt"), "Hello\n").unwrap();
    fs::write(dir.path().join("brojPoziva.smscr"), COUNTER_SCRIPT).unwrap();
    fs::write(dir.path().join("zbrajanje.smscr"), SUM_SCRIPT).unwrap();

    let config = ServerConfig {
        address: "127.0.0.1".to_string(),
        port: 0,
        worker_threads: 4,
        session_timeout: timeout_secs,
        document_root: dir.path().to_path_buf(),
        mime_types: HashMap::new(),
        workers: HashMap::from([("/hello".to_string(), "Hello".to_string())]),
    };
    let handle = SmartServer::new(config).unwrap().start().unwrap();
    handle.wait_ready().unwrap();
    let addr = handle.addr();
    (handle, addr, dir)
}

fn sid_from_set_cookie(headers: &str) -> Option<String> {
    let line = header(headers, "set-cookie")?;
    let value = line.strip_prefix("sid=")?;
    Some(value.split(';').next().unwrap_or("").to_string())
}

#[test]
fn test_root_serves_meta_refresh() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, headers, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert_eq!(
        header(&headers, "content-type"),
        Some("text/html; charset=UTF-8")
    );
    assert!(body.contains("url=index.html"));
}

#[test]
fn test_static_file_with_mime_and_length() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET /hello.txt HTTP/1.0\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, headers, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert_eq!(
        header(&headers, "content-type"),
        Some("text/plain; charset=UTF-8")
    );
    assert_eq!(header(&headers, "content-length"), Some("6"));
    assert_eq!(body, "Hello\n");
}

#[test]
fn test_missing_file_is_404() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET /nonexistent HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, body) = parse_response(&resp);
    assert_eq!(status, 404);
    assert!(body.contains("<html>"));
}

#[test]
fn test_traversal_is_403() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET /../etc/passwd HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 403);
}

#[test]
fn test_post_is_405() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "POST /anything HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 405);
}

#[test]
fn test_unsupported_version_is_505() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET / HTTP/2.0\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 505);
}

#[test]
fn test_malformed_request_line_is_400() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "BLAH\r\n\r\n");
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 400);

    let resp = send_request(&addr, "GET /a?x=1?y=2 HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 400);
}

#[test]
fn test_script_reads_query_parameters() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(
        &addr,
        "GET /zbrajanje.smscr?a=4&b=2 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    handle.stop();
    let (status, headers, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert_eq!(
        header(&headers, "content-type"),
        Some("text/html; charset=UTF-8")
    );
    assert_eq!(body, "a+b=6");
}

#[test]
fn test_configured_worker_path() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(
        &addr,
        "GET /hello?name=Pero HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    handle.stop();
    let (status, _, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert!(body.contains("Your name has 4 letters."));
}

#[test]
fn test_ext_worker_resolution() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(
        &addr,
        "GET /ext/EchoParams?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (status, _, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert!(body.contains("<tr><td>x</td><td>1</td></tr>"));

    let resp = send_request(&addr, "GET /ext/Unknown HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();
    let (status, _, _) = parse_response(&resp);
    assert_eq!(status, 404);
}

#[test]
fn test_session_cookie_minted_once() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(&addr, "GET /hello.txt HTTP/1.1\r\nHost: example.org\r\n\r\n");
    let (_, headers, _) = parse_response(&resp);
    let cookie_line = header(&headers, "set-cookie").expect("first visit mints a cookie");
    assert!(cookie_line.starts_with("sid="));
    assert!(cookie_line.contains("Domain=example.org"));
    assert!(cookie_line.contains("Path=/"));
    assert!(cookie_line.contains("Max-Age=600"));
    assert!(cookie_line.contains("HttpOnly"));
    let sid = sid_from_set_cookie(&headers).unwrap();
    assert_eq!(sid.len(), 20);
    assert!(sid.chars().all(|c| c.is_ascii_uppercase()));

    let resp = send_request(
        &addr,
        &format!("GET /hello.txt HTTP/1.1\r\nHost: example.org\r\nCookie: sid={sid}\r\n\r\n"),
    );
    handle.stop();
    let (_, headers, _) = parse_response(&resp);
    assert!(header(&headers, "set-cookie").is_none());
}

#[test]
fn test_session_continuity_across_requests() {
    let (handle, addr, _dir) = start_server(600);
    let resp = send_request(
        &addr,
        "GET /brojPoziva.smscr HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (_, headers, body) = parse_response(&resp);
    assert_eq!(body, "visits=1");
    let sid = sid_from_set_cookie(&headers).unwrap();

    let resp = send_request(
        &addr,
        &format!(
            "GET /brojPoziva.smscr HTTP/1.1\r\nHost: localhost\r\nCookie: sid=\"{sid}\"\r\n\r\n"
        ),
    );
    let (_, _, body) = parse_response(&resp);
    assert_eq!(body, "visits=2");

    // a different client gets its own counter
    let resp = send_request(
        &addr,
        "GET /brojPoziva.smscr HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    handle.stop();
    let (_, _, body) = parse_response(&resp);
    assert_eq!(body, "visits=1");
}

#[test]
fn test_session_expiry_mints_new_sid() {
    let (handle, addr, _dir) = start_server(1);
    let resp = send_request(
        &addr,
        "GET /brojPoziva.smscr HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (_, headers, body) = parse_response(&resp);
    assert_eq!(body, "visits=1");
    let sid = sid_from_set_cookie(&headers).unwrap();

    std::thread::sleep(Duration::from_millis(1300));

    let resp = send_request(
        &addr,
        &format!("GET /brojPoziva.smscr HTTP/1.1\r\nHost: localhost\r\nCookie: sid={sid}\r\n\r\n"),
    );
    handle.stop();
    let (_, headers, body) = parse_response(&resp);
    let fresh = sid_from_set_cookie(&headers).expect("expired session mints a new cookie");
    assert_ne!(fresh, sid);
    assert_eq!(body, "visits=1");
}
