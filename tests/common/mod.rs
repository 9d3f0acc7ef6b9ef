//! Common test utilities and fixtures

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;

/// A syntactically valid Vite address for tests
pub fn valid_address() -> String {
    format!("vite_{}", "ab".repeat(25))
}

/// Read one HTTP request off a stream (headers + content-length body) and
/// answer it with a canned JSON body. Enough HTTP for a reqwest client.
pub fn answer_http_request(stream: &mut TcpStream, json_body: &str) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // Headers first
    let header_end = loop {
        let n = stream.read(&mut chunk).expect("read request");
        assert!(n > 0, "client hung up mid-request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    // Then the body, per Content-Length
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).expect("read body");
        assert!(n > 0, "client hung up mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        json_body.len(),
        json_body
    );
    stream.write_all(response.as_bytes()).expect("write response");

    String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
