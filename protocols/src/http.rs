use std::net::Ipv4Addr;

use gatescan_common::record::ProbePayload;

const USER_AGENT: &str = "gatescan";

/// A minimal HTTP/1.0 request; the server closes the connection after replying.
pub fn create_get_request(host: Ipv4Addr, path: &str) -> Vec<u8> {
    format!("GET {path} HTTP/1.0\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\n\r\n")
        .into_bytes()
}

/// Extracts status code, `Server` header and body length from a raw response.
/// Anything without a parsable status line is not an HTTP reply.
pub fn parse_response(raw: &[u8]) -> Option<ProbePayload> {
    let text = String::from_utf8_lossy(raw);
    let (head, body_len) = match text.find("\r\n\r\n") {
        Some(idx) => (&text[..idx], raw.len().saturating_sub(idx + 4)),
        None => (&text[..], 0),
    };

    let mut lines = head.lines();
    let status_line = lines.next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let status: u16 = parts.next()?.parse().ok()?;

    let server = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("server")
            .then(|| value.trim().to_string())
    });

    Some(ProbePayload::Http {
        status,
        server,
        length: body_len,
    })
}
