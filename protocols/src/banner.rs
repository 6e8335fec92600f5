use gatescan_common::record::ProbePayload;

pub const MAX_BANNER_LEN: usize = 256;

/// Decodes a greeting as latin-1 so no byte is ever rejected, trimmed and capped.
/// An empty greeting is not a reply.
pub fn parse_banner(raw: &[u8]) -> Option<ProbePayload> {
    let text: String = raw
        .iter()
        .take(MAX_BANNER_LEN)
        .map(|&b| char::from(b))
        .collect();
    let text = text.trim_end_matches(['\r', '\n', '\0']).to_string();
    if text.trim().is_empty() {
        return None;
    }
    Some(ProbePayload::Banner { text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_and_trims() {
        assert_eq!(
            parse_banner(b"220 ProFTPD Server ready.\r\n"),
            Some(ProbePayload::Banner {
                text: "220 ProFTPD Server ready.".to_string()
            })
        );
    }

    #[test]
    fn keeps_binary_greetings() {
        // mysql handshakes start with a length prefix and protocol version 10
        let raw = [0x4a, 0x00, 0x00, 0x00, 0x0a, b'8', b'.', b'0'];
        let Some(ProbePayload::Banner { text }) = parse_banner(&raw) else {
            panic!("expected a banner");
        };
        assert!(text.ends_with("8.0"));
    }

    #[test]
    fn empty_is_no_reply() {
        assert_eq!(parse_banner(b""), None);
        assert_eq!(parse_banner(b"\r\n"), None);
    }

    #[test]
    fn caps_length() {
        let raw = vec![b'a'; 1024];
        let Some(ProbePayload::Banner { text }) = parse_banner(&raw) else {
            panic!("expected a banner");
        };
        assert_eq!(text.len(), MAX_BANNER_LEN);
    }
}
