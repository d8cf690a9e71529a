//! C1: byte codecs: base64 and the `Sec-WebSocket-Accept` derivation.
//!
//! Mirrors the handshake computation in `client_ws.h::client_ws_fwrite_sec_accept`,
//! but goes
//! straight from the SHA-1 digest bytes to base64 instead of round-tripping
//! through a hex string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::Engine as _;

use crate::config::WEBSOCKET_GUID;

/// Base64-encode arbitrary bytes with the standard alphabet and `=` padding.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Derive the `Sec-WebSocket-Accept` value for a client-supplied `Sec-WebSocket-Key`.
pub fn accept_key(sec_websocket_key: &str) -> String {
    let mut concatenated = String::with_capacity(sec_websocket_key.len() + WEBSOCKET_GUID.len());
    concatenated.push_str(sec_websocket_key);
    concatenated.push_str(WEBSOCKET_GUID);

    let digest = sha1_smol::Sha1::from(concatenated.as_bytes()).digest();
    base64_encode(&digest.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_example() {
        // The canonical example from RFC 6455 §1.3.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn base64_round_trips_all_lengths() {
        for len in 0..64usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let encoded = base64_encode(&data);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&encoded)
                .expect("valid base64");
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn encodes_without_line_wrapping() {
        let data = vec![0u8; 300];
        let encoded = base64_encode(&data);
        assert!(!encoded.contains('\n'));
    }
}
