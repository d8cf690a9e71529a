//! C3: the WebSocket frame codec, restricted to the small-payload case.
//!
//! Decode is driven one byte at a time by [`crate::connection`], mirroring
//! the original `client_ws_step` / `ws_req` fields in `client.h`. Encode
//! produces a single unmasked text frame, as `client_ws_send_text` does.

use crate::config::MAX_WS_PAYLOAD;
use crate::error::ConnectionError;

const OPCODE_TEXT: u8 = 0x1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum DecodeStage {
    Header1,
    Header2,
    Mask(u8),
    Payload,
}

/// Assembles one incoming frame, byte by byte.
pub struct FrameDecoder {
    stage: DecodeStage,
    fin: bool,
    opcode: u8,
    has_mask: bool,
    payload_len: u8,
    mask: [u8; 4],
    payload: Vec<u8>,
    progress: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            stage: DecodeStage::Header1,
            fin: false,
            opcode: 0,
            has_mask: false,
            payload_len: 0,
            mask: [0; 4],
            payload: Vec::new(),
            progress: 0,
        }
    }
}

/// Outcome of feeding one byte into the decoder.
pub enum FeedResult {
    /// Need more bytes.
    Pending,
    /// A full frame was assembled; `opcode` tells the caller whether to treat
    /// `payload` as an application message (only `0x1`/text is).
    Complete { opcode: u8, payload: Vec<u8> },
}

impl FrameDecoder {
    pub fn feed(&mut self, byte: u8) -> Result<FeedResult, ConnectionError> {
        match self.stage {
            DecodeStage::Header1 => {
                self.fin = byte & 0b1000_0000 != 0;
                self.opcode = byte & 0b0000_1111;
                self.stage = DecodeStage::Header2;
                Ok(FeedResult::Pending)
            }
            DecodeStage::Header2 => {
                self.has_mask = byte & 0b1000_0000 != 0;
                let len = byte & 0b0111_1111;
                if len == 126 || len == 127 {
                    return Err(ConnectionError::UnsupportedPayloadLength);
                }
                self.payload_len = len;
                self.payload = vec![0u8; len as usize];
                self.stage = if self.has_mask {
                    DecodeStage::Mask(0)
                } else {
                    DecodeStage::Payload
                };
                self.finish_if_empty()
            }
            DecodeStage::Mask(i) => {
                self.mask[i as usize] = byte;
                if i == 3 {
                    self.stage = DecodeStage::Payload;
                    self.finish_if_empty()
                } else {
                    self.stage = DecodeStage::Mask(i + 1);
                    Ok(FeedResult::Pending)
                }
            }
            DecodeStage::Payload => {
                let i = self.progress;
                self.payload[i] = byte ^ self.mask[i % 4];
                self.progress += 1;
                if self.progress == self.payload_len as usize {
                    Ok(self.complete())
                } else {
                    Ok(FeedResult::Pending)
                }
            }
        }
    }

    fn finish_if_empty(&mut self) -> Result<FeedResult, ConnectionError> {
        if self.payload_len == 0 && matches!(self.stage, DecodeStage::Payload) {
            Ok(self.complete())
        } else {
            Ok(FeedResult::Pending)
        }
    }

    fn complete(&mut self) -> FeedResult {
        let opcode = self.opcode;
        let payload = std::mem::take(&mut self.payload);
        *self = FrameDecoder::default();
        FeedResult::Complete { opcode, payload }
    }

}

/// Encode a single-fragment, unmasked text frame. `text` must be `<= 125` bytes.
pub fn encode_text_frame(text: &[u8]) -> Vec<u8> {
    debug_assert!(text.len() <= MAX_WS_PAYLOAD);
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(0x80 | OPCODE_TEXT);
    out.push(text.len() as u8);
    out.extend_from_slice(text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_payload(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        payload
            .iter()
            .enumerate()
            .map(|(i, &b)| b ^ mask[i % 4])
            .collect()
    }

    fn masked_text_frame(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let mut frame = vec![0x80 | OPCODE_TEXT, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&mask);
        frame.extend_from_slice(&mask_payload(payload, mask));
        frame
    }

    #[test]
    fn decodes_masked_text_frame() {
        let payload = b"7, 100, 200";
        let mask = [0x11, 0x22, 0x33, 0x44];
        let frame = masked_text_frame(payload, mask);

        let mut decoder = FrameDecoder::default();
        let mut result = None;
        for &b in &frame {
            if let FeedResult::Complete { opcode, payload } = decoder.feed(b).unwrap() {
                result = Some((opcode, payload));
            }
        }
        let (opcode, decoded) = result.expect("frame completed");
        assert_eq!(opcode, OPCODE_TEXT);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_extended_length_126() {
        let mut decoder = FrameDecoder::default();
        decoder.feed(0x81).unwrap();
        let err = decoder.feed(0x80 | 126).unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedPayloadLength));
    }

    #[test]
    fn rejects_extended_length_127() {
        let mut decoder = FrameDecoder::default();
        decoder.feed(0x81).unwrap();
        let err = decoder.feed(0x80 | 127).unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedPayloadLength));
    }

    #[test]
    fn empty_payload_completes_immediately() {
        let mask = [1, 2, 3, 4];
        let mut frame = vec![0x80 | OPCODE_TEXT, 0x80];
        frame.extend_from_slice(&mask);
        let mut decoder = FrameDecoder::default();
        let mut result = None;
        for &b in &frame {
            if let FeedResult::Complete { opcode, payload } = decoder.feed(b).unwrap() {
                result = Some((opcode, payload));
            }
        }
        let (opcode, payload) = result.unwrap();
        assert_eq!(opcode, OPCODE_TEXT);
        assert!(payload.is_empty());
    }

    #[test]
    fn encode_produces_unmasked_header() {
        let frame = encode_text_frame(b"hi");
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 2);
        assert_eq!(&frame[2..], b"hi");
    }
}
