//! C2: the byte-at-a-time HTTP mini-parser and response builder.
//!
//! Mirrors the original `client_http.h` (`client_http_read_request`,
//! `client_http_respond_to_request`, `HTML_RES`) closely enough that the
//! quirks it documents (e.g. `Content-Length` two bytes short) are reproduced
//! rather than "fixed".

use crate::config::{HTTP_FIELD_MAX, MAX_MESSAGE_SIZE};
use crate::error::ConnectionError;
use crate::ws_accept::accept_key;

/// The page served at `GET /`: a canvas that relays points over `/chat`.
pub const HTML_PAGE: &str = "<!DOCTYPE html>\r\n\
<html lang='en'>\r\n\
  <head>\r\n\
    <meta charset='utf-8' />\r\n\
    <title>Sketchboard</title>\r\n\
    <style> html, body { margin: 0px; padding: 0px; overflow: hidden; } </style>\r\n\
  </head>\r\n\
\r\n\
  <body>\r\n\
    <canvas id='pagecanvas'></canvas>\r\n\
    <script>'use strict'; (async () => {\r\n\
const ws = new WebSocket(location.origin.replace('http', 'ws') + '/chat');\r\n\
await new Promise(res => ws.onopen = res);\r\n\
\r\n\
const canvas = document.getElementById('pagecanvas');\r\n\
const ctx = canvas.getContext('2d');\r\n\
(window.onresize = () => {\r\n\
  canvas.width = window.innerWidth * window.devicePixelRatio;\r\n\
  canvas.height = window.innerHeight * window.devicePixelRatio;\r\n\
  canvas.style.width = window.innerWidth + 'px';\r\n\
  canvas.style.height = window.innerHeight + 'px';\r\n\
})();\r\n\
\r\n\
let input = {\r\n\
  mouse_down: false,\r\n\
  local_path_id: -1,\r\n\
  server_paths: new Map(),\r\n\
};\r\n\
ws.onmessage = msg => {\r\n\
  const [action, client_id, path_id, x, y] = msg.data.split(', ').map(Number);\r\n\
  const key = client_id + '_' + path_id;\r\n\
  if (!input.server_paths.has(key)) input.server_paths.set(key, []);\r\n\
  if (action === 1) input.server_paths.get(key).push({ x, y });\r\n\
  else if (action === 2) input.server_paths.delete(key);\r\n\
};\r\n\
\r\n\
canvas.onmousedown = ev => {\r\n\
  ev.preventDefault();\r\n\
  input.mouse_down = true;\r\n\
  input.local_path_id += 1;\r\n\
};\r\n\
canvas.onmouseup = ev => {\r\n\
  ev.preventDefault();\r\n\
  input.mouse_down = false;\r\n\
};\r\n\
canvas.onmousemove = ev => {\r\n\
  ev.preventDefault();\r\n\
  if (!input.mouse_down) return;\r\n\
  const x = ev.clientX * window.devicePixelRatio;\r\n\
  const y = ev.clientY * window.devicePixelRatio;\r\n\
  ws.send(input.local_path_id + ', ' + x.toFixed(0) + ', ' + y.toFixed(0));\r\n\
};\r\n\
\r\n\
requestAnimationFrame(function render() {\r\n\
  requestAnimationFrame(render);\r\n\
  ctx.fillStyle = 'white';\r\n\
  ctx.fillRect(0, 0, canvas.width, canvas.height);\r\n\
  ctx.beginPath();\r\n\
  for (const path of input.server_paths.values()) {\r\n\
    for (let i = 0; i < path.length; i++) {\r\n\
      const p = path[i];\r\n\
      ctx[i ? 'lineTo' : 'moveTo'](p.x, p.y);\r\n\
    }\r\n\
  }\r\n\
  ctx.lineWidth = 4 * window.devicePixelRatio;\r\n\
  ctx.stroke();\r\n\
})\r\n\
    })();</script>\r\n\
  </body>\r\n\
</html>\r\n";

/// Accumulates bytes of an in-flight request, one at a time.
#[derive(Default)]
pub struct RequestBuffer {
    buf: Vec<u8>,
    seen_linefeed: bool,
}

/// What to do once the request line + headers have been fully read.
pub struct HttpResponse {
    pub bytes: Vec<u8>,
    /// Phase to move to once `bytes` is fully drained; `None` means drop.
    pub upgrade: bool,
}

impl RequestBuffer {
    /// Feed one byte of the request. Returns `Some(response)` once the
    /// terminating CRLF-CRLF has been seen and the request successfully parsed.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<HttpResponse>, ConnectionError> {
        self.buf.push(byte);
        if self.buf.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::OversizedMessage(MAX_MESSAGE_SIZE));
        }

        // Carriage returns are stored but don't affect line-feed tracking.
        if byte == 0x0D {
            return Ok(None);
        }

        if byte == 0x0A {
            if self.seen_linefeed {
                let response = respond(&self.buf)?;
                return Ok(Some(response));
            }
            self.seen_linefeed = true;
        } else {
            self.seen_linefeed = false;
        }
        Ok(None)
    }
}

/// Parse the finished request buffer and build the routed response.
fn respond(buf: &[u8]) -> Result<HttpResponse, ConnectionError> {
    let text = std::str::from_utf8(buf).map_err(|_| ConnectionError::MalformedRequest)?;

    let path = parse_request_line(text).ok_or(ConnectionError::MalformedRequest)?;
    let key = parse_websocket_key(text);

    tracing::debug!(path, "parsed HTTP request");

    Ok(match path {
        "/" => HttpResponse {
            bytes: root_response(),
            upgrade: false,
        },
        "/chat" => HttpResponse {
            bytes: upgrade_response(key.as_deref()),
            upgrade: true,
        },
        _ => HttpResponse {
            bytes: b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec(),
            upgrade: false,
        },
    })
}

/// `GET <path up to 30 chars> HTTP/1.1\r\n`; only the first line matters.
fn parse_request_line(text: &str) -> Option<&str> {
    let line = text.lines().next()?;
    let rest = line.strip_prefix("GET ")?;
    let path = rest.strip_suffix(" HTTP/1.1")?;
    if path.is_empty() || path.len() > HTTP_FIELD_MAX {
        return None;
    }
    Some(path)
}

/// Scan header lines for `Sec-WebSocket-Key: <value up to 30 chars>`.
/// Absence is not fatal; only checked when routing to `/chat`.
fn parse_websocket_key(text: &str) -> Option<String> {
    for line in text.lines().skip(1) {
        if let Some(value) = line.strip_prefix("Sec-WebSocket-Key: ") {
            if !value.is_empty() && value.len() <= HTTP_FIELD_MAX {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn root_response() -> Vec<u8> {
    // The reference implementation's Content-Length is `strlen(HTML) - 2`:
    // two bytes of trailing CRLF are not counted. Preserved verbatim.
    let content_length = HTML_PAGE.len() - 2;
    let mut out = Vec::with_capacity(HTML_PAGE.len() + 128);
    out.extend_from_slice(b"HTTP/1.0 200 OK\r\n");
    out.extend_from_slice(format!("Content-Length: {content_length}\r\n").as_bytes());
    out.extend_from_slice(b"Connection: close\r\n");
    out.extend_from_slice(b"Content-Type: text/html; charset=iso-8859-1\r\n");
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(HTML_PAGE.as_bytes());
    out
}

fn upgrade_response(key: Option<&str>) -> Vec<u8> {
    let accept = accept_key(key.unwrap_or(""));
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut RequestBuffer, bytes: &[u8]) -> Option<HttpResponse> {
        let mut result = None;
        for &b in bytes {
            if let Some(r) = buf.push_byte(b).expect("no parse error") {
                result = Some(r);
            }
        }
        result
    }

    #[test]
    fn root_fetch() {
        let mut buf = RequestBuffer::default();
        let resp = feed(&mut buf, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        let text = String::from_utf8(resp.bytes).unwrap();
        assert!(text.starts_with("HTTP/1.0 200 OK\r\nContent-Length: "));
        assert!(text.contains(&HTML_PAGE[..HTML_PAGE.len() - 2]));
        assert!(!resp.upgrade);
    }

    #[test]
    fn not_found() {
        let mut buf = RequestBuffer::default();
        let resp = feed(&mut buf, b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(resp.bytes, b"HTTP/1.1 404 Not Found\r\n\r\n");
        assert!(!resp.upgrade);
    }

    #[test]
    fn upgrade_computes_accept_key() {
        let mut buf = RequestBuffer::default();
        let resp = feed(
            &mut buf,
            b"GET /chat HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .unwrap();
        let text = String::from_utf8(resp.bytes).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
        assert!(resp.upgrade);
    }

    #[test]
    fn malformed_request_line_is_fatal() {
        let mut buf = RequestBuffer::default();
        let mut err = None;
        for &b in b"NOPE / HTTP/1.1\r\n\r\n" {
            match buf.push_byte(b) {
                Ok(_) => {}
                Err(e) => err = Some(e),
            }
        }
        assert!(matches!(err, Some(ConnectionError::MalformedRequest)));
    }

    #[test]
    fn oversized_request_is_fatal() {
        let mut buf = RequestBuffer::default();
        let mut hit_limit = false;
        for _ in 0..(MAX_MESSAGE_SIZE + 1) {
            if buf.push_byte(b'a').is_err() {
                hit_limit = true;
                break;
            }
        }
        assert!(hit_limit);
    }
}
