//! `multipart/x-mixed-replace` framing
//!
//! Each encoded frame is wrapped as one part:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Maximum boundary length allowed by RFC 2046
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Response content type announcing the part boundary
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={}", boundary)
}

/// Frame one part around `payload`
pub fn encode_part(boundary: &str, content_type: &str, payload: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        boundary,
        content_type,
        payload.len()
    );

    let mut buf = BytesMut::with_capacity(header.len() + payload.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(payload);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Check a boundary token against the RFC 2046 character set
///
/// Spaces are allowed except as the last character.
pub fn is_valid_boundary(boundary: &str) -> bool {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN || boundary.ends_with(' ') {
        return false;
    }
    boundary
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b))
}
