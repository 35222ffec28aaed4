//! Minimal HTTP/1.1 framing
//!
//! Only what the stream endpoint needs: parsing a request line and writing
//! fixed responses. Request headers are read but ignored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request target without the query string
    pub path: String,
    pub version: String,
}

/// Offset just past the blank line ending the request head
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parse the request line of a complete request head
pub fn parse_request_head(head: &[u8]) -> Result<RequestHead> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::BadRequest("request head is not UTF-8".into()))?;
    let line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| Error::BadRequest("empty request".into()))?;

    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::BadRequest(format!("malformed request line: {:?}", line)));
    };

    if method.is_empty() || !target.starts_with('/') || !version.starts_with("HTTP/1.") {
        return Err(Error::BadRequest(format!("malformed request line: {:?}", line)));
    }

    let path = target.split('?').next().unwrap_or(target);

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
    })
}

/// Response head opening a multipart stream
pub fn stream_preamble(content_type: &str) -> Bytes {
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         Pragma: no-cache\r\n\
         \r\n",
        content_type
    );
    Bytes::from(head)
}

/// Complete response with a fixed-length body
pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Bytes {
    let mut head = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}
