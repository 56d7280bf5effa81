//! Minimal HTTP/1.x message reassembly
//!
//! Parses the request/response head with `httparse` and frames the body from
//! what follows. Only the first message in each buffer is considered.
//!
//! ## Body Framing
//!
//! - `Transfer-Encoding: chunked` → de-chunked
//! - `Content-Length: N` → at most N bytes (fewer if the capture ended early)
//! - neither → requests have no body, responses run to the end of the buffer

use std::borrow::Cow;

use crate::domain::InferenceError;

/// Upper bound on headers per message
const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    pub method: String,
    /// Request-target exactly as sent, query string included
    pub target: String,
    pub body: Cow<'a, [u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse<'a> {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Cow<'a, [u8]>,
}

impl HttpResponse<'_> {
    /// True when the content type names a JSON payload
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Chunked,
    Length(usize),
    UntilEnd,
    Empty,
}

/// Parse the first HTTP request in `buf`.
///
/// # Errors
/// Returns an error if the head is incomplete or invalid, or a chunked body is malformed
pub fn parse_request(buf: &[u8]) -> Result<HttpRequest<'_>, InferenceError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Err(InferenceError::IncompleteRequest),
        Err(e) => return Err(InferenceError::MalformedRequest(e)),
    };

    let method = req.method.unwrap_or_default().to_string();
    let target = req.path.unwrap_or_default().to_string();
    let framing = framing(req.headers, Framing::Empty);
    let body = frame_body(&buf[head_len..], framing)?;

    Ok(HttpRequest {
        method,
        target,
        body,
    })
}

/// Parse the first HTTP response in `buf`.
///
/// # Errors
/// Returns an error if the head is incomplete or invalid, or a chunked body is malformed
pub fn parse_response(buf: &[u8]) -> Result<HttpResponse<'_>, InferenceError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    let head_len = match res.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Err(InferenceError::IncompleteResponse),
        Err(e) => return Err(InferenceError::MalformedResponse(e)),
    };

    let status = res.code.unwrap_or_default();
    let content_type = header_value(res.headers, "content-type");
    let framing = framing(res.headers, Framing::UntilEnd);
    let body = frame_body(&buf[head_len..], framing)?;

    Ok(HttpResponse {
        status,
        content_type,
        body,
    })
}

fn header_value(headers: &[httparse::Header<'_>], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
}

fn framing(headers: &[httparse::Header<'_>], fallback: Framing) -> Framing {
    let chunked = header_value(headers, "transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Framing::Chunked;
    }

    header_value(headers, "content-length")
        .and_then(|len| len.parse::<usize>().ok())
        .map_or(fallback, Framing::Length)
}

fn frame_body(rest: &[u8], framing: Framing) -> Result<Cow<'_, [u8]>, InferenceError> {
    match framing {
        Framing::Empty => Ok(Cow::Borrowed(&[])),
        Framing::UntilEnd => Ok(Cow::Borrowed(rest)),
        Framing::Length(len) => Ok(Cow::Borrowed(&rest[..len.min(rest.len())])),
        Framing::Chunked => decode_chunked(rest).map(Cow::Owned),
    }
}

/// Decode a chunked body. A capture that ends before the terminating chunk
/// yields whatever was complete.
fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, InferenceError> {
    let mut body = Vec::new();

    loop {
        let Some(line_end) = find_crlf(rest) else {
            return Ok(body);
        };
        let size_line = std::str::from_utf8(&rest[..line_end])
            .map_err(|_| InferenceError::MalformedChunk("size line is not text"))?;
        // Chunk extensions follow a ';'
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| InferenceError::MalformedChunk("invalid chunk size"))?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if rest.len() < size {
            body.extend_from_slice(rest);
            return Ok(body);
        }

        body.extend_from_slice(&rest[..size]);
        rest = &rest[size..];
        match rest {
            [b'\r', b'\n', tail @ ..] => rest = tail,
            [] => return Ok(body),
            _ => return Err(InferenceError::MalformedChunk("no CRLF after chunk")),
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
