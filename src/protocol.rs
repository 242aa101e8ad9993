//! Page protocol codec.
//!
//! Line-oriented text frames shared by both ends of a session:
//!
//! ```text
//! Request:  <offset>,<step>\n
//! Response: w1,w2,...,wn\n          (more pages follow)
//! Response: w1,w2,...,wn,EOF\n      (last page)
//! Response: EOF\n                   (offset past the end)
//! ```
//!
//! Words never contain commas or newlines; the word file loader guarantees
//! this by splitting on commas.

use bytes::BytesMut;
use thiserror::Error;

/// End-of-stream marker token.
pub const SENTINEL: &str = "EOF";

/// Field separator inside a frame.
const SEPARATOR: u8 = b',';

/// A request for `count` words starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub count: usize,
}

impl PageRequest {
    pub fn new(offset: usize, count: usize) -> Self {
        Self { offset, count }
    }
}

/// One page of words plus the end-of-stream flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub words: Vec<String>,
    pub end_of_stream: bool,
}

/// Protocol errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Request line is missing a field or a field is not a number.
    #[error("malformed request: {0:?}")]
    MalformedRequest(String),
}

/// Response frame ended without a newline. Carries whatever could be
/// decoded from the partial frame, sentinel detection included.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("response frame not newline-terminated ({} words decoded)", .partial.words.len())]
pub struct ProtocolViolation {
    pub partial: PageResponse,
}

/// Encode a request line.
pub fn encode_request(request: PageRequest) -> String {
    format!("{},{}\n", request.offset, request.count)
}

/// Strictly decode a request line.
pub fn decode_request(line: &str) -> Result<PageRequest, ProtocolError> {
    let malformed = || ProtocolError::MalformedRequest(line.trim_end().to_string());

    let (offset, count) = line.trim().split_once(',').ok_or_else(malformed)?;
    let offset = offset.trim().parse().map_err(|_| malformed())?;
    let count = count.trim().parse().map_err(|_| malformed())?;

    Ok(PageRequest { offset, count })
}

/// Decode a request line, coercing every missing or non-numeric field to 0.
pub fn decode_request_lenient(line: &str) -> PageRequest {
    if let Ok(request) = decode_request(line) {
        return request;
    }

    let mut fields = line.trim().splitn(2, ',');
    let mut next_field = || {
        fields
            .next()
            .and_then(|field| field.trim().parse().ok())
            .unwrap_or(0)
    };
    let offset = next_field();
    let count = next_field();

    PageRequest { offset, count }
}

/// Encode a response frame into `output`.
pub fn encode_response(response: &PageResponse, output: &mut BytesMut) {
    for (i, word) in response.words.iter().enumerate() {
        if i > 0 {
            output.extend_from_slice(&[SEPARATOR]);
        }
        output.extend_from_slice(word.as_bytes());
    }

    if response.end_of_stream {
        if !response.words.is_empty() {
            output.extend_from_slice(&[SEPARATOR]);
        }
        output.extend_from_slice(SENTINEL.as_bytes());
    }

    output.extend_from_slice(b"\n");
}

/// Decode a response frame.
///
/// The first `EOF` token ends the stream; anything after it is ignored.
pub fn decode_response(frame: &str) -> Result<PageResponse, ProtocolViolation> {
    let (body, terminated) = match frame.strip_suffix('\n') {
        Some(body) => (body.strip_suffix('\r').unwrap_or(body), true),
        None => (frame, false),
    };

    let mut page = PageResponse::default();
    if !body.is_empty() {
        for token in body.split(',') {
            if token == SENTINEL {
                page.end_of_stream = true;
                break;
            }
            page.words.push(token.to_string());
        }
    }

    if terminated {
        Ok(page)
    } else {
        Err(ProtocolViolation { partial: page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(words: &[&str], end_of_stream: bool) -> PageResponse {
        PageResponse {
            words: words.iter().map(|w| w.to_string()).collect(),
            end_of_stream,
        }
    }

    fn encoded(response: &PageResponse) -> BytesMut {
        let mut out = BytesMut::new();
        encode_response(response, &mut out);
        out
    }

    #[test]
    fn test_encode_request() {
        assert_eq!(encode_request(PageRequest::new(4, 2)), "4,2\n");
        assert_eq!(encode_request(PageRequest::new(0, 10)), "0,10\n");
    }

    #[test]
    fn test_decode_request() {
        assert_eq!(decode_request("4,2\n"), Ok(PageRequest::new(4, 2)));
        assert_eq!(decode_request(" 7 , 3 \r\n"), Ok(PageRequest::new(7, 3)));
    }

    #[test]
    fn test_decode_request_malformed() {
        assert!(matches!(
            decode_request("abc,2\n"),
            Err(ProtocolError::MalformedRequest(_))
        ));
        assert!(matches!(
            decode_request("12\n"),
            Err(ProtocolError::MalformedRequest(_))
        ));
        assert!(matches!(
            decode_request("-1,2\n"),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_decode_request_lenient_defaults_to_zero() {
        assert_eq!(decode_request_lenient("abc,2\n"), PageRequest::new(0, 2));
        assert_eq!(decode_request_lenient("5,xyz\n"), PageRequest::new(5, 0));
        assert_eq!(decode_request_lenient("12\n"), PageRequest::new(12, 0));
        assert_eq!(decode_request_lenient("\n"), PageRequest::new(0, 0));
        assert_eq!(decode_request_lenient("3,4\n"), PageRequest::new(3, 4));
    }

    #[test]
    fn test_encode_response_frames() {
        assert_eq!(&encoded(&page(&["a", "b"], false))[..], b"a,b\n");
        assert_eq!(&encoded(&page(&["b", "a"], true))[..], b"b,a,EOF\n");
        assert_eq!(&encoded(&page(&[], true))[..], b"EOF\n");
        assert_eq!(&encoded(&page(&[], false))[..], b"\n");
    }

    #[test]
    fn test_decode_response() {
        assert_eq!(decode_response("a,c\n"), Ok(page(&["a", "c"], false)));
        assert_eq!(
            decode_response("x,y,z,EOF\n"),
            Ok(page(&["x", "y", "z"], true))
        );
        assert_eq!(decode_response("EOF\n"), Ok(page(&[], true)));
        assert_eq!(decode_response("\n"), Ok(page(&[], false)));
    }

    #[test]
    fn test_decode_response_stops_at_first_sentinel() {
        assert_eq!(decode_response("a,EOF,b\n"), Ok(page(&["a"], true)));
    }

    #[test]
    fn test_decode_response_unterminated_keeps_partial() {
        match decode_response("a,b,EOF") {
            Err(ProtocolViolation { partial }) => {
                assert_eq!(partial, page(&["a", "b"], true));
            }
            other => panic!("unexpected: {:?}", other),
        }

        match decode_response("a,b") {
            Err(ProtocolViolation { partial }) => {
                assert_eq!(partial, page(&["a", "b"], false));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
