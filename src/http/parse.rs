//! HTTP/1.1 wire encoding/decoding: request serialization, incremental
//! status-line/header parsing via `httparse`, and a chunked-transfer
//! decoder.

use super::request::{encode_multipart, Body, Method, Request};

/// Serializes `req` into an HTTP/1.1 request. `cookie_header` is the
/// pre-computed `Cookie:` value from the jar, if any.
pub(crate) fn encode_request(req: &Request, cookie_header: Option<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    let path = match req.url.query() {
        Some(q) => format!("{}?{q}", req.url.path()),
        None => req.url.path().to_string(),
    };
    out.extend_from_slice(format!("{} {path} HTTP/1.1\r\n", req.method.as_str()).as_bytes());

    let host_header = match req.url.port() {
        Some(p) => format!("{}:{p}", req.url.host_str().unwrap_or("")),
        None => req.url.host_str().unwrap_or("").to_string(),
    };
    out.extend_from_slice(format!("Host: {host_header}\r\n").as_bytes());

    let mut has_content_type = req.header_value("content-type").is_some();
    let has_connection = req.header_value("connection").is_some();

    for (name, value) in &req.headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if !has_connection {
        out.extend_from_slice(b"Connection: close\r\n");
    }

    let body_bytes: Option<Vec<u8>> = match &req.body {
        Some(Body::Bytes(b)) => Some(b.clone()),
        Some(Body::Multipart(fields)) => {
            let (bytes, content_type) = encode_multipart(fields);
            if !has_content_type {
                out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                has_content_type = true;
            }
            Some(bytes)
        }
        None => None,
    };

    if let Some(body) = &body_bytes {
        if !has_content_type && matches!(req.method, Method::Post | Method::Put) {
            out.extend_from_slice(b"Content-Type: application/x-www-form-urlencoded\r\n");
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }

    if let Some(cookie) = cookie_header {
        if !cookie.is_empty() {
            out.extend_from_slice(format!("Cookie: {cookie}\r\n").as_bytes());
        }
    }

    out.extend_from_slice(b"\r\n");
    if let Some(body) = body_bytes {
        out.extend_from_slice(&body);
    }
    out
}

/// Attempts to parse a complete status line + header block from the front
/// of `buf`. `Ok(None)` means more data is needed; `Ok(Some((status,
/// headers, consumed)))` gives the header line count (and bytes) already
/// consumed.
pub(crate) fn try_parse_headers(
    buf: &[u8],
) -> std::result::Result<Option<(u16, Vec<(String, String)>, usize)>, String> {
    let mut storage = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut storage);
    match response.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => {
            let status = response.code.unwrap_or(0);
            let headers = response
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                .collect();
            Ok(Some((status, headers, consumed)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

/// How a response body's length is framed, determined from its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    ContentLength(usize),
    Chunked,
    UntilClose,
    /// HEAD responses and 204/304 never carry a body regardless of headers.
    None,
}

pub(crate) fn framing_for(status: u16, method: Method, headers: &[(String, String)]) -> BodyFraming {
    if method == Method::Head || status == 204 || status == 304 || (100..200).contains(&status) {
        return BodyFraming::None;
    }
    let chunked = headers.iter().any(|(n, v)| {
        n.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked")
    });
    if chunked {
        return BodyFraming::Chunked;
    }
    if let Some((_, v)) = headers.iter().find(|(n, _)| n.eq_ignore_ascii_case("content-length")) {
        if let Ok(len) = v.trim().parse::<usize>() {
            return BodyFraming::ContentLength(len);
        }
    }
    BodyFraming::UntilClose
}

/// Incremental chunked-transfer-encoding decoder. Chunk extensions are
/// accepted and ignored; trailers after the final `0` chunk are not parsed
/// (the decoder reports done as soon as it sees the zero-length chunk
/// header).
pub(crate) struct ChunkedDecoder {
    remaining_in_chunk: usize,
    awaiting_size: bool,
    finished: bool,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        ChunkedDecoder { remaining_in_chunk: 0, awaiting_size: true, finished: false }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes as much of `buf` as possible, appending plaintext body bytes
    /// to `out`. Returns how many bytes of `buf` were consumed.
    pub(crate) fn feed(&mut self, buf: &[u8], out: &mut Vec<u8>) -> usize {
        let mut pos = 0;
        while !self.finished {
            if self.awaiting_size {
                match find_crlf(&buf[pos..]) {
                    Some(i) => {
                        let line = String::from_utf8_lossy(&buf[pos..pos + i]);
                        let size_str = line.split(';').next().unwrap_or("0").trim();
                        let size = usize::from_str_radix(size_str, 16).unwrap_or(0);
                        pos += i + 2;
                        if size == 0 {
                            self.finished = true;
                        } else {
                            self.remaining_in_chunk = size;
                            self.awaiting_size = false;
                        }
                    }
                    None => break,
                }
            } else {
                let available = buf.len() - pos;
                if available == 0 {
                    break;
                }
                let take = available.min(self.remaining_in_chunk);
                out.extend_from_slice(&buf[pos..pos + take]);
                pos += take;
                self.remaining_in_chunk -= take;
                if self.remaining_in_chunk == 0 {
                    if buf.len() - pos >= 2 {
                        pos += 2;
                        self.awaiting_size = true;
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        pos
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn encode_get_includes_host_and_close() {
        let req = Request::get(Url::parse("http://h/p?q=1").unwrap());
        let bytes = encode_request(&req, None);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET /p?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: h\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn encode_post_sets_default_content_type_and_length() {
        let req = Request::post(Url::parse("http://h/p").unwrap(), b"a=1".to_vec());
        let text = String::from_utf8(encode_request(&req, None)).unwrap();
        assert!(text.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("a=1"));
    }

    #[test]
    fn encode_includes_cookie_header() {
        let req = Request::get(Url::parse("http://h/p").unwrap());
        let text = String::from_utf8(encode_request(&req, Some("k=v"))).unwrap();
        assert!(text.contains("Cookie: k=v\r\n"));
    }

    #[test]
    fn parse_headers_needs_more_data() {
        assert_eq!(try_parse_headers(b"HTTP/1.1 200 OK\r\n").unwrap(), None);
    }

    #[test]
    fn parse_headers_complete() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let (status, headers, consumed) = try_parse_headers(raw).unwrap().unwrap();
        assert_eq!(status, 200);
        assert_eq!(headers, vec![("Content-Length".to_string(), "5".to_string())]);
        assert_eq!(&raw[consumed..], b"hello");
    }

    #[test]
    fn framing_prefers_chunked_over_content_length() {
        let headers = vec![
            ("Transfer-Encoding".to_string(), "chunked".to_string()),
            ("Content-Length".to_string(), "5".to_string()),
        ];
        assert_eq!(framing_for(200, Method::Get, &headers), BodyFraming::Chunked);
    }

    #[test]
    fn chunked_decode_single_shot() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        let input = b"5\r\nhello\r\n0\r\n\r\n";
        let consumed = decoder.feed(input, &mut out);
        assert_eq!(out, b"hello");
        assert!(decoder.is_finished());
        assert_eq!(consumed, input.len() - 2); // trailing CRLF after final chunk not consumed
    }

    #[test]
    fn chunked_decode_split_across_feeds() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        let consumed1 = decoder.feed(b"5\r\nhel", &mut out);
        assert_eq!(consumed1, 6);
        assert_eq!(out, b"hel");
        let consumed2 = decoder.feed(b"lo\r\n0\r\n\r\n", &mut out);
        assert!(consumed2 > 0);
        assert_eq!(out, b"hello");
        assert!(decoder.is_finished());
    }
}
