//! Link extraction, dispatched by response `Content-Type`.

mod html;
mod js;

use url::Url;

/// Extracts candidate links from a response body. `content_type` is the
/// full header value (parameters like `; charset=utf-8` are ignored);
/// `base` is the response's effective URL, used by the JavaScript path to
/// resolve relative fragments and filter out-of-domain full URLs.
///
/// Unknown content types (including SWF) return an empty list without
/// error — no extraction is attempted for them.
pub fn extract_links(content_type: &str, body: &[u8], base: &Url) -> Vec<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/html" => {
            let text = String::from_utf8_lossy(body);
            html::extract(&text)
        }
        "application/javascript" | "application/x-javascript" | "text/javascript" => {
            let text = String::from_utf8_lossy(body);
            js::extract(&text, base)
        }
        _ => Vec::new(),
    }
}
