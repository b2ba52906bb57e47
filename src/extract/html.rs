//! `text/html` link harvesting: every `<a>` element's `href` attribute,
//! verbatim, in document order.

use scraper::{Html, Selector};

lazy_static::lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
}

/// Returns the `href` attribute of every `<a>` element in `body`, verbatim
/// (unresolved against any base URL — that happens downstream).
pub(crate) fn extract(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    document
        .select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect()
}
