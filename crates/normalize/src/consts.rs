use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

selector!(BODY_SELECTOR, "body");

// OneNote exports check boxes as tagged paragraphs. The attribute value must
// match exactly, otherwise "to-do" would also swallow "to-do:completed".
regex!(TODO_REGEX, r#"(?is)<p[^>]*\bdata-tag="to-do"[^>]*>(.*?)</p>"#);
regex!(TODO_DONE_REGEX, r#"(?is)<p[^>]*\bdata-tag="to-do:completed"[^>]*>(.*?)</p>"#);

// "onenote:#Page%20Title&section-id=...": the page title sits between the
// fragment marker and the first parameter separator.
regex!(ONENOTE_LINK_REGEX, r"^onenote:#(.+?)&");

/// Elements that never carry readable content.
pub(crate) const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript"];

