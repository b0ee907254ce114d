//! Allow-list HTML sanitization for user-authored bodies.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;

/// Tags a comment body may keep. Everything else is stripped.
pub const ALLOWED_TAGS: &[&str] = &[
    "address", "article", "aside", "footer", "header", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "main", "nav", "section", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "hr", "li", "ol", "p", "pre", "ul", "a", "abbr", "b", "bdi", "bdo", "br", "cite",
    "code", "data", "dfn", "em", "i", "kbd", "mark", "q", "rb", "rp", "rt", "rtc", "ruby", "s",
    "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var", "wbr", "caption", "col",
    "colgroup", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "iframe", "img",
];

/// Attributes allowed on any kept tag.
const GENERIC_ATTRIBUTES: &[&str] = &["class", "id", "title", "lang", "dir"];

/// Attributes allowed only on specific tags.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "target"]),
    ("img", &["src", "alt", "width", "height"]),
    ("iframe", &["src", "width", "height", "frameborder", "allow", "allowfullscreen"]),
    ("td", &["colspan", "rowspan"]),
    ("th", &["colspan", "rowspan", "scope"]),
    ("col", &["span"]),
    ("colgroup", &["span"]),
    ("ol", &["start", "reversed"]),
    ("time", &["datetime"]),
    ("data", &["value"]),
    ("blockquote", &["cite"]),
    ("q", &["cite"]),
    ("code", &["data-language"]),
];

fn builder() -> Builder<'static> {
    let tag_attributes: HashMap<&'static str, HashSet<&'static str>> = TAG_ATTRIBUTES
        .iter()
        .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
        .collect();

    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .generic_attributes(GENERIC_ATTRIBUTES.iter().copied().collect())
        .tag_attributes(tag_attributes)
        .clean_content_tags(["script", "style"].into_iter().collect());
    builder
}

/// Strips every tag and attribute outside the allow-lists. `script` and
/// `style` are removed together with their content.
pub fn sanitize_html(raw: &str) -> String {
    builder().clean(raw).to_string()
}
