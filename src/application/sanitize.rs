use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use once_cell::sync::Lazy;

static ARTICLE_SANITIZER: Lazy<AmmoniaBuilder<'static>> = Lazy::new(build_article_sanitizer);

/// Clean generated article HTML before it is stored.
///
/// Anchors are dropped (keeping their text) because links are added at
/// render time. Headings stop at `h2`.
pub fn sanitize_article_html(html: &str) -> String {
    ARTICLE_SANITIZER.clean(html).to_string()
}

fn build_article_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "abbr",
        "b",
        "blockquote",
        "br",
        "code",
        "dd",
        "del",
        "div",
        "dl",
        "dt",
        "em",
        "h2",
        "hr",
        "i",
        "li",
        "ol",
        "p",
        "pre",
        "section",
        "span",
        "strong",
        "sub",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "u",
        "ul",
    ]);
    builder.tags(tags);
    builder.generic_attributes(HashSet::from(["class", "lang", "dir"]));

    builder
}
