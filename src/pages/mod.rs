//! HTML extraction for Calibre-Web's server-rendered pages.
//!
//! Each submodule understands one page layout. Extractors take the page
//! body as a string and parse it synchronously, so no parsed document is
//! ever held across an `.await`.

mod detail;
mod flash;
mod listing;

pub use detail::parse_book_page;
pub use flash::FlashMessages;
pub use listing::{ListingPage, ListingSource, crawl_listing, parse_listing_page};

use crate::error::ClientError;
use crate::model::Author;
use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

/// Trailing numeric path segment of a link (`/author/12`, `/book/7/`).
static TRAILING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|/)(\d+)/*$").unwrap());

/// Extracts the id from the last path segment of a link target.
pub(crate) fn id_from_path(path: &str) -> Option<u64> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    TRAILING_ID
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Reads a linked entity (author, category) from an anchor element.
pub(crate) fn parse_list_item(link: ElementRef, context: &str) -> Result<Author, ClientError> {
    let href = link
        .value()
        .attr("href")
        .ok_or_else(|| ClientError::malformed(context, "entity link without href"))?;
    let id = id_from_path(href).ok_or_else(|| {
        ClientError::malformed(context, format!("no numeric id in link '{}'", href))
    })?;

    Ok(Author::new(id, element_text(link)))
}

/// Concatenated, trimmed text content of an element.
pub(crate) fn element_text(elem: ElementRef) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Drops the first `width` characters of a labelled value ("Published: ...").
pub(crate) fn strip_label(text: &str, width: usize) -> Option<&str> {
    match text.char_indices().nth(width) {
        Some((idx, _)) => Some(&text[idx..]),
        None if text.chars().count() == width => Some(""),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListItem;
    use scraper::{Html, Selector};

    #[test]
    fn test_id_from_path() {
        assert_eq!(id_from_path("/author/12"), Some(12));
        assert_eq!(id_from_path("/book/7/"), Some(7));
        assert_eq!(id_from_path("https://library.example/series/3?x=1"), Some(3));
        assert_eq!(id_from_path("/author/stored"), None);
        assert_eq!(id_from_path("/book/abc7"), None);
        assert_eq!(id_from_path("42"), Some(42));
    }

    #[test]
    fn test_parse_list_item() {
        let doc = Html::parse_fragment(r#"<a href="/author/3">Frank Herbert</a><a>Nobody</a>"#);
        let selector = Selector::parse("a").unwrap();
        let mut links = doc.select(&selector);

        let author = parse_list_item(links.next().unwrap(), "test").unwrap();
        assert_eq!(author.id(), 3);
        assert_eq!(author.name(), "Frank Herbert");

        let err = parse_list_item(links.next().unwrap(), "test").unwrap_err();
        assert!(matches!(err, ClientError::MalformedPage { .. }));
    }

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("Language: English", 10), Some("English"));
        assert_eq!(strip_label("short", 10), None);
        assert_eq!(strip_label("Language: ", 10), Some(""));
        assert_eq!(strip_label("Язык: русский", 6), Some("русский"));
    }
}
