//! Book detail page (`/book/{id}`).

use super::{element_text, parse_list_item, strip_label};
use crate::error::ClientError;
use crate::identifiers::normalize_identifier_type;
use crate::model::{Book, Format, ListItem, Rating};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Width of the "Published: " label in front of the publish date.
const PUBLISHED_LABEL_WIDTH: usize = 11;

/// Width of the "Language: " label in front of the language list.
const LANGUAGES_LABEL_WIDTH: usize = 10;

/// Publish dates are printed like "Aug 1, 1965".
const PUBLISHED_FORMAT: &str = "%b %d, %Y";

/// CSS selectors used for parsing detail pages.
struct Selectors {
    title: Selector,
    authors: Selector,
    author_links: Selector,
    tags: Selector,
    tag_links: Selector,
    publisher_links: Selector,
    comments: Selector,
    published: Selector,
    rating_filled: Selector,
    /// Download/read button group; the first child holds one link per format.
    button_group: Selector,
    languages: Selector,
    identifier_links: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            title: Selector::parse("h2#title").unwrap(),
            authors: Selector::parse(".author").unwrap(),
            author_links: Selector::parse(".author a").unwrap(),
            tags: Selector::parse(".tags").unwrap(),
            tag_links: Selector::parse(".tags a").unwrap(),
            publisher_links: Selector::parse(".publishers a").unwrap(),
            comments: Selector::parse(".comments").unwrap(),
            published: Selector::parse(".publishing-date p").unwrap(),
            rating_filled: Selector::parse(".rating .good").unwrap(),
            button_group: Selector::parse(".btn-group").unwrap(),
            languages: Selector::parse(".languages span").unwrap(),
            identifier_links: Selector::parse(".identifiers a").unwrap(),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

/// Parses the detail page of book `id`.
///
/// The title heading and the author, tag and description containers must
/// be present. Publish date, series line, languages and identifiers are
/// optional and fall back to empty values.
pub fn parse_book_page(id: u64, html: &str) -> Result<Book, ClientError> {
    let doc = Html::parse_document(html);
    let selectors = &*SELECTORS;
    let context = format!("book {}", id);

    let title_elem = doc
        .select(&selectors.title)
        .next()
        .ok_or_else(|| ClientError::malformed(&context, "missing title heading"))?;

    require(&doc, &selectors.authors, &context, "missing authors section")?;
    require(&doc, &selectors.tags, &context, "missing tags section")?;
    let comments = require(&doc, &selectors.comments, &context, "missing description")?;

    let mut book = Book::new(id);
    book.title = element_text(title_elem);
    book.authors = linked_names(&doc, &selectors.author_links, &context)?;
    book.categories = linked_names(&doc, &selectors.tag_links, &context)?;
    book.publisher = doc
        .select(&selectors.publisher_links)
        .map(element_text)
        .collect::<String>();
    book.description = description_html(comments);

    if let Some(elem) = doc.select(&selectors.published).next() {
        book.published = Some(parse_published(&element_text(elem), &context)?);
    }

    book.rating = Rating::from_count(doc.select(&selectors.rating_filled).count());

    for format in parse_formats(&doc)? {
        book.add_format(format);
    }

    if let Some((index, series)) = parse_series_line(title_elem, &context)? {
        book.series_index = index;
        book.series = series;
    }

    if let Some(elem) = doc.select(&selectors.languages).next() {
        book.languages = parse_languages(&element_text(elem), &context)?;
    }

    for link in doc.select(&selectors.identifier_links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let kind = normalize_identifier_type(&element_text(link));
        book.identifiers.insert(kind, href);
    }

    debug!(
        id,
        title = %book.title,
        formats = book.formats().count(),
        identifiers = book.identifiers.len(),
        "Parsed book page"
    );

    Ok(book)
}

fn require<'a>(
    doc: &'a Html,
    selector: &Selector,
    context: &str,
    message: &str,
) -> Result<ElementRef<'a>, ClientError> {
    doc.select(selector)
        .next()
        .ok_or_else(|| ClientError::malformed(context, message))
}

fn linked_names(doc: &Html, selector: &Selector, context: &str) -> Result<Vec<String>, ClientError> {
    doc.select(selector)
        .map(|link| parse_list_item(link, context).map(|item| item.name().to_string()))
        .collect()
}

/// Inner HTML of the description container minus its heading element.
fn description_html(comments: ElementRef) -> String {
    let inner = comments.inner_html();
    let heading = comments
        .children()
        .find_map(ElementRef::wrap)
        .map(|elem| elem.html());

    match heading {
        // Text nodes are serialized escaped, so the first match is the heading itself.
        Some(heading) => inner.replacen(&heading, "", 1).trim().to_string(),
        None => inner.trim().to_string(),
    }
}

fn parse_published(text: &str, context: &str) -> Result<NaiveDate, ClientError> {
    let value = strip_label(text, PUBLISHED_LABEL_WIDTH)
        .ok_or_else(|| ClientError::malformed(context, format!("short publish date '{}'", text)))?;
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");

    NaiveDate::parse_from_str(&value, PUBLISHED_FORMAT).map_err(|e| {
        ClientError::malformed(context, format!("unparsable publish date '{}': {}", value, e))
    })
}

fn parse_formats(doc: &Html) -> Result<Vec<Format>, ClientError> {
    let Some(group) = doc.select(&SELECTORS.button_group).next() else {
        return Ok(Vec::new());
    };
    let Some(first) = group.children().find_map(ElementRef::wrap) else {
        return Ok(Vec::new());
    };

    first
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|elem| elem.value().name() == "a")
        .map(|link| {
            let text = element_text(link);
            let label = text.split_whitespace().next().unwrap_or_default();
            Format::from_label(label)
        })
        .collect()
}

/// Reads "Book 2 of Dune Chronicles" from the last paragraph after the title.
///
/// The paragraph directly under the title is the author line; a series line,
/// when present, follows it.
fn parse_series_line(
    title: ElementRef,
    context: &str,
) -> Result<Option<(f64, String)>, ClientError> {
    let Some(line) = title
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|elem| elem.value().name() == "p")
        .last()
    else {
        return Ok(None);
    };

    if line.value().classes().any(|class| class == "author") {
        return Ok(None);
    }

    let text = line.text().collect::<String>();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let index = tokens
        .get(1)
        .and_then(|token| token.parse::<f64>().ok())
        .ok_or_else(|| ClientError::malformed(context, format!("unparsable series line '{}'", text.trim())))?;
    let series = tokens.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();
    if series.is_empty() {
        return Err(ClientError::malformed(
            context,
            format!("series line without a name '{}'", text.trim()),
        ));
    }

    Ok(Some((index, series)))
}

fn parse_languages(text: &str, context: &str) -> Result<Vec<String>, ClientError> {
    let value = strip_label(text, LANGUAGES_LABEL_WIDTH)
        .ok_or_else(|| ClientError::malformed(context, format!("short language line '{}'", text)))?
        .trim();

    if value.is_empty() {
        return Ok(Vec::new());
    }

    Ok(value.split(", ").map(|lang| lang.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUNE: &str = r#"<html><body><div class="single"><div class="row">
        <div class="col-sm-3">
            <div class="cover"><img src="/cover/42"></div>
            <div class="btn-toolbar" role="toolbar">
                <div class="btn-group" role="group">
                    <div class="btn-group" role="group">
                        <a class="btn btn-primary" href="/download/42/epub/42.epub">EPUB (1.2 Mb)</a>
                        <a class="btn btn-primary" href="/download/42/mobi/42.mobi">MOBI (2.0 Mb)</a>
                    </div>
                    <div class="btn-group" role="group">
                        <a class="btn btn-primary" href="/read/42/epub">Read in Browser</a>
                    </div>
                </div>
            </div>
        </div>
        <div class="col-sm-9 book-meta">
            <h2 id="title">Dune</h2>
            <p class="author"><a href="/author/3">Frank Herbert</a></p>
            <div class="rating">
                <span class="glyphicon glyphicon-star good"></span>
                <span class="glyphicon glyphicon-star good"></span>
                <span class="glyphicon glyphicon-star good"></span>
                <span class="glyphicon glyphicon-star good"></span>
                <span class="glyphicon glyphicon-star-empty"></span>
            </div>
            <div class="identifiers"><p>
                <span class="glyphicon glyphicon-link"></span>
                <a href="https://www.amazon.de/dp/B00B7NPRY8" class="btn btn-xs btn-success">Amazon.de</a>
                <a href="https://isbnsearch.org/isbn/9780441013593" class="btn btn-xs btn-success">ISBN</a>
                <a class="btn btn-xs btn-success">Google</a>
            </p></div>
            <div class="tags"><p><span class="glyphicon glyphicon-tags"></span>
                <a href="/category/7" class="btn btn-xs btn-info">Science Fiction</a>
                <a href="/category/8" class="btn btn-xs btn-info">Classics</a>
            </p></div>
            <div class="publishers"><p><span>Publisher: <a href="/publisher/2">Chilton Books</a></span></p></div>
            <div class="publishing-date"><p>Published: Aug 1, 1965 </p></div>
            <div class="comments">
                <h3 id="decription">Description:</h3>
                <p>Set on the desert planet <b>Arrakis</b>.</p>
            </div>
        </div>
    </div></div></body></html>"#;

    #[test]
    fn test_parse_dune() {
        let book = parse_book_page(42, DUNE).unwrap();

        assert_eq!(book.id(), 42);
        assert_eq!(book.title, "Dune");
        assert_eq!(book.authors, vec!["Frank Herbert"]);
        assert_eq!(book.categories, vec!["Science Fiction", "Classics"]);
        assert_eq!(book.publisher, "Chilton Books");
        assert_eq!(book.rating, Rating::Four);
        assert_eq!(book.series, "");
        assert_eq!(book.series_index, 0.0);
        assert!(book.languages.is_empty());
        assert_eq!(book.published, NaiveDate::from_ymd_opt(1965, 8, 1));
        assert_eq!(
            book.description,
            "<p>Set on the desert planet <b>Arrakis</b>.</p>"
        );
    }

    #[test]
    fn test_formats_from_first_link_group() {
        let book = parse_book_page(42, DUNE).unwrap();
        assert!(book.has_format(Format::Epub));
        assert!(book.has_format(Format::Mobi));
        assert!(!book.has_format(Format::Pdf));
        assert_eq!(book.formats().count(), 2);
    }

    #[test]
    fn test_identifiers_are_normalized_and_need_links() {
        let book = parse_book_page(42, DUNE).unwrap();
        assert_eq!(
            book.identifiers.get("amazon_de"),
            Some("https://www.amazon.de/dp/B00B7NPRY8")
        );
        assert_eq!(
            book.identifiers.isbn(),
            Some("https://isbnsearch.org/isbn/9780441013593")
        );
        assert_eq!(book.identifiers.google(), None);
        assert_eq!(book.identifiers.len(), 2);
    }

    #[test]
    fn test_series_and_languages() {
        let html = DUNE
            .replace(
                r#"<p class="author"><a href="/author/3">Frank Herbert</a></p>"#,
                r#"<p class="author"><a href="/author/3">Frank Herbert</a></p>
                   <p>Book 2.5 of <a href="/series/4">Dune Chronicles</a></p>"#,
            )
            .replace(
                r#"<div class="publishing-date">"#,
                r#"<div class="languages"><p><span>Language: English, German</span></p></div>
                   <div class="publishing-date">"#,
            );

        let book = parse_book_page(42, &html).unwrap();
        assert_eq!(book.series_index, 2.5);
        assert_eq!(book.series, "Dune Chronicles");
        assert_eq!(book.languages, vec!["English", "German"]);
    }

    #[test]
    fn test_optional_sections_absent() {
        let html = DUNE
            .replace(r#"<div class="publishing-date"><p>Published: Aug 1, 1965 </p></div>"#, "")
            .replace(r#"<div class="identifiers">"#, r#"<div class="unused">"#);

        let book = parse_book_page(42, &html).unwrap();
        assert_eq!(book.published, None);
        assert!(book.identifiers.is_empty());
    }

    #[test]
    fn test_missing_title_is_malformed() {
        let html = DUNE.replace(r#"<h2 id="title">Dune</h2>"#, "<h2>Dune</h2>");
        match parse_book_page(42, &html).unwrap_err() {
            ClientError::MalformedPage { context, message } => {
                assert_eq!(context, "book 42");
                assert!(message.contains("title"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_description_is_malformed() {
        let html = DUNE.replace(r#"<div class="comments">"#, r#"<div class="summary">"#);
        assert!(matches!(
            parse_book_page(42, &html),
            Err(ClientError::MalformedPage { .. })
        ));
    }

    #[test]
    fn test_unknown_format_label() {
        let html = DUNE.replace("MOBI (2.0 Mb)", "DJVU (2.0 Mb)");
        match parse_book_page(42, &html).unwrap_err() {
            ClientError::UnknownFormat(label) => assert_eq!(label, "DJVU"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_series_line() {
        let html = DUNE.replace(
            r#"<p class="author"><a href="/author/3">Frank Herbert</a></p>"#,
            r#"<p class="author"><a href="/author/3">Frank Herbert</a></p><p>Book two of Dune</p>"#,
        );
        assert!(matches!(
            parse_book_page(42, &html),
            Err(ClientError::MalformedPage { .. })
        ));
    }

    #[test]
    fn test_series_line_without_name() {
        let html = DUNE.replace(
            r#"<p class="author"><a href="/author/3">Frank Herbert</a></p>"#,
            r#"<p class="author"><a href="/author/3">Frank Herbert</a></p><p>Book 3 of</p>"#,
        );
        match parse_book_page(42, &html).unwrap_err() {
            ClientError::MalformedPage { message, .. } => assert!(message.contains("without a name")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
