//! Paginated book listing (`/root/old/1/{page}`).

use super::{element_text, id_from_path, parse_list_item};
use crate::error::ClientError;
use crate::model::{ListBook, ListItem};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

/// CSS selectors used for parsing listing pages.
struct Selectors {
    /// One book tile.
    book: Selector,
    /// Title inside a tile.
    title: Selector,
    /// Link carrying the book id.
    meta_link: Selector,
    /// Author links inside a tile.
    author: Selector,
    /// Pagination "next" button.
    next: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            book: Selector::parse(".book").unwrap(),
            title: Selector::parse(".title").unwrap(),
            meta_link: Selector::parse(".meta a").unwrap(),
            author: Selector::parse(".author-name").unwrap(),
            next: Selector::parse(".next").unwrap(),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

/// Books found on one listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub books: Vec<ListBook>,

    /// Whether the page offers a link to a following page.
    pub has_next: bool,
}

/// Something that can hand out listing pages by number (1-based).
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Returns the raw HTML of listing page `page`.
    async fn listing_page(&self, page: u32) -> Result<String, ClientError>;
}

/// Parses a single listing page.
pub fn parse_listing_page(html: &str, page: u32) -> Result<ListingPage, ClientError> {
    let doc = Html::parse_document(html);
    let selectors = &*SELECTORS;
    let context = format!("listing page {}", page);

    let mut books = Vec::new();
    for tile in doc.select(&selectors.book) {
        let href = tile
            .select(&selectors.meta_link)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or_else(|| ClientError::malformed(&context, "book tile without id link"))?;
        let id = id_from_path(href).ok_or_else(|| {
            ClientError::malformed(&context, format!("no book id in link '{}'", href))
        })?;

        let title = tile
            .select(&selectors.title)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let authors = tile
            .select(&selectors.author)
            .map(|link| parse_list_item(link, &context))
            .collect::<Result<Vec<_>, _>>()?;

        books.push(ListBook::new(id, title, authors));
    }

    let has_next = doc
        .select(&selectors.next)
        .any(|elem| !element_text(elem).is_empty());

    Ok(ListingPage { books, has_next })
}

/// Walks listing pages from page 1 until one has no "next" link.
///
/// Books are returned in page order; a book repeated on a later page (the
/// catalog shifted while crawling) is kept only at its first position.
/// Fails if `max_pages` pages all advertise a successor.
pub async fn crawl_listing<S>(source: &S, max_pages: u32) -> Result<Vec<ListBook>, ClientError>
where
    S: ListingSource + ?Sized,
{
    let mut books = Vec::new();
    let mut seen = HashSet::new();

    for page in 1..=max_pages {
        let body = source.listing_page(page).await?;
        let listing = parse_listing_page(&body, page)?;
        debug!(
            page,
            count = listing.books.len(),
            has_next = listing.has_next,
            "Parsed listing page"
        );

        for book in listing.books {
            if seen.insert(book.id()) {
                books.push(book);
            }
        }

        if !listing.has_next {
            return Ok(books);
        }
    }

    Err(ClientError::malformed(
        format!("listing page {}", max_pages),
        format!("next-page link still present after {} pages", max_pages),
    ))
}
