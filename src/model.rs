//! Entity types recovered from Calibre-Web pages.
//!
//! Every entity is a plain value: the client keeps no cache, and each read
//! produces fresh instances from a new page fetch.

use crate::error::ClientError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Anything that appears on a page as a link to a numbered entity.
pub trait ListItem {
    /// Numeric id taken from the link target.
    fn id(&self) -> u64;

    /// Display text of the link.
    fn name(&self) -> &str;
}

/// An author (or any other linked entity) as shown on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    id: u64,
    name: String,
}

impl Author {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl ListItem for Author {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Summary of a book as shown on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListBook {
    id: u64,
    name: String,
    authors: Vec<Author>,
}

impl ListBook {
    pub fn new(id: u64, name: impl Into<String>, authors: Vec<Author>) -> Self {
        Self {
            id,
            name: name.into(),
            authors,
        }
    }

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }
}

impl ListItem for ListBook {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Book file formats the server can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Mobi,
    Epub,
    Azw3,
    Docx,
    Rtf,
    Fb2,
    Lit,
    Lrf,
    Txt,
    Htmlz,
    Odt,
    Cbz,
}

impl Format {
    /// Every format, in declaration order.
    pub const ALL: [Format; 13] = [
        Format::Pdf,
        Format::Mobi,
        Format::Epub,
        Format::Azw3,
        Format::Docx,
        Format::Rtf,
        Format::Fb2,
        Format::Lit,
        Format::Lrf,
        Format::Txt,
        Format::Htmlz,
        Format::Odt,
        Format::Cbz,
    ];

    /// Lowercase file extension, used in download URLs.
    pub fn ext(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Mobi => "mobi",
            Format::Epub => "epub",
            Format::Azw3 => "azw3",
            Format::Docx => "docx",
            Format::Rtf => "rtf",
            Format::Fb2 => "fb2",
            Format::Lit => "lit",
            Format::Lrf => "lrf",
            Format::Txt => "txt",
            Format::Htmlz => "htmlz",
            Format::Odt => "odt",
            Format::Cbz => "cbz",
        }
    }

    /// Uppercase label as printed on download buttons and used in delete URLs.
    pub fn label(self) -> String {
        self.ext().to_ascii_uppercase()
    }

    /// Matches a scraped download-button label. Case-sensitive.
    pub fn from_label(label: &str) -> Result<Self, ClientError> {
        Format::ALL
            .into_iter()
            .find(|format| format.label() == label)
            .ok_or_else(|| ClientError::UnknownFormat(label.to_string()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

impl FromStr for Format {
    type Err = ClientError;

    /// Parses an extension such as `epub` or `.EPUB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|format| format.ext() == ext)
            .ok_or_else(|| ClientError::UnknownFormat(s.to_string()))
    }
}

/// Star rating, 0 meaning unrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(into = "u8")]
pub enum Rating {
    #[default]
    None,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Rating {
    /// Converts a count of filled stars. Anything above five is five.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Rating::None,
            1 => Rating::One,
            2 => Rating::Two,
            3 => Rating::Three,
            4 => Rating::Four,
            _ => Rating::Five,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

/// Identifiers keyed by canonical lowercase type (`isbn`, `amazon_de`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BookIdentifiers(BTreeMap<String, String>);

impl BookIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under an already normalized key.
    pub fn insert(&mut self, kind: impl Into<String>, value: impl Into<String>) {
        self.0.insert(kind.into(), value.into());
    }

    pub fn get(&self, kind: &str) -> Option<&str> {
        self.0.get(kind).map(String::as_str)
    }

    pub fn remove(&mut self, kind: &str) -> Option<String> {
        self.0.remove(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn isbn(&self) -> Option<&str> {
        self.get("isbn")
    }

    pub fn amazon(&self) -> Option<&str> {
        self.get("amazon")
    }

    pub fn doi(&self) -> Option<&str> {
        self.get("doi")
    }

    pub fn douban(&self) -> Option<&str> {
        self.get("douban")
    }

    pub fn goodreads(&self) -> Option<&str> {
        self.get("goodreads")
    }

    pub fn google(&self) -> Option<&str> {
        self.get("google")
    }

    pub fn kobo(&self) -> Option<&str> {
        self.get("kobo")
    }

    pub fn issn(&self) -> Option<&str> {
        self.get("issn")
    }

    pub fn isfdb(&self) -> Option<&str> {
        self.get("isfdb")
    }

    pub fn lubimyczytac(&self) -> Option<&str> {
        self.get("lubimyczytac")
    }

    pub fn url(&self) -> Option<&str> {
        self.get("url")
    }
}

/// Full book metadata as shown on its detail page.
///
/// `id` and the format set come from the server and are read-only; the
/// remaining fields may be edited before sending a metadata update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    id: u64,
    formats: BTreeSet<Format>,

    pub title: String,
    /// Empty when the book is not part of a series.
    pub series: String,
    pub rating: Rating,
    pub series_index: f64,
    pub published: Option<NaiveDate>,
    /// Raw HTML fragment.
    pub description: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub publisher: String,
    pub languages: Vec<String>,
    pub identifiers: BookIdentifiers,
}

impl Book {
    /// Creates an empty record for the given id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            formats: BTreeSet::new(),
            title: String::new(),
            series: String::new(),
            rating: Rating::None,
            series_index: 0.0,
            published: None,
            description: String::new(),
            authors: Vec::new(),
            categories: Vec::new(),
            publisher: String::new(),
            languages: Vec::new(),
            identifiers: BookIdentifiers::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn has_format(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    pub fn formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.formats.iter().copied()
    }

    pub(crate) fn add_format(&mut self, format: Format) {
        self.formats.insert(format);
    }
}
