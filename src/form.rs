//! Multipart bodies for the book edit form.
//!
//! The server only accepts metadata writes through the same form the web UI
//! submits, so field names and value formats here mirror that form exactly.

use crate::content::{Content, ProgressFn};
use crate::error::ClientError;
use crate::model::Book;
use reqwest::multipart::{Form, Part};

/// Field carrying the book file on a new-book upload.
pub const UPLOAD_FIELD: &str = "btn-upload";

/// Field carrying an additional format for an existing book.
pub const FORMAT_UPLOAD_FIELD: &str = "btn-upload-format";

/// Field carrying a cover image file.
pub const COVER_UPLOAD_FIELD: &str = "btn-upload-cover";

/// Field carrying a cover image URL.
pub const COVER_URL_FIELD: &str = "cover_url";

/// Content types the server accepts as cover images.
pub const COVER_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// The text fields of a metadata update, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataForm {
    fields: Vec<(String, String)>,
}

impl MetadataForm {
    /// Serializes every editable field of `book`.
    ///
    /// Each identifier becomes an `identifier-type-N` / `identifier-val-N`
    /// pair. `N` only correlates the two halves of a pair, so a counter
    /// scoped to this form is enough to keep pairs apart.
    pub fn from_book(book: &Book) -> Self {
        let published = book
            .published
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let mut form = Self { fields: Vec::new() };
        form.push("book_title", &book.title);
        form.push("author_name", book.authors.join(" & "));
        form.push("description", &book.description);
        form.push("tags", book.categories.join(", "));
        form.push("series", &book.series);
        form.push("series_index", book.series_index.to_string());
        form.push("rating", book.rating.value().to_string());
        form.push(COVER_URL_FIELD, "");
        form.push("pubdate", published);
        form.push("publisher", &book.publisher);
        form.push("languages", book.languages.join(", "));

        for (suffix, (kind, value)) in book.identifiers.iter().enumerate() {
            form.push(format!("identifier-type-{}", suffix), kind);
            form.push(format!("identifier-val-{}", suffix), value);
        }

        form
    }

    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn into_multipart(self) -> Form {
        self.fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
    }
}

/// What to send as a book's new cover.
#[derive(Debug)]
pub enum CoverSource {
    /// The server fetches the image itself.
    Url(String),
    /// Image bytes uploaded as a file part.
    File(Content),
}

impl CoverSource {
    /// Checks the cover precondition without consuming the source.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            CoverSource::Url(_) => Ok(()),
            CoverSource::File(content) => {
                let content_type = content.content_type();
                if COVER_CONTENT_TYPES.contains(&content_type) {
                    Ok(())
                } else {
                    Err(ClientError::UnsupportedContentType(content_type.to_string()))
                }
            }
        }
    }

    /// Builds the cover form; `progress` observes file uploads.
    pub fn into_multipart(self, progress: Option<ProgressFn>) -> Result<Form, ClientError> {
        self.validate()?;
        match self {
            CoverSource::Url(url) => Ok(Form::new().text(COVER_URL_FIELD, url)),
            CoverSource::File(content) => {
                Ok(Form::new().part(COVER_UPLOAD_FIELD, content.into_part(progress)?))
            }
        }
    }
}

/// Form for a new-book upload: just the file.
pub fn upload_form(part: Part) -> Form {
    Form::new().part(UPLOAD_FIELD, part)
}

/// Metadata fields of `book` plus an extra format file.
pub fn format_upload_form(book: &Book, part: Part) -> Form {
    MetadataForm::from_book(book)
        .into_multipart()
        .part(FORMAT_UPLOAD_FIELD, part)
}
