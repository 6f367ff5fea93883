//! Calibre-Web client - programmatic access to a Calibre-Web e-book server.
//!
//! This library provides functionality for:
//! - Logging in and crawling the paginated book listing
//! - Extracting book metadata from detail pages
//! - Uploading books, formats and covers through the web edit forms
//! - Downloading book files and covers

pub mod config;
pub mod console;
pub mod content;
pub mod cookies;
pub mod error;
pub mod form;
pub mod identifiers;
pub mod model;
pub mod pages;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use content::{Content, ProgressFn, UploadProgress};
pub use error::{ClientError, ConfigError};
pub use identifiers::normalize_identifier_type;
pub use model::{Author, Book, BookIdentifiers, Format, ListBook, ListItem, Rating};
pub use pages::{ListingSource, crawl_listing, parse_book_page, parse_listing_page};
pub use session::{DownloadedFile, Session, SessionState};
