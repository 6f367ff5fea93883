//! Authenticated session against a Calibre-Web server.
//!
//! A [`Session`] owns its cookie jar. Two HTTP clients share that jar: the
//! regular one follows redirects, the other never does and is only used
//! for existence checks, where a redirect is the "no such book" answer.

use crate::config::HttpConfig;
use crate::content::{Content, ProgressFn};
use crate::error::ClientError;
use crate::form::{CoverSource, MetadataForm, format_upload_form, upload_form};
use crate::model::{Book, Format, ListBook};
use crate::pages::{FlashMessages, ListingSource, crawl_listing, id_from_path, parse_book_page};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::Form;
use reqwest::{Response, StatusCode, redirect};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Response of `/upload`.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    location: String,
}

/// Entry of the `/get_*_json` lookup endpoints.
#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

/// Whether the session has logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { username: String },
}

/// A downloaded book file.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Name suggested by the server.
    pub filename: String,
    pub data: Bytes,
}

/// Client for one Calibre-Web server.
///
/// Operations are issued one at a time; give each concurrent worker its
/// own session.
pub struct Session {
    base_url: String,
    client: reqwest::Client,
    no_redirect: reqwest::Client,
    max_list_pages: u32,
    state: SessionState,
    progress: Option<ProgressFn>,
}

impl Session {
    /// Creates an unauthenticated session with an empty cookie jar.
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self, ClientError> {
        Self::with_cookie_jar(base_url, config, Arc::new(Jar::default()))
    }

    /// Creates a session around an existing cookie jar (e.g. loaded from disk).
    pub fn with_cookie_jar(
        base_url: &str,
        config: &HttpConfig,
        jar: Arc<Jar>,
    ) -> Result<Self, ClientError> {
        url::Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = build_client(config, Arc::clone(&jar), redirect::Policy::default())?;
        let no_redirect = build_client(config, jar, redirect::Policy::none())?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            no_redirect,
            max_list_pages: config.max_list_pages,
            state: SessionState::Unauthenticated,
            progress: None,
        })
    }

    /// Reports upload progress to `progress` for every streamed upload.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Logs in with the web login form.
    ///
    /// The server answers failed logins with a normal page carrying an
    /// alert banner, so the body is checked rather than the status.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let url = self.endpoint("/login");
        debug!(%url, username, "Logging in");

        let params = [
            ("next", "/me"),
            ("username", username),
            ("password", password),
            ("remember_me", "on"),
        ];
        let response = self.client.post(&url).form(&params).send().await?;
        check_flash(response, ClientError::Authentication).await?;

        self.state = SessionState::Authenticated {
            username: username.to_string(),
        };
        info!(username, "Logged in");
        Ok(())
    }

    /// Ends the server-side session.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.client.get(self.endpoint("/logout")).send().await?;
        self.state = SessionState::Unauthenticated;
        debug!("Logged out");
        Ok(())
    }

    /// Every book in the catalog, in listing order.
    pub async fn list_books(&self) -> Result<Vec<ListBook>, ClientError> {
        crawl_listing(self, self.max_list_pages).await
    }

    /// Fetches and parses a book's detail page.
    pub async fn book_by_id(&self, id: u64) -> Result<Book, ClientError> {
        let body = self.get_text(&format!("/book/{}", id)).await?;
        parse_book_page(id, &body)
    }

    pub async fn categories(&self) -> Result<Vec<String>, ClientError> {
        self.lookup_names("/get_tags_json").await
    }

    pub async fn authors(&self) -> Result<Vec<String>, ClientError> {
        self.lookup_names("/get_authors_json").await
    }

    pub async fn languages(&self) -> Result<Vec<String>, ClientError> {
        self.lookup_names("/get_languages_json").await
    }

    pub async fn series(&self) -> Result<Vec<String>, ClientError> {
        self.lookup_names("/get_series_json").await
    }

    /// Checks for a book without following redirects.
    pub async fn book_exists(&self, id: u64) -> Result<bool, ClientError> {
        let response = self
            .no_redirect
            .head(self.endpoint(&format!("/book/{}", id)))
            .send()
            .await?;
        let exists = !response.status().is_redirection();
        debug!(id, status = response.status().as_u16(), exists, "Checked book");
        Ok(exists)
    }

    async fn ensure_exists(&self, id: u64) -> Result<(), ClientError> {
        if self.book_exists(id).await? {
            Ok(())
        } else {
            Err(ClientError::NotFound(format!("book {}", id)))
        }
    }

    /// Deletes a book and all its files.
    pub async fn delete_book(&self, id: u64) -> Result<(), ClientError> {
        self.ensure_exists(id).await?;
        self.client
            .head(self.endpoint(&format!("/delete/{}", id)))
            .send()
            .await?;
        info!(id, "Deleted book");
        Ok(())
    }

    /// Deletes one format of a book.
    pub async fn delete_book_format(&self, id: u64, format: Format) -> Result<(), ClientError> {
        self.ensure_exists(id).await?;
        self.client
            .head(self.endpoint(&format!("/delete/{}/{}/", id, format.label())))
            .send()
            .await?;
        info!(id, %format, "Deleted format");
        Ok(())
    }

    /// Downloads one format of a book.
    pub async fn download_format(&self, id: u64, format: Format) -> Result<DownloadedFile, ClientError> {
        let ext = format.ext();
        let url = self.endpoint(&format!("/download/{}/{}/{}.{}", id, ext, id, ext));
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("{} of book {}", format.label(), id)));
        }
        let response = require_success(response)?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| format!("{}.{}", id, ext));
        let data = response.bytes().await?;

        debug!(id, %format, %filename, bytes = data.len(), "Downloaded format");
        Ok(DownloadedFile { filename, data })
    }

    /// Downloads a book's cover image.
    pub async fn download_cover(&self, id: u64) -> Result<Bytes, ClientError> {
        let url = self.endpoint(&format!("/cover/{}", id));
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("cover of book {}", id)));
        }
        Ok(require_success(response)?.bytes().await?)
    }

    /// Opens upload content: `http…` URIs are fetched, anything else is a local path.
    pub async fn open_content(&self, uri: &str) -> Result<Content, ClientError> {
        if uri.starts_with("http") {
            let response = require_success(self.client.get(uri).send().await?)?;
            Ok(Content::from_response(response))
        } else {
            Content::from_path(uri).await
        }
    }

    /// Uploads a new book file and returns the book the server created.
    pub async fn upload(&self, uri: &str) -> Result<Book, ClientError> {
        let content = self.open_content(uri).await?;
        info!(file = content.filename(), "Uploading book");
        let form = upload_form(content.into_part(self.progress.clone())?);

        let response = self
            .client
            .post(self.endpoint("/upload"))
            .multipart(form)
            .send()
            .await?;
        let body = require_success(response)?.text().await?;

        let upload: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("upload response: {}", e)))?;
        let id = id_from_path(&upload.location).ok_or_else(|| {
            ClientError::InvalidResponse(format!("no book id in location '{}'", upload.location))
        })?;

        debug!(id, location = %upload.location, "Upload accepted");
        self.book_by_id(id).await
    }

    /// Sends every editable field of `book` to its edit form.
    pub async fn update_metadata(&self, book: &Book) -> Result<(), ClientError> {
        let form = MetadataForm::from_book(book).into_multipart();
        self.post_edit_form(book.id(), form).await
    }

    /// Adds a format file to `book`, resubmitting its current metadata.
    pub async fn book_upload_format(&self, book: &Book, uri: &str) -> Result<(), ClientError> {
        let content = self.open_content(uri).await?;
        info!(id = book.id(), file = content.filename(), "Uploading format");
        let form = format_upload_form(book, content.into_part(self.progress.clone())?);
        self.post_edit_form(book.id(), form).await
    }

    /// Adds a format file to the book with the given id.
    pub async fn upload_format(&self, id: u64, uri: &str) -> Result<(), ClientError> {
        let book = self.book_by_id(id).await?;
        self.book_upload_format(&book, uri).await
    }

    /// Replaces a book's cover from a URL or a local png/jpeg/webp file.
    pub async fn update_cover(&self, id: u64, uri: &str) -> Result<(), ClientError> {
        let source = if uri.starts_with("http") {
            CoverSource::Url(uri.to_string())
        } else {
            CoverSource::File(Content::from_path(uri).await?)
        };
        source.validate()?;

        let form = source.into_multipart(self.progress.clone())?;
        self.post_edit_form(id, form).await
    }

    async fn post_edit_form(&self, id: u64, form: Form) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint(&format!("/admin/book/{}", id)))
            .multipart(form)
            .send()
            .await?;
        check_flash(response, ClientError::Rejected).await?;
        debug!(id, "Edit form accepted");
        Ok(())
    }

    async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let url = self.endpoint(path);
        debug!(%url, "Fetching page");
        let response = self.client.get(&url).send().await?;
        Ok(require_success(response)?.text().await?)
    }

    async fn lookup_names(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let response = require_success(self.client.get(self.endpoint(path)).send().await?)?;
        let body = response.text().await?;
        let entries: Vec<NamedEntry> = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", path, e)))?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }
}

#[async_trait]
impl ListingSource for Session {
    async fn listing_page(&self, page: u32) -> Result<String, ClientError> {
        self.get_text(&format!("/root/old/1/{}", page)).await
    }
}

fn build_client(
    config: &HttpConfig,
    jar: Arc<Jar>,
    policy: redirect::Policy,
) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .cookie_provider(jar)
        .redirect(policy);

    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    Ok(builder.build()?)
}

fn require_success(response: Response) -> Result<Response, ClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ClientError::UnexpectedStatus {
            url: response.url().to_string(),
            status: response.status().as_u16(),
        })
    }
}

/// Accepts a 200 page unless it carries an alert banner.
async fn check_flash<F>(response: Response, on_alert: F) -> Result<(), ClientError>
where
    F: FnOnce(String) -> ClientError,
{
    if response.status() != StatusCode::OK {
        return Err(ClientError::UnexpectedStatus {
            url: response.url().to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = response.text().await?;
    FlashMessages::parse(&body).into_result(on_alert)
}

/// Filename from a `Content-Disposition` header, percent-decoded.
fn disposition_filename(header: &str) -> Option<String> {
    let params = header.split(';').map(str::trim);

    let mut plain = None;
    for param in params {
        if let Some(value) = param.strip_prefix("filename*=") {
            // RFC 5987: charset'language'value
            let encoded = value.split("''").nth(1).unwrap_or(value);
            if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                return Some(decoded.into_owned());
            }
        } else if let Some(value) = param.strip_prefix("filename=") {
            let value = value.trim_matches('"');
            plain = Some(
                urlencoding::decode(value)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            );
        }
    }

    plain.filter(|name| !name.is_empty())
}
