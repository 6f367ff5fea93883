//! Upload content read from a local file or a remote HTTP resource.
//!
//! Content is streamed into the request body chunk by chunk; nothing is
//! buffered beyond the first few hundred bytes used to sniff the type.

use crate::error::ClientError;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::multipart::Part;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Number of leading bytes inspected when sniffing a file's type.
const SNIFF_LEN: usize = 512;

/// Read size for streaming file uploads.
const CHUNK_SIZE: usize = 64 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// Upload progress snapshot passed to a [`ProgressFn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    /// Path or redacted URL of the content.
    pub source: String,
    /// Bytes handed to the request body so far.
    pub sent: u64,
    /// Total size, when known up front.
    pub total: Option<u64>,
}

/// Callback observing bytes as they are read into a request body.
pub type ProgressFn = Arc<dyn Fn(&UploadProgress) + Send + Sync>;

#[derive(Debug)]
enum Source {
    File(File),
    Remote(reqwest::Response),
}

/// A readable upload source with its name, size and content type.
#[derive(Debug)]
pub struct Content {
    source: Source,
    size: Option<u64>,
    content_type: String,
    filename: String,
    location: String,
}

impl Content {
    /// Opens a local file and sniffs its content type.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let mut file = File::open(path).await?;

        let mut head = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < head.len() {
            let n = file.read(&mut head[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        file.seek(SeekFrom::Start(0)).await?;

        let size = file.metadata().await?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            source: Source::File(file),
            size: Some(size),
            content_type: sniff_content_type(&head[..filled]).to_string(),
            filename,
            location: path.display().to_string(),
        })
    }

    /// Wraps a response whose body has not been read yet.
    ///
    /// The filename is the last path segment of the final URL, and the
    /// content type is whatever the remote server declared.
    pub fn from_response(response: reqwest::Response) -> Self {
        let mut url = response.url().clone();
        url.set_query(None);
        let _ = url.set_password(None);

        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
            .unwrap_or_default();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(OCTET_STREAM)
            .to_string();

        Self {
            size: response.content_length(),
            source: Source::Remote(response),
            content_type,
            filename,
            location: url.to_string(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Path or redacted URL the content comes from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Converts the content into a streaming multipart file part.
    pub fn into_part(self, progress: Option<ProgressFn>) -> Result<Part, ClientError> {
        let chunks: BoxStream<'static, io::Result<Bytes>> = match self.source {
            Source::File(file) => file_chunks(file).boxed(),
            Source::Remote(response) => response.bytes_stream().map_err(io::Error::other).boxed(),
        };

        let chunks = match progress {
            Some(report) => {
                let mut snapshot = UploadProgress {
                    source: self.location,
                    sent: 0,
                    total: self.size,
                };
                chunks
                    .inspect_ok(move |chunk| {
                        snapshot.sent += chunk.len() as u64;
                        report(&snapshot);
                    })
                    .boxed()
            }
            None => chunks,
        };

        let body = reqwest::Body::wrap_stream(chunks);
        let part = match self.size {
            Some(len) => Part::stream_with_length(body, len),
            None => Part::stream(body),
        };

        Ok(part.file_name(self.filename).mime_str(&self.content_type)?)
    }
}

fn file_chunks(file: File) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), file)))
    })
}

/// Guesses a MIME type from leading bytes.
///
/// Recognizes the image types accepted as covers, common container
/// signatures and plain text; everything else is `application/octet-stream`.
pub fn sniff_content_type(head: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"Rar!\x1a\x07", "application/x-rar-compressed"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
    ];

    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return "image/webp";
    }

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return *mime;
    }

    let trimmed = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &head[start..])
        .unwrap_or_default();
    let lower: Vec<u8> = trimmed.iter().take(14).map(u8::to_ascii_lowercase).collect();
    if lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html") {
        return "text/html; charset=utf-8";
    }

    let binary = head
        .iter()
        .any(|&b| b <= 0x08 || b == 0x0b || (0x0e..=0x1a).contains(&b) || (0x1c..=0x1f).contains(&b));
    if binary {
        OCTET_STREAM
    } else {
        "text/plain; charset=utf-8"
    }
}
