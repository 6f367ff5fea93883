//! calibrecli - command-line client for Calibre-Web servers.

use anyhow::{Context, Result};
use calibre_web_client::config::{Config, ENV_PASSWORD, ENV_URL, ENV_USERNAME};
use calibre_web_client::console::{Console, human_size};
use calibre_web_client::content::{ProgressFn, UploadProgress, sniff_content_type};
use calibre_web_client::cookies::load_cookie_file;
use calibre_web_client::model::{Book, Format, ListItem};
use calibre_web_client::session::Session;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Command-line client for Calibre-Web servers.
#[derive(Parser, Debug)]
#[command(name = "calibrecli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL.
    #[arg(long, env = ENV_URL, global = true)]
    url: Option<String>,

    #[arg(long, env = ENV_USERNAME, global = true)]
    username: Option<String>,

    #[arg(long, env = ENV_PASSWORD, global = true, hide_env_values = true)]
    password: Option<String>,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List books or one of the lookup lists.
    List {
        #[arg(value_enum)]
        what: ListKind,
    },

    /// Show a book's metadata.
    Show {
        id: u64,

        /// Print the book as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a book exists.
    Exists { id: u64 },

    /// Delete a book.
    Delete {
        id: u64,

        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },

    /// Delete one format of a book.
    DeleteFormat {
        id: u64,
        format: Format,

        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },

    /// Upload a new book, optionally followed by more formats of it.
    Upload {
        /// Local path or http(s) URL.
        uri: String,

        /// Additional format files for the same book.
        formats: Vec<String>,
    },

    /// Add a format file to an existing book.
    AddFormat { id: u64, uri: String },

    /// Replace a book's cover from a URL or a png/jpeg/webp file.
    Cover { id: u64, uri: String },

    /// Download one format of a book.
    Download {
        id: u64,
        format: Format,

        /// Target directory (defaults to the configured download directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download a book's cover image.
    DownloadCover {
        id: u64,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListKind {
    Books,
    Languages,
    Categories,
    Series,
    Authors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args.command, "CLI arguments parsed");

    let console = Console::new();
    let config = load_config(&args)?;

    let jar = match &config.paths.cookie_file {
        Some(path) => load_cookie_file(path)
            .with_context(|| format!("Failed to load cookies from {}", path.display()))?,
        None => Arc::default(),
    };

    let progress_console = console;
    let progress: ProgressFn = Arc::new(move |p: &UploadProgress| {
        let total = p.total.map(human_size).unwrap_or_else(|| "?".to_string());
        progress_console.progress_update(&format!(
            "{} {} / {}",
            p.source,
            human_size(p.sent),
            total
        ));
    });

    let mut session = Session::with_cookie_jar(&config.server.url, &config.http, jar)
        .context("Failed to create session")?
        .with_progress(progress);

    if config.server.has_credentials() {
        session
            .login(&config.server.username, &config.server.password)
            .await
            .context("Login failed")?;
    }

    let result = run(&session, &config, &console, args.command).await;

    if session.is_authenticated() {
        if let Err(e) = session.logout().await {
            console.warning(&format!("Logout failed: {}", e));
        }
    }

    result
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    config.apply_env();
    if let Some(url) = &args.url {
        config.server.url = url.clone();
    }
    if let Some(username) = &args.username {
        config.server.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.server.password = password.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(session: &Session, config: &Config, console: &Console, command: Command) -> Result<()> {
    match command {
        Command::List { what } => list(session, console, what).await,

        Command::Show { id, json } => {
            let book = session.book_by_id(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&book)?);
            } else {
                print_book(console, &book);
            }
            Ok(())
        }

        Command::Exists { id } => {
            if session.book_exists(id).await? {
                console.success(&format!("Book {} exists", id));
            } else {
                console.info(&format!("Book {} does not exist", id));
            }
            Ok(())
        }

        Command::Delete { id, yes } => {
            if !yes && !console.confirm(false, &format!("Delete book {}?", id)) {
                console.info("Nothing deleted");
                return Ok(());
            }
            session.delete_book(id).await?;
            console.success(&format!("Deleted book {}", id));
            Ok(())
        }

        Command::DeleteFormat { id, format, yes } => {
            let question = format!("Delete {} of book {}?", format.label(), id);
            if !yes && !console.confirm(false, &question) {
                console.info("Nothing deleted");
                return Ok(());
            }
            session.delete_book_format(id, format).await?;
            console.success(&format!("Deleted {} of book {}", format.label(), id));
            Ok(())
        }

        Command::Upload { uri, formats } => upload(session, console, &uri, &formats).await,

        Command::AddFormat { id, uri } => {
            session
                .upload_format(id, &uri)
                .await
                .with_context(|| format!("Failed to add {} to book {}", uri, id))?;
            console.clear_line();
            console.success(&format!("Added {} to book {}", uri, id));
            Ok(())
        }

        Command::Cover { id, uri } => {
            session
                .update_cover(id, &uri)
                .await
                .with_context(|| format!("Failed to set cover of book {}", id))?;
            console.clear_line();
            console.success(&format!("Updated cover of book {}", id));
            Ok(())
        }

        Command::Download { id, format, output } => {
            let file = session.download_format(id, format).await?;
            let dir = output.unwrap_or_else(|| config.paths.download_directory.clone());
            let path = write_file(&dir, &file.filename, &file.data).await?;
            console.success(&format!(
                "Saved {} ({})",
                path.display(),
                console.size(file.data.len() as u64)
            ));
            Ok(())
        }

        Command::DownloadCover { id, output } => {
            let data = session.download_cover(id).await?;
            let ext = match sniff_content_type(&data) {
                "image/png" => "png",
                "image/webp" => "webp",
                _ => "jpg",
            };
            let dir = output.unwrap_or_else(|| config.paths.download_directory.clone());
            let path = write_file(&dir, &format!("{}.{}", id, ext), &data).await?;
            console.success(&format!("Saved {}", path.display()));
            Ok(())
        }
    }
}

async fn list(session: &Session, console: &Console, what: ListKind) -> Result<()> {
    let names = match what {
        ListKind::Books => {
            let books = session.list_books().await?;
            for book in &books {
                let authors: Vec<&str> = book.authors().iter().map(|a| a.name()).collect();
                println!(
                    "{:>6}  {} {}",
                    book.id(),
                    book.name(),
                    console.muted(&authors.join(", "))
                );
            }
            console.info(&format!("{} books", books.len()));
            return Ok(());
        }
        ListKind::Languages => session.languages().await?,
        ListKind::Categories => session.categories().await?,
        ListKind::Series => session.series().await?,
        ListKind::Authors => session.authors().await?,
    };

    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Uploads a book and its extra formats, offering to remove the new book
/// when a format fails.
async fn upload(session: &Session, console: &Console, uri: &str, formats: &[String]) -> Result<()> {
    let book = session
        .upload(uri)
        .await
        .with_context(|| format!("Failed to upload {}", uri))?;
    console.clear_line();
    console.success(&format!("Uploaded \"{}\" as book {}", book.title, book.id()));

    for format_uri in formats {
        console.step(&format!("Adding {}", format_uri));
        if let Err(e) = session.book_upload_format(&book, format_uri).await {
            console.clear_line();
            console.error(&format!("Failed to add {}: {}", format_uri, e));

            if console.confirm(true, &format!("Delete the incomplete book {}?", book.id())) {
                discard_book(session, console, book.id()).await;
            }
            return Err(e).context("Upload incomplete");
        }
        console.clear_line();
        console.success(&format!("Added {}", format_uri));
    }

    Ok(())
}

/// Deletes a half-uploaded book. Failures are reported, not returned, so the
/// caller keeps its own error.
async fn discard_book(session: &Session, console: &Console, id: u64) -> bool {
    match session.delete_book(id).await {
        Ok(()) => {
            console.success(&format!("Deleted book {}", id));
            true
        }
        Err(e) => {
            console.error(&format!("Failed to delete book {}: {}", id, e));
            false
        }
    }
}

fn print_book(console: &Console, book: &Book) {
    console.section(&book.title);

    let field = |name: &str, value: &str| {
        if !value.is_empty() {
            println!("{:>12}  {}", console.muted(name), value);
        }
    };

    field("id", &book.id().to_string());
    field("authors", &book.authors.join(", "));
    if !book.series.is_empty() {
        field("series", &format!("{} #{}", book.series, book.series_index));
    }
    field("rating", &"*".repeat(book.rating.value() as usize));
    field("published", &book.published.map(|d| d.to_string()).unwrap_or_default());
    field("publisher", &book.publisher);
    field("categories", &book.categories.join(", "));
    field("languages", &book.languages.join(", "));

    let formats: Vec<String> = book.formats().map(|f| f.label()).collect();
    field("formats", &formats.join(", "));

    for (kind, value) in book.identifiers.iter() {
        field(kind, value);
    }

    if !book.description.is_empty() {
        println!();
        println!("{}", book.description);
    }
}

async fn write_file(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    // Server-supplied names may carry path components.
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| filename.into());
    let path = dir.join(name);

    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calibre_web_client::config::HttpConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_discard_book_reports_failed_delete() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/book/9"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/"))
            .mount(&server)
            .await;

        let session = Session::new(&server.uri(), &HttpConfig::default()).unwrap();
        let console = Console::with_colors(false);
        assert!(!discard_book(&session, &console, 9).await);
    }

    #[tokio::test]
    async fn test_discard_book_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/book/9"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/delete/9"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(&server.uri(), &HttpConfig::default()).unwrap();
        let console = Console::with_colors(false);
        assert!(discard_book(&session, &console, 9).await);
    }
}
