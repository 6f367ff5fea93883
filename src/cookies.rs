//! Seeding a session's cookie jar from a Netscape cookie file.
//!
//! Browser extensions export cookies in this format, which lets a session
//! reuse an existing web login instead of posting credentials.

use reqwest::Url;
use reqwest::cookie::Jar;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur while loading cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read the cookie file.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),

    /// Cookie domain could not be converted into a URL.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

/// One line of a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetscapeCookie {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

impl FromStr for NetscapeCookie {
    type Err = CookieError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (http_only, rest) = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => (true, stripped),
            None => (false, line),
        };

        let fields: Vec<&str> = rest.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        Ok(Self {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix: expires.parse::<u64>().ok().filter(|ts| *ts != 0),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        })
    }
}

impl NetscapeCookie {
    fn is_expired(&self, now_unix: u64) -> bool {
        self.expires_unix.is_some_and(|expires| expires <= now_unix)
    }

    /// URL the cookie is stored against: https for secure cookies, http otherwise.
    fn origin(&self) -> Result<Url, CookieError> {
        let host = self.domain.trim_start_matches('.');
        if host.is_empty() {
            return Err(CookieError::InvalidDomain(self.domain.clone()));
        }

        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}/", scheme, host))
            .map_err(|_| CookieError::InvalidDomain(self.domain.clone()))
    }

    fn set_cookie_header(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            header.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

fn parse_cookie_lines(content: &str) -> Result<Vec<NetscapeCookie>, CookieError> {
    content
        .lines()
        .map(|line| line.trim_start().trim_end_matches(['\r', '\n']))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| line.starts_with("#HttpOnly_") || !line.starts_with('#'))
        .map(NetscapeCookie::from_str)
        .collect()
}

/// Reads a cookie file into a new jar, skipping cookies that already expired.
pub fn load_cookie_file(path: &Path) -> Result<Arc<Jar>, CookieError> {
    let content = std::fs::read_to_string(path)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let jar = Arc::new(Jar::default());
    for cookie in parse_cookie_lines(&content)? {
        if cookie.is_expired(now) {
            continue;
        }
        jar.add_cookie_str(&cookie.set_cookie_header(), &cookie.origin()?);
    }

    Ok(jar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use tempfile::TempDir;

    const EXPORT: &str = "
# Netscape HTTP Cookie File
library.example.org\tFALSE\t/\tFALSE\t0\tsession\tabc123
#HttpOnly_.library.example.org\tTRUE\t/\tTRUE\t4102444800\tremember_token\tadmin|f00d
library.example.org\tFALSE\t/\tFALSE\t1000\tstale\tgone
";

    #[test]
    fn test_parse_lines() {
        let cookies = parse_cookie_lines(EXPORT).unwrap();
        assert_eq!(cookies.len(), 3);

        assert_eq!(cookies[0].name, "session");
        assert_eq!(cookies[0].expires_unix, None);
        assert!(!cookies[0].secure);
        assert!(!cookies[0].http_only);

        assert_eq!(cookies[1].domain, ".library.example.org");
        assert!(cookies[1].include_subdomains);
        assert!(cookies[1].http_only);
        assert_eq!(cookies[1].value, "admin|f00d");
        assert_eq!(
            cookies[1].origin().unwrap().as_str(),
            "https://library.example.org/"
        );
    }

    #[test]
    fn test_expiry() {
        let cookies = parse_cookie_lines(EXPORT).unwrap();
        assert!(!cookies[0].is_expired(2_000_000_000));
        assert!(cookies[2].is_expired(2_000_000_000));
    }

    #[test]
    fn test_empty_value_keeps_trailing_tab() {
        let cookies =
            parse_cookie_lines("library.example.org\tFALSE\t/\tFALSE\t0\tflag\t\r\n").unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "flag");
        assert_eq!(cookies[0].value, "");
        assert_eq!(cookies[0].set_cookie_header(), "flag=; Path=/");
    }

    #[test]
    fn test_invalid_line() {
        let err = parse_cookie_lines("library.example.org\tFALSE\t/").unwrap_err();
        assert!(err.to_string().contains("Invalid Netscape cookie line"));
    }

    #[test]
    fn test_load_cookie_file_fills_jar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, EXPORT).unwrap();

        let jar = load_cookie_file(&path).unwrap();
        let url = Url::parse("http://library.example.org/book/1").unwrap();
        let header = jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();

        assert!(header.contains("session=abc123"));
        assert!(!header.contains("stale"));
        // Secure cookie is not sent over plain http.
        assert!(!header.contains("remember_token"));
    }
}
