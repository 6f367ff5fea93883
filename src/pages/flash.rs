//! Flash banners embedded in pages returned after a form submission.
//!
//! The server answers most form posts with HTTP 200 and reports the
//! outcome in a banner, so a write is only known to have succeeded once the
//! response page has been checked for an alert.

use super::element_text;
use crate::error::ClientError;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::warn;

static ALERT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#flash_alert").unwrap());
static WARNING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#flash_warning").unwrap());
static SUCCESS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#flash_success").unwrap());

/// Banner texts found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashMessages {
    pub alert: Option<String>,
    pub warning: Option<String>,
    pub success: Option<String>,
}

impl FlashMessages {
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let find = |selector: &Selector| doc.select(selector).next().map(element_text);

        Self {
            alert: find(&ALERT),
            warning: find(&WARNING),
            success: find(&SUCCESS),
        }
    }

    /// Turns an alert into an error built by `on_alert`; logs a warning banner.
    pub fn into_result<F>(self, on_alert: F) -> Result<(), ClientError>
    where
        F: FnOnce(String) -> ClientError,
    {
        if let Some(alert) = self.alert {
            return Err(on_alert(alert));
        }

        if let Some(warning) = self.warning {
            warn!(%warning, "Server returned a warning banner");
        }

        Ok(())
    }
}
