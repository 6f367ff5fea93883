//! Canonical keys for identifier labels scraped from detail pages.
//!
//! The server prints identifier types as localized display text
//! ("ISBN", "Amazon.de", "ЛитРес"). Metadata updates must send them back
//! as the lowercase keys the server stores.

/// Prefix of locale-specific Amazon labels (`amazon.de`, `amazon.co.jp`).
const AMAZON_PREFIX: &str = "amazon.";

/// Lowercased display labels whose key differs from the label itself.
const LABEL_SYNONYMS: &[(&str, &str)] = &[("литрес", "litres")];

/// Maps an identifier label to its canonical key.
pub fn normalize_identifier_type(label: &str) -> String {
    let lower = label.to_lowercase();

    if let Some(locale) = lower.strip_prefix(AMAZON_PREFIX) {
        return format!("amazon_{}", locale);
    }

    LABEL_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lower)
        .map(|(_, key)| key.to_string())
        .unwrap_or(lower)
}
