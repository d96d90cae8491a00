//! Destination phone canonicalization.

/// Country calling code used when none is configured.
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Canonicalizes raw phone input to the digit string the provider expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl PhoneNormalizer {
    /// Non-digit characters in `country_code` (such as a leading `+`) are
    /// dropped.
    #[must_use]
    pub fn new(country_code: impl AsRef<str>) -> Self {
        let country_code: String = country_code
            .as_ref()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if country_code.is_empty() {
            return Self::default();
        }
        Self { country_code }
    }

    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Strip formatting and prepend the country code to national numbers.
    ///
    /// Total: never fails. Input that matches neither the national nor the
    /// international shape comes back as its bare digits.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        normalize_phone(raw, &self.country_code)
    }

    /// Whether the normalized number has an international length.
    ///
    /// Only a hint for logs; sends are never rejected on this.
    #[must_use]
    pub fn is_plausible(&self, raw: &str) -> bool {
        matches!(self.normalize(raw).len(), 12 | 13)
    }
}

/// See [`PhoneNormalizer::normalize`].
#[must_use]
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let has_code = digits.starts_with(country_code);
    match digits.len() {
        10 | 11 if !has_code => format!("{country_code}{digits}"),
        _ => digits,
    }
}
