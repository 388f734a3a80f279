//! Advisory field validation for new bookmarks.
//!
//! The store accepts whatever it is given; these checks only gate what the
//! synchronizer sends.

use std::fmt;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    TitleRequired,
    UrlRequired,
    UrlMalformed,
}

impl FieldError {
    pub fn message(&self) -> &'static str {
        match self {
            FieldError::TitleRequired => "Title is required",
            FieldError::UrlRequired => "URL is required",
            FieldError::UrlMalformed => "Please enter a valid URL (e.g., https://example.com)",
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Per-field outcome of [`validate`]. Both fields are always checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub title: Option<FieldError>,
    pub url: Option<FieldError>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }
}

pub fn validate_title(title: &str) -> Result<(), FieldError> {
    if title.trim().is_empty() {
        return Err(FieldError::TitleRequired);
    }
    Ok(())
}

/// A url must be non-empty and parse as an absolute URL.
pub fn validate_url(url: &str) -> Result<(), FieldError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FieldError::UrlRequired);
    }
    Url::parse(url).map(|_| ()).map_err(|_| FieldError::UrlMalformed)
}

pub fn validate(title: &str, url: &str) -> Result<(), ValidationErrors> {
    let errors = ValidationErrors {
        title: validate_title(title).err(),
        url: validate_url(url).err(),
    };
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_is_required() {
        assert_eq!(validate_title("   "), Err(FieldError::TitleRequired));
        assert_eq!(validate_title(" Rust "), Ok(()));
    }

    #[test]
    fn url_must_be_absolute() {
        assert_eq!(validate_url(""), Err(FieldError::UrlRequired));
        assert_eq!(validate_url("not-a-url"), Err(FieldError::UrlMalformed));
        assert_eq!(validate_url("/relative/path"), Err(FieldError::UrlMalformed));
        assert_eq!(validate_url("  https://example.com  "), Ok(()));
        assert_eq!(validate_url("mailto:someone@example.com"), Ok(()));
    }

    #[test]
    fn both_fields_are_reported_together() {
        let errors = validate("", "nope").unwrap_err();
        assert_eq!(errors.title, Some(FieldError::TitleRequired));
        assert_eq!(errors.url, Some(FieldError::UrlMalformed));
    }

    #[test]
    fn messages_match_form_copy() {
        assert_eq!(FieldError::UrlRequired.to_string(), "URL is required");
        assert_eq!(
            FieldError::UrlMalformed.message(),
            "Please enter a valid URL (e.g., https://example.com)"
        );
    }
}
