//! Mode slugs
//!
//! Provides [`Slug`], the stable identifier of a mode record.

use crate::error::ModelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Stable identifier of a mode record
///
/// Restricted to ASCII letters, digits and hyphens (`^[A-Za-z0-9-]+$`).
/// A slug is immutable once a record has been created; in the split format
/// it is also the file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slug(String);

impl Slug {
    /// Parse and validate a slug
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidSlug`] if the value is empty or contains
    /// characters outside `[A-Za-z0-9-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(ModelError::InvalidSlug(value))
        }
    }

    /// Check a candidate without allocating
    #[inline]
    #[must_use]
    pub fn is_valid(candidate: &str) -> bool {
        !candidate.is_empty()
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    /// Borrow the slug text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned string
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Slug {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Slug {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Slug {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for Slug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slug_accepts_alphanumerics_and_hyphens() {
        for ok in ["architect", "code-reviewer", "A1", "-", "docs-2024"] {
            assert!(Slug::new(ok).is_ok(), "{ok} should be valid");
        }
    }

    #[test]
    fn slug_rejects_other_characters() {
        for bad in ["", "has space", "under_score", "dot.ted", "slash/ed", "émoji"] {
            assert!(
                matches!(Slug::new(bad), Err(ModelError::InvalidSlug(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn slug_display_and_from_str() {
        let slug: Slug = "architect".parse().unwrap();
        assert_eq!(slug.to_string(), "architect");
        assert_eq!(slug.as_str(), "architect");
    }

    #[test]
    fn slug_serde_validates() {
        let ok: Slug = serde_json::from_str("\"reviewer\"").unwrap();
        assert_eq!(ok.as_str(), "reviewer");

        let bad: Result<Slug, _> = serde_json::from_str("\"not valid\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn generated_valid_slugs_parse(s in "[A-Za-z0-9-]{1,40}") {
            prop_assert!(Slug::new(s.clone()).is_ok());
        }

        #[test]
        fn any_invalid_character_is_rejected(
            prefix in "[a-z0-9-]{0,10}",
            bad in "[^A-Za-z0-9-]",
            suffix in "[a-z0-9-]{0,10}",
        ) {
            let candidate = format!("{prefix}{bad}{suffix}");
            prop_assert!(Slug::new(candidate).is_err());
        }
    }
}
