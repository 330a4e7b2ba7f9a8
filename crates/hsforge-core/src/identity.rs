//! Library-part identity.

use std::fmt;

use uuid::Uuid;

/// The stable identity token of a library part (its `MainGUID`).
///
/// Generated once when a project is created and carried unchanged through
/// every save, load and generation round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guid(String);

impl Guid {
    /// Generate a fresh random GUID in the upper-case form ArchiCAD writes.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().to_uppercase())
    }

    /// Parse a GUID, normalising it to upper case.
    ///
    /// Returns `None` when `raw` is not a valid UUID.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim())
            .ok()
            .map(|uuid| Self(uuid.to_string().to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_upper_case_uuid() {
        let guid = Guid::generate();
        assert_eq!(guid.as_str(), guid.as_str().to_uppercase());
        assert!(Guid::parse(guid.as_str()).is_some());
    }

    #[test]
    fn test_parse_normalises_case() {
        let guid = Guid::parse("f938e33a-329d-4a36-be3e-85e126820996").unwrap();
        assert_eq!(guid.as_str(), "F938E33A-329D-4A36-BE3E-85E126820996");
        assert!(Guid::parse("not-a-guid").is_none());
    }
}
