use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ThemeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ThemeError {
    #[error("theme name cannot be empty")]
    EmptyName,

    #[error("theme color must be #RRGGBB, got {0:?}")]
    InvalidColor(String),
}

/// Validated theme name (trimmed, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThemeName(String);

impl ThemeName {
    /// # Errors
    ///
    /// Returns `ThemeError::EmptyName` if the name is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, ThemeError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ThemeError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ThemeName {
    type Error = ThemeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ThemeName> for String {
    fn from(value: ThemeName) -> Self {
        value.0
    }
}

impl std::fmt::Display for ThemeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display color of a theme chip, normalized to lowercase `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThemeColor(String);

impl ThemeColor {
    /// # Errors
    ///
    /// Returns `ThemeError::InvalidColor` unless the value is `#` followed by six hex digits.
    pub fn new(value: impl Into<String>) -> Result<Self, ThemeError> {
        let raw = value.into();
        let trimmed = raw.trim();
        let valid = trimmed.len() == 7
            && trimmed.starts_with('#')
            && trimmed[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ThemeError::InvalidColor(raw));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThemeColor {
    fn default() -> Self {
        Self("#6366f1".to_string())
    }
}

impl TryFrom<String> for ThemeColor {
    type Error = ThemeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ThemeColor> for String {
    fn from(value: ThemeColor) -> Self {
        value.0
    }
}

/// A named label attached to quotes and, through them, to cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    id: ThemeId,
    name: ThemeName,
    color: ThemeColor,
}

impl Theme {
    #[must_use]
    pub fn new(id: ThemeId, name: ThemeName, color: ThemeColor) -> Self {
        Self { id, name, color }
    }

    #[must_use]
    pub fn id(&self) -> ThemeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &ThemeName {
        &self.name
    }

    #[must_use]
    pub fn color(&self) -> &ThemeColor {
        &self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed_and_required() {
        assert_eq!(ThemeName::new("  Power ").unwrap().as_str(), "Power");
        assert_eq!(ThemeName::new("   ").unwrap_err(), ThemeError::EmptyName);
    }

    #[test]
    fn color_is_normalized() {
        assert_eq!(ThemeColor::new("#A1B2C3").unwrap().as_str(), "#a1b2c3");
        assert!(matches!(
            ThemeColor::new("red"),
            Err(ThemeError::InvalidColor(_))
        ));
        assert!(ThemeColor::new("#12345g").is_err());
    }
}
