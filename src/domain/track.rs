use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::CatalogError, storage::db::SecondsSinceUnix};

/// Longest description accepted for a track, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Surrogate identifier assigned by the repository on first save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(TrackId)
            .map_err(|_| CatalogError::validation(format!("invalid track id '{s}'")))
    }
}

/// Closed set of music categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pop,
    Rock,
    Rap,
    Jazz,
    Classical,
    Electronic,
    Reggae,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Pop,
        Category::Rock,
        Category::Rap,
        Category::Jazz,
        Category::Classical,
        Category::Electronic,
        Category::Reggae,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pop => "pop",
            Category::Rock => "rock",
            Category::Rap => "rap",
            Category::Jazz => "jazz",
            Category::Classical => "classical",
            Category::Electronic => "electronic",
            Category::Reggae => "reggae",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match against the lowercase names.
impl FromStr for Category {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CatalogError::validation(format!("unknown category '{s}'")))
    }
}

/// Reference to a stored audio blob. Url and size only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub url: String,
    pub size: u64,
}

/// Represents a persisted track row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// `None` until the repository saves the track for the first time
    pub id: Option<TrackId>,
    pub title: String,
    pub artist: String,
    pub description: Option<String>,
    pub category: Category,
    /// seconds
    pub duration: u32,
    pub file: Option<StoredFile>,
    pub cover_image: Option<String>,
    pub created_at: SecondsSinceUnix,
    pub updated_at: SecondsSinceUnix,
}

impl Track {
    #[cfg(test)]
    pub fn new(title: impl Into<String>, artist: impl Into<String>, category: Category) -> Self {
        Self {
            id: None,
            title: title.into(),
            artist: artist.into(),
            description: None,
            category,
            duration: 0,
            file: None,
            cover_image: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Flat projection of [`Track`] exchanged with callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDto {
    pub id: Option<TrackId>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub duration: Option<u32>,
    pub category: Option<Category>,
    pub file_size: Option<u64>,
    pub file_url: Option<String>,
    pub cover_image: Option<String>,
}
