//! Typed catalog records
//!
//! The store is schema-free; these types restore the shape guarantees:
//! - `User`: registered viewer, unique by email
//! - `Content`: shared base record plus a `ContentKind` variant that carries
//!   the series-only season count
//!
//! Stored field names are the catalog's existing keys (see [`fields`]), so
//! documents written by other tools decode unchanged.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CatalogError, Result};

pub mod seed;

/// Stored field names.
pub mod fields {
    pub const ID: &str = "_id";

    pub const USER_NAME: &str = "nombre";
    pub const USER_EMAIL: &str = "email";
    pub const USER_AGE: &str = "edad";
    pub const USER_COUNTRY: &str = "pais";
    pub const USER_HISTORY: &str = "historial";
    pub const USER_REGISTERED_AT: &str = "fechaRegistro";

    pub const TITLE: &str = "titulo";
    pub const TYPE: &str = "tipo";
    pub const GENRES: &str = "genero";
    pub const DURATION: &str = "duracion";
    pub const RELEASE_YEAR: &str = "estreno";
    pub const AVERAGE_RATING: &str = "calificacionPromedio";
    pub const SEASONS: &str = "temporadas";
}

/// Highest rating a title can hold.
pub const MAX_RATING: f64 = 5.0;

/// Reject ratings outside [0, 5] (NaN included).
pub fn validate_rating(rating: f64) -> Result<()> {
    if (0.0..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(CatalogError::Validation(format!(
            "average rating must be within [0, {MAX_RATING}], got {rating}"
        )))
    }
}

/// A registered viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "nombre")]
    pub name: String,

    /// Always stored trimmed and lowercased.
    email: String,

    #[serde(rename = "edad")]
    pub age: u32,

    #[serde(rename = "pais")]
    pub country: String,

    /// Content references, oldest first.
    #[serde(rename = "historial", default)]
    pub watch_history: Vec<ObjectId>,

    #[serde(
        rename = "fechaRegistro",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    registered_at: DateTime<Utc>,
}

impl User {
    /// Create a user registered now.
    ///
    /// The email is trimmed and lowercased before storage so the unique
    /// index on `email` rejects addresses that differ only by case.
    pub fn new(
        name: impl Into<String>,
        email: impl AsRef<str>,
        age: u32,
        country: impl Into<String>,
    ) -> Result<Self> {
        let user = Self {
            id: None,
            name: name.into(),
            email: normalize_email(email.as_ref()),
            age,
            country: country.into(),
            watch_history: Vec::new(),
            registered_at: Utc::now(),
        };
        user.validate()?;
        Ok(user)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn set_email(&mut self, email: impl AsRef<str>) -> Result<()> {
        let previous = std::mem::replace(&mut self.email, normalize_email(email.as_ref()));
        self.validate().inspect_err(|_| self.email = previous)
    }

    /// Registration timestamp, fixed at construction.
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation("user name is empty".to_string()));
        }
        let valid_email = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(CatalogError::Validation(format!(
                "invalid email address '{}'",
                self.email
            )));
        }
        Ok(())
    }

    /// Stored form; the email is normalized again for users decoded from
    /// elsewhere.
    pub fn to_document(&self) -> Result<bson::Document> {
        let mut document = bson::to_document(self)?;
        document.insert(fields::USER_EMAIL, normalize_email(&self.email));
        Ok(document)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Discriminant stored in `tipo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(ContentType::Movie),
            "series" => Ok(ContentType::Series),
            other => Err(CatalogError::Validation(format!(
                "unknown content type '{other}' (expected movie or series)"
            ))),
        }
    }
}

/// Type-specific part of a `Content` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series {
        #[serde(rename = "temporadas")]
        seasons: u32,
    },
}

impl ContentKind {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentKind::Movie => ContentType::Movie,
            ContentKind::Series { .. } => ContentType::Series,
        }
    }

    pub fn seasons(&self) -> Option<u32> {
        match self {
            ContentKind::Movie => None,
            ContentKind::Series { seasons } => Some(*seasons),
        }
    }
}

/// A catalog title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "titulo")]
    pub title: String,

    #[serde(flatten)]
    pub kind: ContentKind,

    #[serde(rename = "genero")]
    pub genres: Vec<String>,

    /// Total runtime for movies, per-episode runtime for series.
    #[serde(rename = "duracion")]
    pub duration_minutes: u32,

    #[serde(rename = "estreno")]
    pub release_year: i32,

    #[serde(rename = "calificacionPromedio")]
    pub average_rating: f64,
}

impl Content {
    pub fn movie(
        title: impl Into<String>,
        genres: &[&str],
        duration_minutes: u32,
        release_year: i32,
        average_rating: f64,
    ) -> Result<Self> {
        Self::build(
            title.into(),
            ContentKind::Movie,
            genres,
            duration_minutes,
            release_year,
            average_rating,
        )
    }

    pub fn series(
        title: impl Into<String>,
        genres: &[&str],
        episode_minutes: u32,
        seasons: u32,
        release_year: i32,
        average_rating: f64,
    ) -> Result<Self> {
        Self::build(
            title.into(),
            ContentKind::Series { seasons },
            genres,
            episode_minutes,
            release_year,
            average_rating,
        )
    }

    fn build(
        title: String,
        kind: ContentKind,
        genres: &[&str],
        duration_minutes: u32,
        release_year: i32,
        average_rating: f64,
    ) -> Result<Self> {
        let content = Self {
            id: None,
            title,
            kind,
            genres: genres.iter().map(|g| g.to_string()).collect(),
            duration_minutes,
            release_year,
            average_rating,
        };
        content.validate()?;
        Ok(content)
    }

    pub fn content_type(&self) -> ContentType {
        self.kind.content_type()
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::Validation("content title is empty".to_string()));
        }
        if self.genres.is_empty() {
            return Err(CatalogError::Validation(format!(
                "'{}' must list at least one genre",
                self.title
            )));
        }
        if self.duration_minutes == 0 {
            return Err(CatalogError::Validation(format!(
                "'{}' must have a positive duration",
                self.title
            )));
        }
        validate_rating(self.average_rating)
    }

    pub fn to_document(&self) -> Result<bson::Document> {
        Ok(bson::to_document(self)?)
    }

    /// Decode a stored title, holding it to the same rules as the
    /// constructors. Any violation is a `Decode` error.
    pub fn from_document(document: bson::Document) -> Result<Self> {
        let is_movie = document
            .get_str(fields::TYPE)
            .is_ok_and(|tipo| tipo == ContentType::Movie.as_str());
        if is_movie && document.contains_key(fields::SEASONS) {
            return Err(CatalogError::Decode(format!(
                "movie document carries '{}'",
                fields::SEASONS
            )));
        }

        let content: Self = bson::from_document(document)?;
        content.validate().map_err(|e| match e {
            CatalogError::Validation(msg) => CatalogError::Decode(msg),
            other => other,
        })?;
        Ok(content)
    }
}

/// One row of the average-rating-by-type aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRating {
    #[serde(rename = "_id")]
    pub content_type: ContentType,

    /// `None` when no title of this type carries a numeric rating.
    #[serde(rename = "averageRating")]
    pub average_rating: Option<f64>,
}

/// One row of the titles-per-genre aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    #[serde(rename = "_id")]
    pub genre: String,

    pub total: u64,
}
