use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Lot category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotCategory {
    Games,
    Movies,
}

impl LotCategory {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            LotCategory::Games => "games",
            LotCategory::Movies => "movies",
        }
    }
}

impl FromStr for LotCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "games" => Ok(LotCategory::Games),
            "movies" => Ok(LotCategory::Movies),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

/// A prize item from the lot library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub title: String,
    pub image_url: Option<String>,
    pub category: LotCategory,
    pub description: Option<String>,
    /// Accumulated donations, never negative
    pub sum: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a library lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLot {
    pub title: String,
    pub category: LotCategory,
    pub image_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub sum: i64,
}

impl NewLot {
    pub fn new(title: impl Into<String>, category: LotCategory) -> Self {
        Self {
            title: title.into(),
            category,
            image_url: None,
            description: None,
            sum: 0,
        }
    }

    pub fn with_sum(mut self, sum: i64) -> Self {
        self.sum = sum;
        self
    }

    /// Validate the lot fields, returning a readable message on failure
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title is required".to_string());
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(format!("Title must be at most {} characters", MAX_TITLE_LENGTH));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(format!(
                    "Description must be at most {} characters",
                    MAX_DESCRIPTION_LENGTH
                ));
            }
        }
        if let Some(url) = &self.image_url {
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Invalid image URL: {}", url));
            }
        }
        if self.sum < 0 {
            return Err("Sum cannot be negative".to_string());
        }
        Ok(())
    }

    /// Build the library record
    pub fn into_lot(self, now: DateTime<Utc>) -> Lot {
        Lot {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            image_url: self.image_url.filter(|url| !url.is_empty()),
            category: self.category,
            description: self.description,
            sum: self.sum,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        assert_eq!("games".parse::<LotCategory>(), Ok(LotCategory::Games));
        assert_eq!("MOVIES".parse::<LotCategory>(), Ok(LotCategory::Movies));
        assert!("books".parse::<LotCategory>().is_err());
    }

    #[test]
    fn test_new_lot_validation() {
        assert!(NewLot::new("Half-Life", LotCategory::Games).validate().is_ok());
        assert!(NewLot::new("   ", LotCategory::Games).validate().is_err());
        assert!(NewLot::new("x".repeat(256), LotCategory::Movies).validate().is_err());
        assert!(NewLot::new("Alien", LotCategory::Movies)
            .with_sum(-1)
            .validate()
            .is_err());

        let mut lot = NewLot::new("Alien", LotCategory::Movies);
        lot.image_url = Some("ftp://example.com/a.png".to_string());
        assert!(lot.validate().is_err());
    }

    #[test]
    fn test_empty_image_url_is_dropped() {
        let mut lot = NewLot::new(" Portal ", LotCategory::Games);
        lot.image_url = Some(String::new());
        let lot = lot.into_lot(Utc::now());
        assert_eq!(lot.title, "Portal");
        assert!(lot.image_url.is_none());
    }
}
