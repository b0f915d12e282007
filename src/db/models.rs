use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishImage {
    pub id: String,
    pub wish_id: String,
    pub url: String,
    pub width: i64,
    pub height: i64,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wish {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub is_fulfilled: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<WishImage>,
    pub categories: Vec<Category>,
    /// Viewer-relative: the viewer has this wish in their bookmarks.
    pub is_bookmarked: bool,
    /// Viewer-relative: id of the viewer's own copy of this wish, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copied_wish_id: Option<String>,
}

impl Wish {
    /// A fresh wish row with no images, categories or viewer flags.
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: None,
            url: None,
            price: None,
            currency: None,
            notes: None,
            is_fulfilled: false,
            published_at: None,
            source_id: None,
            created_at: now,
            updated_at: now,
            images: Vec::new(),
            categories: Vec::new(),
            is_bookmarked: false,
            copied_wish_id: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn is_copy(&self) -> bool {
        self.source_id.is_some()
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.id.clone()).collect()
    }
}

/// Public profile shown in saver lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortUserProfile {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub followers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaversPage {
    pub users: Vec<ShortUserProfile>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteSuggestion {
    pub text: String,
    pub count: i64,
}
