//! Course records of the primary catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CollectionId, ContentItem, ItemKind, ItemRef};

/// Lesson inside a course, searchable when lessons are included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
}

/// A course as the catalog serves it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Credential tags (CPE, CLE, ...)
    #[serde(default)]
    pub credits: Vec<String>,
    #[serde(default)]
    pub required: bool,
    /// Completion percentage, 0..=100
    #[serde(default)]
    pub progress: u8,
    /// Average rating, 0 when unrated
    #[serde(default)]
    pub rating: f32,
    pub date: DateTime<Utc>,
    /// Denormalized membership list carried by the course itself
    #[serde(default)]
    pub collection_ids: Vec<CollectionId>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    /// Member of any collection; stamped by the engine
    #[serde(default)]
    pub saved: bool,
}

impl Course {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            description: String::new(),
            category: String::new(),
            credits: Vec::new(),
            required: false,
            progress: 0,
            rating: 0.0,
            date: Utc::now(),
            collection_ids: Vec::new(),
            lessons: Vec::new(),
            saved: false,
        }
    }

    pub fn by(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    pub fn in_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_credits(mut self, credits: &[&str]) -> Self {
        self.credits = credits.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn rated(mut self, rating: f32) -> Self {
        self.rating = rating;
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn in_collections(mut self, ids: &[&str]) -> Self {
        self.collection_ids = ids.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_lesson(mut self, id: &str, title: &str) -> Self {
        self.lessons.push(Lesson {
            id: id.to_string(),
            title: title.to_string(),
        });
        self
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(ItemKind::Course, self.id.clone())
    }

    /// Generic item view used when a course shows up in a collection
    pub fn to_content_item(&self) -> ContentItem {
        let mut item = ContentItem::new(ItemKind::Course, self.id.clone(), self.title.clone())
            .created(self.date);
        item.collection_ids = self.collection_ids.clone();
        item
    }
}
