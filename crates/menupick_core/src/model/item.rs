//! Item domain model.
//!
//! # Responsibility
//! - Define the persisted `Item` record and its JSON shape.
//! - Provide name normalization and case-insensitive matching.
//!
//! # Invariants
//! - `id` is strictly positive.
//! - `name` is trimmed and non-empty once validated.
//! - Timestamps are ISO-8601 strings written by the backend performing the write.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier assigned by the active backend.
pub type ItemId = i64;

/// First id issued by an empty medium.
pub const FIRST_ITEM_ID: ItemId = 1;

/// One persisted dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Optional image reference (usually a local path). Empty when unset.
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Model-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    EmptyName,
    NonPositiveId(ItemId),
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "item name must not be blank"),
            Self::NonPositiveId(id) => write!(f, "item id must be positive, got {id}"),
        }
    }
}

impl Error for ItemValidationError {}

impl Item {
    /// Creates an item stamped with the current time as `created_at`.
    ///
    /// The name is stored as given; callers pass it through
    /// [`normalize_name`] first.
    pub fn new(id: ItemId, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            image: image.into(),
            created_at: Some(now_timestamp()),
            updated_at: None,
        }
    }

    /// Checks the persisted-shape invariants.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.id < FIRST_ITEM_ID {
            return Err(ItemValidationError::NonPositiveId(self.id));
        }
        if self.name.trim().is_empty() {
            return Err(ItemValidationError::EmptyName);
        }
        Ok(())
    }

    /// Replaces the editable fields and stamps `updated_at`.
    pub fn apply_edit(&mut self, name: &str, image: &str) {
        self.name = name.to_string();
        self.image = image.to_string();
        self.updated_at = Some(now_timestamp());
    }

    /// Returns whether this item's name collides with `name`.
    pub fn has_name(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }
}

/// Trims a user-supplied name and rejects blank input.
pub fn normalize_name(name: &str) -> Result<String, ItemValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ItemValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Case-insensitive name equality used by every uniqueness check.
///
/// Comparison is Unicode-aware and ignores surrounding whitespace.
pub fn names_match(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Returns whether any item other than `exclude_id` carries `name`.
pub fn contains_name(items: &[Item], name: &str, exclude_id: Option<ItemId>) -> bool {
    items
        .iter()
        .any(|item| Some(item.id) != exclude_id && item.has_name(name))
}

/// Smallest id strictly greater than every id in `items`.
pub fn next_id_after(items: &[Item]) -> ItemId {
    items
        .iter()
        .map(|item| item.id)
        .max()
        .map_or(FIRST_ITEM_ID, |max| max + 1)
}

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::{contains_name, names_match, next_id_after, normalize_name, Item};

    #[test]
    fn normalize_name_trims_and_rejects_blank() {
        assert_eq!(normalize_name("  Ramen ").unwrap(), "Ramen");
        assert!(normalize_name(" \t ").is_err());
    }

    #[test]
    fn names_match_ignores_case_and_padding() {
        assert!(names_match("Burger", " burger "));
        assert!(names_match("ÉCLAIR", "éclair"));
        assert!(!names_match("Burger", "Burgers"));
    }

    #[test]
    fn contains_name_respects_exclusion() {
        let items = vec![Item::new(1, "Pizza", ""), Item::new(2, "Sushi", "")];
        assert!(contains_name(&items, "PIZZA", None));
        assert!(!contains_name(&items, "pizza", Some(1)));
        assert!(contains_name(&items, "sushi", Some(1)));
    }

    #[test]
    fn next_id_after_uses_max_not_len() {
        assert_eq!(next_id_after(&[]), 1);
        let items = vec![Item::new(7, "a", ""), Item::new(3, "b", "")];
        assert_eq!(next_id_after(&items), 8);
    }

    #[test]
    fn serializes_with_camel_case_and_skips_missing_timestamps() {
        let item = Item {
            id: 4,
            name: "Hot Pot".to_string(),
            image: String::new(),
            created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
            updated_at: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00.000Z");
        assert!(json.get("updatedAt").is_none());

        let parsed: Item = serde_json::from_value(serde_json::json!({"id": 2, "name": "Salad"}))
            .unwrap();
        assert_eq!(parsed.image, "");
        assert_eq!(parsed.created_at, None);
    }

    #[test]
    fn validate_rejects_zero_id_and_blank_name() {
        assert!(Item::new(0, "x", "").validate().is_err());
        assert!(Item::new(1, "  ", "").validate().is_err());
        assert!(Item::new(1, "Steak", "").validate().is_ok());
    }
}
