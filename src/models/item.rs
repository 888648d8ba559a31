use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const NAME_MAX_LEN: usize = 255;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemList {
    pub items: Vec<Item>,
    pub total: i64,
}

/// A field of a patch body: absent, explicitly `null`, or carrying a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Missing,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }
}

// Only called when the key is present; `#[serde(default)]` covers the absent case.
impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateItem {
    pub fn validate(&self) -> AppResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItem {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,
}

impl UpdateItem {
    pub fn validate(&self) -> AppResult<()> {
        match &self.name {
            Patch::Value(name) => validate_name(name),
            Patch::Null => Err(AppError::Validation("name must not be null".to_string())),
            Patch::Missing => Ok(()),
        }
    }

    /// Keeps only the fields present in the request body.
    pub fn into_changes(self) -> ItemChanges {
        ItemChanges {
            name: match self.name {
                Patch::Value(name) => Some(name),
                Patch::Null | Patch::Missing => None,
            },
            description: match self.description {
                Patch::Value(description) => Some(Some(description)),
                Patch::Null => Some(None),
                Patch::Missing => None,
            },
        }
    }
}

/// Sparse set of column overwrites for an existing item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

#[cfg(test)]
impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    pub fn apply_to(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub skip: i64,
    pub limit: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListParams {
    pub fn validate(&self) -> AppResult<()> {
        if self.skip < 0 {
            return Err(AppError::Validation(
                "skip must be greater than or equal to 0".to_string(),
            ));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(())
}
