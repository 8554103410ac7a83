use super::{require_non_empty, Editable, ListFilter, Resource};
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDraft {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}

impl StoreDraft {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for an empty name.
    pub fn validate(&self) -> Result<(), ApiError> {
        require_non_empty("name", &self.name)
    }
}

impl Resource for Store {
    const NAME: &'static str = "store";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn matches(&self, _filter: &ListFilter) -> bool {
        true
    }
}

impl Editable for Store {
    type Draft = StoreDraft;
    type Changes = StoreDraft;

    fn validate_draft(draft: &StoreDraft) -> Result<(), ApiError> {
        draft.validate()
    }

    fn validate_changes(changes: &StoreDraft) -> Result<(), ApiError> {
        changes.validate()
    }

    fn from_draft(id: Uuid, draft: StoreDraft, now: DateTime<Utc>) -> Self {
        Store {
            id,
            name: draft.name,
            address: draft.address,
            phone: draft.phone,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, changes: StoreDraft, now: DateTime<Utc>) {
        self.name = changes.name;
        self.address = changes.address;
        self.phone = changes.phone;
        self.updated_at = now;
    }

    fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.active = active;
        self.updated_at = now;
    }
}
