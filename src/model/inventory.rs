use super::{require_non_negative, Editable, ListFilter, Resource};
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quantity of one product held at one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub store_id: Uuid,
    pub quantity: i32,
    pub min_stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDraft {
    pub product_id: Uuid,
    pub store_id: Uuid,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub min_stock: i32,
}

/// `PUT /inventory/{id}` only touches the counters; the (product, store)
/// pair of a row is fixed at creation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChanges {
    pub quantity: i32,
    pub min_stock: i32,
}

impl InventoryDraft {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for a negative quantity or minimum.
    pub fn validate(&self) -> Result<(), ApiError> {
        require_non_negative("quantity", self.quantity)?;
        require_non_negative("minStock", self.min_stock)
    }
}

impl InventoryChanges {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for a negative quantity or minimum.
    pub fn validate(&self) -> Result<(), ApiError> {
        require_non_negative("quantity", self.quantity)?;
        require_non_negative("minStock", self.min_stock)
    }
}

impl Resource for InventoryRecord {
    const NAME: &'static str = "inventory record";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        filter.product_id.map_or(true, |id| self.product_id == id)
            && filter.store_id.map_or(true, |id| self.store_id == id)
    }
}

impl Editable for InventoryRecord {
    type Draft = InventoryDraft;
    type Changes = InventoryChanges;

    fn validate_draft(draft: &InventoryDraft) -> Result<(), ApiError> {
        draft.validate()
    }

    fn validate_changes(changes: &InventoryChanges) -> Result<(), ApiError> {
        changes.validate()
    }

    fn from_draft(id: Uuid, draft: InventoryDraft, now: DateTime<Utc>) -> Self {
        InventoryRecord {
            id,
            product_id: draft.product_id,
            store_id: draft.store_id,
            quantity: draft.quantity,
            min_stock: draft.min_stock,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, changes: InventoryChanges, now: DateTime<Utc>) {
        self.quantity = changes.quantity;
        self.min_stock = changes.min_stock;
        self.updated_at = now;
    }

    fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.active = active;
        self.updated_at = now;
    }
}

/// An inventory row joined with the names of its product and store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDetail {
    #[serde(flatten)]
    pub record: InventoryRecord,
    pub product_name: String,
    pub store_name: String,
}

/// A row at or below its minimum-stock threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub product_id: Uuid,
    pub store_id: Uuid,
    pub product_name: String,
    pub store_name: String,
    pub current_quantity: i32,
    pub min_stock: i32,
}
