use super::{require_non_empty, Editable, ListFilter, Resource};
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub sku: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a client supplies to create or replace a product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub sku: String,
}

impl ProductDraft {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for an empty name or SKU, or a negative price.
    pub fn validate(&self) -> Result<(), ApiError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("sku", &self.sku)?;
        if self.price < Decimal::ZERO {
            return Err(ApiError::Validation(format!(
                "price must not be negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

impl Resource for Product {
    const NAME: &'static str = "product";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        filter
            .category
            .as_deref()
            .map_or(true, |category| self.category == category)
    }
}

impl Editable for Product {
    type Draft = ProductDraft;
    type Changes = ProductDraft;

    fn validate_draft(draft: &ProductDraft) -> Result<(), ApiError> {
        draft.validate()
    }

    fn validate_changes(changes: &ProductDraft) -> Result<(), ApiError> {
        changes.validate()
    }

    fn from_draft(id: Uuid, draft: ProductDraft, now: DateTime<Utc>) -> Self {
        Product {
            id,
            name: draft.name,
            description: draft.description,
            category: draft.category,
            price: draft.price,
            sku: draft.sku,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, changes: ProductDraft, now: DateTime<Utc>) {
        self.name = changes.name;
        self.description = changes.description;
        self.category = changes.category;
        self.price = changes.price;
        self.sku = changes.sku;
        self.updated_at = now;
    }

    fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.active = active;
        self.updated_at = now;
    }
}
