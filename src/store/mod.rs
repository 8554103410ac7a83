//! Storage backends.
//!
//! A [`Backend`] serves the generic resource repositories, the read-only
//! inventory views, and hands out [`LedgerUnit`]s: one atomic unit of ledger
//! work whose mutations become visible together on `commit` or not at all.
//!
//! Two implementations exist: [`PgBackend`] over PostgreSQL and
//! [`MemoryBackend`] for tests and demos.

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

use crate::executor::DbError;
use crate::model::{
    Editable, InventoryDetail, InventoryRecord, ListFilter, Movement, MovementDetail,
    NewMovement, Product, Resource, StockAlert, Store,
};
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// A uniqueness rule would be broken.
    Duplicate(String),
    /// A referenced product or store is absent or inactive.
    MissingReference(String),
    /// The write was refused by a data rule, e.g. a counter overflow.
    Rejected(String),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "{e}"),
            StoreError::Duplicate(s) => write!(f, "Duplicate: {s}"),
            StoreError::MissingReference(s) => write!(f, "Missing reference: {s}"),
            StoreError::Rejected(s) => write!(f, "Rejected: {s}"),
            StoreError::Unavailable(s) => write!(f, "Store unavailable: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Db(err)
    }
}

/// Read access to one resource type. Only active rows are visible.
pub trait Repository<R: Resource> {
    fn list(&self, filter: &ListFilter) -> Result<Vec<R>, StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<R>, StoreError>;
}

/// Read access to rows joined with the names of the products and stores they
/// reference. `D` is the joined view, e.g. [`InventoryDetail`]. Visibility
/// and filtering follow the underlying [`Repository`]; names are shown even
/// when the referenced product or store has since been deactivated.
pub trait DetailRepository<D> {
    fn list_details(&self, filter: &ListFilter) -> Result<Vec<D>, StoreError>;

    fn get_detail(&self, id: Uuid) -> Result<Option<D>, StoreError>;
}

/// Write access to one resource type.
///
/// `update` and `delete` touch active rows only. `set_active` reaches
/// soft-deleted rows too, so it can restore them. `None`/`false` means no
/// row was affected.
pub trait EditableRepository<R: Editable>: Repository<R> {
    fn create(&self, draft: R::Draft) -> Result<R, StoreError>;

    fn update(&self, id: Uuid, changes: R::Changes) -> Result<Option<R>, StoreError>;

    fn set_active(&self, id: Uuid, active: bool) -> Result<Option<R>, StoreError>;

    /// Soft delete.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// One atomic unit of ledger work.
///
/// Dropping a unit without calling [`LedgerUnit::commit`] discards every
/// mutation made through it.
pub trait LedgerUnit {
    /// Whether the product exists and is active. Holds it against concurrent
    /// deactivation until the unit ends.
    fn product_is_active(&mut self, product_id: Uuid) -> Result<bool, StoreError>;

    fn store_is_active(&mut self, store_id: Uuid) -> Result<bool, StoreError>;

    /// Lock the active inventory rows of `product_id` at `store_ids` for the
    /// rest of the unit and return `(store_id, quantity)` for those that
    /// exist. Rows are locked in store-id order.
    fn lock_stock(
        &mut self,
        product_id: Uuid,
        store_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, i32)>, StoreError>;

    /// Subtract `quantity` from the active row. Returns `false`, changing
    /// nothing, if the row is missing or holds less than `quantity`.
    fn debit(&mut self, product_id: Uuid, store_id: Uuid, quantity: i32)
        -> Result<bool, StoreError>;

    /// Add `quantity` to the active row, creating it with `min_stock` if absent.
    fn credit(
        &mut self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
        min_stock: i32,
    ) -> Result<(), StoreError>;

    fn append_movement(&mut self, movement: &NewMovement) -> Result<Movement, StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}

/// Everything the HTTP layer and the ledger need from storage.
pub trait Backend:
    EditableRepository<Product>
    + EditableRepository<Store>
    + EditableRepository<InventoryRecord>
    + Repository<Movement>
    + DetailRepository<InventoryDetail>
    + DetailRepository<MovementDetail>
    + Send
    + Sync
    + 'static
{
    type Unit<'a>: LedgerUnit
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Unit<'_>, StoreError>;

    /// Active inventory of one store with product and store names, ordered by
    /// product name. An unknown store yields an empty list.
    fn store_inventory(&self, store_id: Uuid) -> Result<Vec<InventoryDetail>, StoreError>;

    /// Active rows with `quantity <= min_stock`, lowest quantity first.
    fn stock_alerts(&self) -> Result<Vec<StockAlert>, StoreError>;

    fn health(&self) -> Result<(), StoreError>;
}
