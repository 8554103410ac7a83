//! In-process backend for tests and demos.
//!
//! All tables live behind one `RwLock`. Reads take the read side. A ledger
//! unit takes the write side for its whole lifetime and mutates a staged copy
//! of the tables, so commit publishes every change at once and rollback (or
//! drop) discards them. Units are therefore fully serialized.

use super::{Backend, DetailRepository, EditableRepository, LedgerUnit, Repository, StoreError};
use crate::model::{
    Editable, InventoryDetail, InventoryRecord, ListFilter, Movement, MovementDetail,
    NewMovement, Product, Resource, StockAlert, Store,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    products: BTreeMap<Uuid, Product>,
    stores: BTreeMap<Uuid, Store>,
    inventory: BTreeMap<Uuid, InventoryRecord>,
    movements: BTreeMap<Uuid, Movement>,
}

impl MemoryState {
    fn product_active(&self, id: Uuid) -> bool {
        self.products.get(&id).is_some_and(|p| p.active)
    }

    fn store_active(&self, id: Uuid) -> bool {
        self.stores.get(&id).is_some_and(|s| s.active)
    }

    fn active_row_mut(&mut self, product_id: Uuid, store_id: Uuid) -> Option<&mut InventoryRecord> {
        self.inventory
            .values_mut()
            .find(|r| r.active && r.product_id == product_id && r.store_id == store_id)
    }

    fn store_name(&self, id: Uuid) -> Option<String> {
        self.stores.get(&id).map(|s| s.name.clone())
    }

    /// `record` with its names, whatever the state of the product and store.
    fn named(&self, record: &InventoryRecord) -> Option<InventoryDetail> {
        Some(InventoryDetail {
            record: record.clone(),
            product_name: self.products.get(&record.product_id)?.name.clone(),
            store_name: self.store_name(record.store_id)?,
        })
    }

    /// Like [`MemoryState::named`], but only while product and store are active.
    fn detail(&self, record: &InventoryRecord) -> Option<InventoryDetail> {
        if self.product_active(record.product_id) && self.store_active(record.store_id) {
            self.named(record)
        } else {
            None
        }
    }

    fn named_movement(&self, movement: &Movement) -> Option<MovementDetail> {
        Some(MovementDetail {
            movement: movement.clone(),
            product_name: self.products.get(&movement.product_id)?.name.clone(),
            source_store_name: self.store_name(movement.source_store_id)?,
            target_store_name: self.store_name(movement.target_store_id)?,
        })
    }

    /// Active rows of `R` passing `filter`, in list order.
    fn visible<R: MemResource>(&self, filter: &ListFilter) -> Vec<R> {
        let mut rows: Vec<R> = R::table(self)
            .values()
            .filter(|r| r.is_active() && r.matches(filter))
            .cloned()
            .collect();
        R::sort(&mut rows);
        rows
    }

    fn visible_by_id<R: MemResource>(&self, id: Uuid) -> Option<&R> {
        R::table(self).get(&id).filter(|r| r.is_active())
    }
}

/// Table access and write rules for one resource type.
pub trait MemResource: Resource {
    fn table(state: &MemoryState) -> &BTreeMap<Uuid, Self>;
    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Uuid, Self>;

    /// Order `list` results the same way the SQL backend does.
    fn sort(rows: &mut [Self]);

    /// Reject `candidate` if it would break a uniqueness rule.
    fn check_unique(_state: &MemoryState, _candidate: &Self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Reject a new row whose references are missing or inactive.
    fn check_references(_state: &MemoryState, _candidate: &Self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl MemResource for Product {
    fn table(state: &MemoryState) -> &BTreeMap<Uuid, Self> {
        &state.products
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Uuid, Self> {
        &mut state.products
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
    }

    fn check_unique(state: &MemoryState, candidate: &Self) -> Result<(), StoreError> {
        let taken = state
            .products
            .values()
            .any(|p| p.id != candidate.id && p.sku == candidate.sku);
        if taken {
            return Err(StoreError::Duplicate(format!(
                "sku '{}' already exists",
                candidate.sku
            )));
        }
        Ok(())
    }
}

impl MemResource for Store {
    fn table(state: &MemoryState) -> &BTreeMap<Uuid, Self> {
        &state.stores
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Uuid, Self> {
        &mut state.stores
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

impl MemResource for InventoryRecord {
    fn table(state: &MemoryState) -> &BTreeMap<Uuid, Self> {
        &state.inventory
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Uuid, Self> {
        &mut state.inventory
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by_key(|r| r.created_at);
    }

    fn check_unique(state: &MemoryState, candidate: &Self) -> Result<(), StoreError> {
        if !candidate.active {
            return Ok(());
        }
        let taken = state.inventory.values().any(|r| {
            r.id != candidate.id
                && r.active
                && r.product_id == candidate.product_id
                && r.store_id == candidate.store_id
        });
        if taken {
            return Err(StoreError::Duplicate(format!(
                "product {} already has an active inventory record at store {}",
                candidate.product_id, candidate.store_id
            )));
        }
        Ok(())
    }

    fn check_references(state: &MemoryState, candidate: &Self) -> Result<(), StoreError> {
        if !state.product_active(candidate.product_id) {
            return Err(StoreError::MissingReference(format!(
                "product {} not found",
                candidate.product_id
            )));
        }
        if !state.store_active(candidate.store_id) {
            return Err(StoreError::MissingReference(format!(
                "store {} not found",
                candidate.store_id
            )));
        }
        Ok(())
    }
}

impl MemResource for Movement {
    fn table(state: &MemoryState) -> &BTreeMap<Uuid, Self> {
        &state.movements
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Uuid, Self> {
        &mut state.movements
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

/// In-memory [`Backend`]. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state.write().map_err(poisoned)
    }
}

impl<R: MemResource> Repository<R> for MemoryBackend {
    fn list(&self, filter: &ListFilter) -> Result<Vec<R>, StoreError> {
        Ok(self.read()?.visible(filter))
    }

    fn get(&self, id: Uuid) -> Result<Option<R>, StoreError> {
        Ok(self.read()?.visible_by_id(id).cloned())
    }
}

impl DetailRepository<InventoryDetail> for MemoryBackend {
    fn list_details(&self, filter: &ListFilter) -> Result<Vec<InventoryDetail>, StoreError> {
        let state = self.read()?;
        Ok(state
            .visible::<InventoryRecord>(filter)
            .iter()
            .filter_map(|r| state.named(r))
            .collect())
    }

    fn get_detail(&self, id: Uuid) -> Result<Option<InventoryDetail>, StoreError> {
        let state = self.read()?;
        Ok(state
            .visible_by_id::<InventoryRecord>(id)
            .and_then(|r| state.named(r)))
    }
}

impl DetailRepository<MovementDetail> for MemoryBackend {
    fn list_details(&self, filter: &ListFilter) -> Result<Vec<MovementDetail>, StoreError> {
        let state = self.read()?;
        Ok(state
            .visible::<Movement>(filter)
            .iter()
            .filter_map(|m| state.named_movement(m))
            .collect())
    }

    fn get_detail(&self, id: Uuid) -> Result<Option<MovementDetail>, StoreError> {
        let state = self.read()?;
        Ok(state
            .visible_by_id::<Movement>(id)
            .and_then(|m| state.named_movement(m)))
    }
}

impl<R: MemResource + Editable> EditableRepository<R> for MemoryBackend {
    fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        let mut state = self.write()?;
        let row = R::from_draft(Uuid::new_v4(), draft, Utc::now());
        R::check_references(&state, &row)?;
        R::check_unique(&state, &row)?;
        R::table_mut(&mut state).insert(row.id(), row.clone());
        Ok(row)
    }

    fn update(&self, id: Uuid, changes: R::Changes) -> Result<Option<R>, StoreError> {
        let mut state = self.write()?;
        let Some(mut row) = R::table(&state).get(&id).filter(|r| r.is_active()).cloned() else {
            return Ok(None);
        };
        row.apply(changes, Utc::now());
        R::check_unique(&state, &row)?;
        R::table_mut(&mut state).insert(id, row.clone());
        Ok(Some(row))
    }

    fn set_active(&self, id: Uuid, active: bool) -> Result<Option<R>, StoreError> {
        let mut state = self.write()?;
        let Some(mut row) = R::table(&state).get(&id).cloned() else {
            return Ok(None);
        };
        row.set_active(active, Utc::now());
        R::check_unique(&state, &row)?;
        R::table_mut(&mut state).insert(id, row.clone());
        Ok(Some(row))
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        match R::table_mut(&mut state).get_mut(&id) {
            Some(row) if row.is_active() => {
                row.set_active(false, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Ledger unit over a staged copy of the tables.
pub struct MemoryUnit<'a> {
    guard: RwLockWriteGuard<'a, MemoryState>,
    staged: MemoryState,
    now: DateTime<Utc>,
}

impl LedgerUnit for MemoryUnit<'_> {
    fn product_is_active(&mut self, product_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.product_active(product_id))
    }

    fn store_is_active(&mut self, store_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.store_active(store_id))
    }

    fn lock_stock(
        &mut self,
        product_id: Uuid,
        store_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, i32)>, StoreError> {
        let mut rows: Vec<(Uuid, i32)> = self
            .staged
            .inventory
            .values()
            .filter(|r| r.active && r.product_id == product_id && store_ids.contains(&r.store_id))
            .map(|r| (r.store_id, r.quantity))
            .collect();
        rows.sort();
        Ok(rows)
    }

    fn debit(
        &mut self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        let now = self.now;
        match self.staged.active_row_mut(product_id, store_id) {
            Some(row) if row.quantity >= quantity => {
                row.quantity -= quantity;
                row.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn credit(
        &mut self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
        min_stock: i32,
    ) -> Result<(), StoreError> {
        let now = self.now;
        if let Some(row) = self.staged.active_row_mut(product_id, store_id) {
            row.quantity = row.quantity.checked_add(quantity).ok_or_else(|| {
                StoreError::Rejected(format!(
                    "quantity of product {product_id} at store {store_id} would overflow"
                ))
            })?;
            row.updated_at = now;
            return Ok(());
        }

        let id = Uuid::new_v4();
        self.staged.inventory.insert(
            id,
            InventoryRecord {
                id,
                product_id,
                store_id,
                quantity,
                min_stock,
                active: true,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn append_movement(&mut self, movement: &NewMovement) -> Result<Movement, StoreError> {
        let row = Movement::from_new(Uuid::new_v4(), movement, self.now);
        self.staged.movements.insert(row.id, row.clone());
        Ok(row)
    }

    fn commit(self) -> Result<(), StoreError> {
        let MemoryUnit {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Backend for MemoryBackend {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&self) -> Result<MemoryUnit<'_>, StoreError> {
        let guard = self.write()?;
        let staged = guard.clone();
        Ok(MemoryUnit {
            guard,
            staged,
            now: Utc::now(),
        })
    }

    fn store_inventory(&self, store_id: Uuid) -> Result<Vec<InventoryDetail>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<InventoryDetail> = state
            .inventory
            .values()
            .filter(|r| r.active && r.store_id == store_id)
            .filter_map(|r| state.detail(r))
            .collect();
        rows.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        Ok(rows)
    }

    fn stock_alerts(&self) -> Result<Vec<StockAlert>, StoreError> {
        let state = self.read()?;
        let mut alerts: Vec<StockAlert> = state
            .inventory
            .values()
            .filter(|r| r.active && r.quantity <= r.min_stock)
            .filter_map(|r| state.detail(r))
            .map(|d| StockAlert {
                product_id: d.record.product_id,
                store_id: d.record.store_id,
                product_name: d.product_name,
                store_name: d.store_name,
                current_quantity: d.record.quantity,
                min_stock: d.record.min_stock,
            })
            .collect();
        alerts.sort_by(|a, b| {
            (a.current_quantity, &a.product_name, &a.store_name).cmp(&(
                b.current_quantity,
                &b.product_name,
                &b.store_name,
            ))
        });
        Ok(alerts)
    }

    fn health(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}
