//! PostgreSQL backend.
//!
//! Plain CRUD runs one statement on a pooled connection. A ledger unit owns
//! a pooled connection and an open [`Transaction`] until it commits, rolls
//! back, or is dropped. The transaction rolls back on drop. Only bind
//! parameters carry client input; table and column names are constants.

use super::{Backend, DetailRepository, EditableRepository, LedgerUnit, Repository, StoreError};
use crate::executor::{DbError, PgExecutor, SqlExecutor};
use crate::model::{
    Editable, InventoryChanges, InventoryDetail, InventoryDraft, InventoryRecord, ListFilter,
    Movement, MovementDetail, MovementType, NewMovement, Product, ProductDraft, Resource,
    StockAlert, Store, StoreDraft,
};
use crate::pool::{DbPool, PooledConnection};
use crate::transaction::{IsolationLevel, Transaction};
use may_postgres::types::{FromSql, ToSql};
use may_postgres::Row;
use uuid::Uuid;

fn col<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, DbError> {
    row.try_get(name)
        .map_err(|e| DbError::Parse(format!("column {name}: {e}")))
}

/// WHERE clause under construction, with its bind parameters.
#[derive(Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync>>,
}

impl Conditions {
    /// Add `column = $n`.
    pub fn eq<T: ToSql + Sync + 'static>(&mut self, column: &str, value: T) {
        self.params.push(Box::new(value));
        self.clauses.push(format!("{column} = ${}", self.params.len()));
    }

    /// Add `(a = $n OR b = $n ...)` over one bound value.
    pub fn any_eq<T: ToSql + Sync + 'static>(&mut self, columns: &[&str], value: T) {
        self.params.push(Box::new(value));
        let n = self.params.len();
        let alternatives: Vec<String> = columns.iter().map(|c| format!("{c} = ${n}")).collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    /// Add a clause that binds no parameter.
    pub fn raw(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref() as &dyn ToSql).collect()
    }
}

/// Table mapping for one resource type.
pub trait PgResource: Resource {
    const TABLE: &'static str;
    /// Select list, in the order `from_row` reads it.
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;

    fn from_row(row: &Row) -> Result<Self, DbError>;

    /// Translate the list filter into conditions. Unsupported criteria are
    /// ignored.
    fn filter(_filter: &ListFilter, _conditions: &mut Conditions) {}
}

/// Write statements for an editable resource. Both return `None` when no
/// row was written.
pub trait PgEditable: PgResource + Editable {
    fn insert(exec: &dyn SqlExecutor, id: Uuid, draft: &Self::Draft)
        -> Result<Option<Row>, DbError>;

    fn update(
        exec: &dyn SqlExecutor,
        id: Uuid,
        changes: &Self::Changes,
    ) -> Result<Option<Row>, DbError>;
}

fn list_sql<R: PgResource>(conditions: &Conditions) -> String {
    format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        R::COLUMNS,
        R::TABLE,
        conditions.sql(),
        R::ORDER_BY
    )
}

impl PgResource for Product {
    const TABLE: &'static str = "products";
    const COLUMNS: &'static str =
        "id, name, description, category, price, sku, active, created_at, updated_at";
    const ORDER_BY: &'static str = "category, name";

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Product {
            id: col(row, "id")?,
            name: col(row, "name")?,
            description: col(row, "description")?,
            category: col(row, "category")?,
            price: col(row, "price")?,
            sku: col(row, "sku")?,
            active: col(row, "active")?,
            created_at: col(row, "created_at")?,
            updated_at: col(row, "updated_at")?,
        })
    }

    fn filter(filter: &ListFilter, conditions: &mut Conditions) {
        if let Some(category) = &filter.category {
            conditions.eq("category", category.clone());
        }
    }
}

impl PgEditable for Product {
    fn insert(
        exec: &dyn SqlExecutor,
        id: Uuid,
        draft: &ProductDraft,
    ) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "INSERT INTO products (id, name, description, category, price, sku) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(
            &sql,
            &[
                &id,
                &draft.name,
                &draft.description,
                &draft.category,
                &draft.price,
                &draft.sku,
            ],
        )
    }

    fn update(
        exec: &dyn SqlExecutor,
        id: Uuid,
        changes: &ProductDraft,
    ) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "UPDATE products SET name = $2, description = $3, category = $4, price = $5, \
             sku = $6, updated_at = now() WHERE id = $1 AND active RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(
            &sql,
            &[
                &id,
                &changes.name,
                &changes.description,
                &changes.category,
                &changes.price,
                &changes.sku,
            ],
        )
    }
}

impl PgResource for Store {
    const TABLE: &'static str = "stores";
    const COLUMNS: &'static str = "id, name, address, phone, active, created_at, updated_at";
    const ORDER_BY: &'static str = "name";

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Store {
            id: col(row, "id")?,
            name: col(row, "name")?,
            address: col(row, "address")?,
            phone: col(row, "phone")?,
            active: col(row, "active")?,
            created_at: col(row, "created_at")?,
            updated_at: col(row, "updated_at")?,
        })
    }
}

impl PgEditable for Store {
    fn insert(exec: &dyn SqlExecutor, id: Uuid, draft: &StoreDraft) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "INSERT INTO stores (id, name, address, phone) VALUES ($1, $2, $3, $4) RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(&sql, &[&id, &draft.name, &draft.address, &draft.phone])
    }

    fn update(
        exec: &dyn SqlExecutor,
        id: Uuid,
        changes: &StoreDraft,
    ) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "UPDATE stores SET name = $2, address = $3, phone = $4, updated_at = now() \
             WHERE id = $1 AND active RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(&sql, &[&id, &changes.name, &changes.address, &changes.phone])
    }
}

impl PgResource for InventoryRecord {
    const TABLE: &'static str = "inventory";
    const COLUMNS: &'static str =
        "id, product_id, store_id, quantity, min_stock, active, created_at, updated_at";
    const ORDER_BY: &'static str = "created_at";

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(InventoryRecord {
            id: col(row, "id")?,
            product_id: col(row, "product_id")?,
            store_id: col(row, "store_id")?,
            quantity: col(row, "quantity")?,
            min_stock: col(row, "min_stock")?,
            active: col(row, "active")?,
            created_at: col(row, "created_at")?,
            updated_at: col(row, "updated_at")?,
        })
    }

    fn filter(filter: &ListFilter, conditions: &mut Conditions) {
        if let Some(product_id) = filter.product_id {
            conditions.eq("product_id", product_id);
        }
        if let Some(store_id) = filter.store_id {
            conditions.eq("store_id", store_id);
        }
    }
}

impl PgEditable for InventoryRecord {
    /// Inserts only when both the product and the store exist and are active.
    fn insert(
        exec: &dyn SqlExecutor,
        id: Uuid,
        draft: &InventoryDraft,
    ) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "INSERT INTO inventory (id, product_id, store_id, quantity, min_stock) \
             SELECT $1::uuid, $2::uuid, $3::uuid, $4::int4, $5::int4 \
             WHERE EXISTS (SELECT 1 FROM products WHERE id = $2 AND active) \
               AND EXISTS (SELECT 1 FROM stores WHERE id = $3 AND active) \
             RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(
            &sql,
            &[
                &id,
                &draft.product_id,
                &draft.store_id,
                &draft.quantity,
                &draft.min_stock,
            ],
        )
    }

    fn update(
        exec: &dyn SqlExecutor,
        id: Uuid,
        changes: &InventoryChanges,
    ) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "UPDATE inventory SET quantity = $2, min_stock = $3, updated_at = now() \
             WHERE id = $1 AND active RETURNING {}",
            Self::COLUMNS
        );
        exec.query_opt(&sql, &[&id, &changes.quantity, &changes.min_stock])
    }
}

impl PgResource for Movement {
    const TABLE: &'static str = "movements";
    const COLUMNS: &'static str = "id, product_id, source_store_id, target_store_id, quantity, \
         movement_type, moved_at, active, created_at, updated_at";
    const ORDER_BY: &'static str = "moved_at DESC";

    fn from_row(row: &Row) -> Result<Self, DbError> {
        let kind: String = col(row, "movement_type")?;
        let movement_type: MovementType = kind
            .parse()
            .map_err(|_| DbError::Parse(format!("unknown movement type '{kind}'")))?;
        Ok(Movement {
            id: col(row, "id")?,
            product_id: col(row, "product_id")?,
            source_store_id: col(row, "source_store_id")?,
            target_store_id: col(row, "target_store_id")?,
            quantity: col(row, "quantity")?,
            movement_type,
            timestamp: col(row, "moved_at")?,
            active: col(row, "active")?,
            created_at: col(row, "created_at")?,
            updated_at: col(row, "updated_at")?,
        })
    }

    fn filter(filter: &ListFilter, conditions: &mut Conditions) {
        if let Some(product_id) = filter.product_id {
            conditions.eq("product_id", product_id);
        }
        if let Some(store_id) = filter.store_id {
            conditions.any_eq(&["source_store_id", "target_store_id"], store_id);
        }
        if let Some(kind) = filter.movement_type {
            conditions.eq("movement_type", kind.as_str().to_string());
        }
    }
}

/// [`Backend`] over a [`DbPool`].
pub struct PgBackend {
    pool: DbPool,
    lock_timeout_ms: u64,
}

impl PgBackend {
    /// `lock_timeout_ms` bounds how long a ledger unit waits for a row lock;
    /// 0 waits indefinitely.
    pub fn new(pool: DbPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn query_details<D>(
        &self,
        sql: &str,
        conditions: &Conditions,
        read: fn(&Row) -> Result<D, DbError>,
    ) -> Result<Vec<D>, StoreError> {
        self.with_executor(|exec| {
            exec.query_all(sql, &conditions.params())?
                .iter()
                .map(read)
                .collect()
        })
    }

    fn with_executor<T>(
        &self,
        f: impl FnOnce(&PgExecutor) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let conn = self.pool.acquire()?;
        let exec = conn.executor();
        Ok(f(&exec)?)
    }
}

impl<R: PgResource> Repository<R> for PgBackend {
    fn list(&self, filter: &ListFilter) -> Result<Vec<R>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("active");
        R::filter(filter, &mut conditions);
        let sql = list_sql::<R>(&conditions);
        self.with_executor(|exec| {
            exec.query_all(&sql, &conditions.params())?
                .iter()
                .map(R::from_row)
                .collect()
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<R>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND active",
            R::COLUMNS,
            R::TABLE
        );
        self.with_executor(|exec| exec.query_opt(&sql, &[&id])?.as_ref().map(R::from_row).transpose())
    }
}

impl<R: PgEditable> EditableRepository<R> for PgBackend {
    fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        let id = Uuid::new_v4();
        let row = self.with_executor(|exec| {
            R::insert(exec, id, &draft)?.as_ref().map(R::from_row).transpose()
        })?;
        row.ok_or_else(|| {
            StoreError::MissingReference(format!(
                "{} references a product or store that does not exist",
                R::NAME
            ))
        })
    }

    fn update(&self, id: Uuid, changes: R::Changes) -> Result<Option<R>, StoreError> {
        self.with_executor(|exec| {
            R::update(exec, id, &changes)?.as_ref().map(R::from_row).transpose()
        })
    }

    fn set_active(&self, id: Uuid, active: bool) -> Result<Option<R>, StoreError> {
        let sql = format!(
            "UPDATE {} SET active = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            R::TABLE,
            R::COLUMNS
        );
        self.with_executor(|exec| {
            exec.query_opt(&sql, &[&id, &active])?
                .as_ref()
                .map(R::from_row)
                .transpose()
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET active = false, updated_at = now() WHERE id = $1 AND active",
            R::TABLE
        );
        self.with_executor(|exec| Ok(exec.execute(&sql, &[&id])? > 0))
    }
}

impl DetailRepository<InventoryDetail> for PgBackend {
    fn list_details(&self, filter: &ListFilter) -> Result<Vec<InventoryDetail>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("i.active");
        InventoryRecord::filter(filter, &mut conditions);
        let sql = detail_sql(INVENTORY_DETAIL_SELECT, &conditions, "i.created_at");
        self.query_details(&sql, &conditions, inventory_detail)
    }

    fn get_detail(&self, id: Uuid) -> Result<Option<InventoryDetail>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("i.active");
        conditions.eq("i.id", id);
        let sql = detail_sql(INVENTORY_DETAIL_SELECT, &conditions, "i.created_at");
        Ok(self
            .query_details(&sql, &conditions, inventory_detail)?
            .into_iter()
            .next())
    }
}

impl DetailRepository<MovementDetail> for PgBackend {
    fn list_details(&self, filter: &ListFilter) -> Result<Vec<MovementDetail>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("m.active");
        Movement::filter(filter, &mut conditions);
        let sql = detail_sql(MOVEMENT_DETAIL_SELECT, &conditions, "m.moved_at DESC");
        self.query_details(&sql, &conditions, movement_detail)
    }

    fn get_detail(&self, id: Uuid) -> Result<Option<MovementDetail>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("m.active");
        conditions.eq("m.id", id);
        let sql = detail_sql(MOVEMENT_DETAIL_SELECT, &conditions, "m.moved_at DESC");
        Ok(self
            .query_details(&sql, &conditions, movement_detail)?
            .into_iter()
            .next())
    }
}

/// Ledger unit over one pooled connection.
pub struct PgUnit {
    // Declared first so the transaction ends before the connection goes home.
    tx: Transaction,
    _conn: PooledConnection,
}

impl LedgerUnit for PgUnit {
    fn product_is_active(&mut self, product_id: Uuid) -> Result<bool, StoreError> {
        let row = self.tx.query_opt(
            "SELECT id FROM products WHERE id = $1 AND active FOR SHARE",
            &[&product_id],
        )?;
        Ok(row.is_some())
    }

    fn store_is_active(&mut self, store_id: Uuid) -> Result<bool, StoreError> {
        let row = self.tx.query_opt(
            "SELECT id FROM stores WHERE id = $1 AND active FOR SHARE",
            &[&store_id],
        )?;
        Ok(row.is_some())
    }

    fn lock_stock(
        &mut self,
        product_id: Uuid,
        store_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, i32)>, StoreError> {
        let store_ids = store_ids.to_vec();
        let rows = self.tx.query_all(
            "SELECT store_id, quantity FROM inventory \
             WHERE product_id = $1 AND store_id = ANY($2) AND active \
             ORDER BY store_id FOR UPDATE",
            &[&product_id, &store_ids],
        )?;
        let mut locked = Vec::with_capacity(rows.len());
        for row in &rows {
            locked.push((col(row, "store_id")?, col(row, "quantity")?));
        }
        Ok(locked)
    }

    fn debit(
        &mut self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        let affected = self.tx.execute(
            "UPDATE inventory SET quantity = quantity - $3, updated_at = now() \
             WHERE product_id = $1 AND store_id = $2 AND active AND quantity >= $3",
            &[&product_id, &store_id, &quantity],
        )?;
        Ok(affected == 1)
    }

    fn credit(
        &mut self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
        min_stock: i32,
    ) -> Result<(), StoreError> {
        let id = Uuid::new_v4();
        self.tx.execute(
            "INSERT INTO inventory (id, product_id, store_id, quantity, min_stock) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (product_id, store_id) WHERE active \
             DO UPDATE SET quantity = inventory.quantity + EXCLUDED.quantity, updated_at = now()",
            &[&id, &product_id, &store_id, &quantity, &min_stock],
        )?;
        Ok(())
    }

    fn append_movement(&mut self, movement: &NewMovement) -> Result<Movement, StoreError> {
        let sql = format!(
            "INSERT INTO movements \
             (id, product_id, source_store_id, target_store_id, quantity, movement_type) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Movement::COLUMNS
        );
        let row = self.tx.query_one(
            &sql,
            &[
                &Uuid::new_v4(),
                &movement.product_id,
                &movement.source_store_id,
                &movement.target_store_id,
                &movement.quantity,
                &movement.movement_type.as_str(),
            ],
        )?;
        Ok(Movement::from_row(&row)?)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(DbError::from)?;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().map_err(DbError::from)?;
        Ok(())
    }
}

/// Inventory rows with product and store names. The filter columns of
/// [`InventoryRecord`] exist only on `inventory`, so they need no alias.
const INVENTORY_DETAIL_SELECT: &str = "SELECT i.id, i.product_id, i.store_id, i.quantity, \
            i.min_stock, i.active, i.created_at, i.updated_at, \
            p.name AS product_name, s.name AS store_name \
     FROM inventory i \
     JOIN products p ON p.id = i.product_id \
     JOIN stores s ON s.id = i.store_id";

const MOVEMENT_DETAIL_SELECT: &str = "SELECT m.id, m.product_id, m.source_store_id, \
            m.target_store_id, m.quantity, m.movement_type, m.moved_at, m.active, \
            m.created_at, m.updated_at, p.name AS product_name, \
            src.name AS source_store_name, dst.name AS target_store_name \
     FROM movements m \
     JOIN products p ON p.id = m.product_id \
     JOIN stores src ON src.id = m.source_store_id \
     JOIN stores dst ON dst.id = m.target_store_id";

fn detail_sql(select: &str, conditions: &Conditions, order_by: &str) -> String {
    format!("{select}{} ORDER BY {order_by}", conditions.sql())
}

fn inventory_detail(row: &Row) -> Result<InventoryDetail, DbError> {
    Ok(InventoryDetail {
        record: InventoryRecord::from_row(row)?,
        product_name: col(row, "product_name")?,
        store_name: col(row, "store_name")?,
    })
}

fn movement_detail(row: &Row) -> Result<MovementDetail, DbError> {
    Ok(MovementDetail {
        movement: Movement::from_row(row)?,
        product_name: col(row, "product_name")?,
        source_store_name: col(row, "source_store_name")?,
        target_store_name: col(row, "target_store_name")?,
    })
}

const STOCK_ALERTS_SQL: &str = "SELECT i.product_id, i.store_id, p.name AS product_name, \
            s.name AS store_name, i.quantity, i.min_stock \
     FROM inventory i \
     JOIN products p ON p.id = i.product_id \
     JOIN stores s ON s.id = i.store_id \
     WHERE i.active AND p.active AND s.active AND i.quantity <= i.min_stock \
     ORDER BY i.quantity ASC, p.name, s.name";

impl Backend for PgBackend {
    type Unit<'a> = PgUnit;

    fn begin(&self) -> Result<PgUnit, StoreError> {
        let conn = self.pool.acquire()?;
        let tx = conn.begin(IsolationLevel::ReadCommitted)?;
        tx.set_lock_timeout(self.lock_timeout_ms)?;
        Ok(PgUnit { tx, _conn: conn })
    }

    fn store_inventory(&self, store_id: Uuid) -> Result<Vec<InventoryDetail>, StoreError> {
        let mut conditions = Conditions::default();
        conditions.raw("i.active AND p.active AND s.active");
        conditions.eq("i.store_id", store_id);
        let sql = detail_sql(INVENTORY_DETAIL_SELECT, &conditions, "p.name");
        self.query_details(&sql, &conditions, inventory_detail)
    }

    fn stock_alerts(&self) -> Result<Vec<StockAlert>, StoreError> {
        self.with_executor(|exec| {
            exec.query_all(STOCK_ALERTS_SQL, &[])?
                .iter()
                .map(|row| {
                    Ok(StockAlert {
                        product_id: col(row, "product_id")?,
                        store_id: col(row, "store_id")?,
                        product_name: col(row, "product_name")?,
                        store_name: col(row, "store_name")?,
                        current_quantity: col(row, "quantity")?,
                        min_stock: col(row, "min_stock")?,
                    })
                })
                .collect()
        })
    }

    fn health(&self) -> Result<(), StoreError> {
        let healthy = self.with_executor(|exec| exec.check_health())?;
        if healthy {
            Ok(())
        } else {
            Err(StoreError::Unavailable("database health probe failed".into()))
        }
    }
}
