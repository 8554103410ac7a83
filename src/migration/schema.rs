//! Built-in schema migrations

use crate::migration::Migration;
use sea_query::{ColumnDef, Expr, ExprTrait, ForeignKey, Index, PostgresQueryBuilder, Table};

/// Every migration this build knows, in version order.
pub fn builtin() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateInventorySchema)]
}

fn id_column() -> ColumnDef {
    ColumnDef::new("id").uuid().not_null().primary_key().to_owned()
}

fn active_column() -> ColumnDef {
    ColumnDef::new("active")
        .boolean()
        .not_null()
        .default(true)
        .to_owned()
}

fn timestamp_column(name: &'static str) -> ColumnDef {
    ColumnDef::new(name)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::cust("now()"))
        .to_owned()
}

/// Products, stores, stock levels and the movement log.
pub struct CreateInventorySchema;

impl CreateInventorySchema {
    fn products() -> String {
        Table::create()
            .table("products")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("name").string_len(255).not_null())
            .col(ColumnDef::new("description").text().not_null().default(""))
            .col(ColumnDef::new("category").string_len(255).not_null().default(""))
            .col(
                ColumnDef::new("price")
                    .decimal_len(12, 2)
                    .not_null()
                    .check(Expr::col("price").gte(0)),
            )
            .col(ColumnDef::new("sku").string_len(64).not_null().unique_key())
            .col(active_column())
            .col(timestamp_column("created_at"))
            .col(timestamp_column("updated_at"))
            .to_owned()
            .build(PostgresQueryBuilder)
    }

    fn stores() -> String {
        Table::create()
            .table("stores")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("name").string_len(255).not_null())
            .col(ColumnDef::new("address").text().not_null().default(""))
            .col(ColumnDef::new("phone").string_len(64).not_null().default(""))
            .col(active_column())
            .col(timestamp_column("created_at"))
            .col(timestamp_column("updated_at"))
            .to_owned()
            .build(PostgresQueryBuilder)
    }

    fn inventory() -> String {
        Table::create()
            .table("inventory")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("product_id").uuid().not_null())
            .col(ColumnDef::new("store_id").uuid().not_null())
            .col(
                ColumnDef::new("quantity")
                    .integer()
                    .not_null()
                    .default(0)
                    .check(Expr::col("quantity").gte(0)),
            )
            .col(
                ColumnDef::new("min_stock")
                    .integer()
                    .not_null()
                    .default(0)
                    .check(Expr::col("min_stock").gte(0)),
            )
            .col(active_column())
            .col(timestamp_column("created_at"))
            .col(timestamp_column("updated_at"))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_inventory_product")
                    .from("inventory", "product_id")
                    .to("products", "id"),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_inventory_store")
                    .from("inventory", "store_id")
                    .to("stores", "id"),
            )
            .to_owned()
            .build(PostgresQueryBuilder)
    }

    fn movements() -> String {
        Table::create()
            .table("movements")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("product_id").uuid().not_null())
            .col(ColumnDef::new("source_store_id").uuid().null())
            .col(ColumnDef::new("target_store_id").uuid().null())
            .col(
                ColumnDef::new("quantity")
                    .integer()
                    .not_null()
                    .check(Expr::col("quantity").gt(0)),
            )
            .col(
                ColumnDef::new("movement_type")
                    .string_len(16)
                    .not_null()
                    .check(Expr::col("movement_type").is_in(["IN", "OUT", "TRANSFER"])),
            )
            .col(timestamp_column("moved_at"))
            .col(active_column())
            .col(timestamp_column("created_at"))
            .col(timestamp_column("updated_at"))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_movements_product")
                    .from("movements", "product_id")
                    .to("products", "id"),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_movements_source_store")
                    .from("movements", "source_store_id")
                    .to("stores", "id"),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_movements_target_store")
                    .from("movements", "target_store_id")
                    .to("stores", "id"),
            )
            .to_owned()
            .build(PostgresQueryBuilder)
    }

    fn index(name: &'static str, table: &'static str, column: &'static str) -> String {
        Index::create()
            .if_not_exists()
            .name(name)
            .table(table)
            .col(Expr::col(column))
            .to_owned()
            .build(PostgresQueryBuilder)
    }
}

impl Migration for CreateInventorySchema {
    fn version(&self) -> i64 {
        20240101000000
    }

    fn name(&self) -> &str {
        "create_inventory_schema"
    }

    fn statements(&self) -> Vec<String> {
        vec![
            Self::products(),
            Self::stores(),
            Self::inventory(),
            Self::movements(),
            // One live stock row per product and store; the credit upsert targets it.
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_inventory_active_product_store \
             ON inventory (product_id, store_id) WHERE active"
                .to_string(),
            Self::index("idx_inventory_store", "inventory", "store_id"),
            Self::index("idx_movements_product", "movements", "product_id"),
            Self::index("idx_movements_moved_at", "movements", "moved_at"),
        ]
    }
}
