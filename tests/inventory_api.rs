//! End-to-end behaviour of the HTTP API over the in-memory backend.
//!
//! Requests go through `Api::handle`, the same entry point the server uses,
//! so routing, validation, error mapping and the ledger are all exercised.

use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stockroom::{Api, ApiResponse, MemoryBackend};

const MIN_STOCK: i32 = 5;

fn api() -> Api<MemoryBackend> {
    Api::with_options(Arc::new(MemoryBackend::new()), "", MIN_STOCK)
}

fn send(api: &Api<MemoryBackend>, method: &str, path: &str, body: Value) -> ApiResponse {
    let body = if body.is_null() {
        Vec::new()
    } else {
        body.to_string().into_bytes()
    };
    api.handle(method, path, &body)
}

fn ok(api: &Api<MemoryBackend>, method: &str, path: &str, body: Value) -> Value {
    let response = send(api, method, path, body);
    assert!(
        (200..300).contains(&response.status),
        "{method} {path} returned {}: {}",
        response.status,
        response.json_body()
    );
    response.json_body()
}

fn create_product(api: &Api<MemoryBackend>, name: &str, sku: &str) -> String {
    let product = ok(
        api,
        "POST",
        "/products",
        json!({ "name": name, "category": "tools", "price": 9.5, "sku": sku }),
    );
    product["id"].as_str().unwrap().to_string()
}

fn create_store(api: &Api<MemoryBackend>, name: &str) -> String {
    let store = ok(api, "POST", "/stores", json!({ "name": name, "address": "Main St 1" }));
    store["id"].as_str().unwrap().to_string()
}

fn receive(api: &Api<MemoryBackend>, product: &str, store: &str, quantity: i64) {
    ok(
        api,
        "POST",
        "/movements",
        json!({ "type": "IN", "productId": product, "targetStoreId": store, "quantity": quantity }),
    );
}

fn transfer(
    api: &Api<MemoryBackend>,
    product: &str,
    source: &str,
    target: &str,
    quantity: i64,
) -> ApiResponse {
    send(
        api,
        "POST",
        "/inventory/transfer",
        json!({
            "productId": product,
            "sourceStoreId": source,
            "targetStoreId": target,
            "quantity": quantity
        }),
    )
}

/// Quantity of `product` at `store`, 0 when there is no live row.
fn quantity(api: &Api<MemoryBackend>, product: &str, store: &str) -> i64 {
    let rows = ok(
        api,
        "GET",
        &format!("/inventory?productId={product}&storeId={store}"),
        Value::Null,
    );
    rows.as_array()
        .unwrap()
        .iter()
        .filter(|r| r["active"] == json!(true))
        .map(|r| r["quantity"].as_i64().unwrap())
        .sum()
}

fn movement_count(api: &Api<MemoryBackend>) -> usize {
    ok(api, "GET", "/movements", Value::Null)
        .as_array()
        .unwrap()
        .len()
}

#[test]
fn test_transfer_moves_stock_and_records_movement() {
    let api = api();
    let product = create_product(&api, "Hammer", "HAM-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 20);

    let response = transfer(&api, &product, &north, &south, 8);
    assert_eq!(response.status, 200);
    let body = response.json_body();
    assert_eq!(body["message"], "transfer completed");
    assert_eq!(body["movement"]["type"], "TRANSFER");
    assert_eq!(body["movement"]["quantity"], 8);
    assert_eq!(body["movement"]["sourceStoreId"], json!(north));
    assert_eq!(body["movement"]["targetStoreId"], json!(south));

    assert_eq!(quantity(&api, &product, &north), 12);
    assert_eq!(quantity(&api, &product, &south), 8);

    let id = body["movement"]["id"].as_str().unwrap();
    let fetched = ok(&api, "GET", &format!("/movements/{id}"), Value::Null);
    for field in ["id", "productId", "sourceStoreId", "targetStoreId", "quantity", "type"] {
        assert_eq!(fetched[field], body["movement"][field], "{field}");
    }
    assert_eq!(fetched["sourceStoreName"], "North");
    assert_eq!(fetched["targetStoreName"], "South");
}

#[test]
fn test_transfer_creates_target_row_with_default_min_stock() {
    let api = api();
    let product = create_product(&api, "Saw", "SAW-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 3);

    assert_eq!(transfer(&api, &product, &north, &south, 3).status, 200);

    let rows = ok(&api, "GET", &format!("/stores/{south}/inventory"), Value::Null);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], 3);
    assert_eq!(rows[0]["minStock"], MIN_STOCK);
    assert_eq!(rows[0]["productName"], "Saw");
    assert_eq!(quantity(&api, &product, &north), 0);
}

#[test]
fn test_insufficient_stock_changes_nothing() {
    let api = api();
    let product = create_product(&api, "Drill", "DRL-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 4);
    let movements_before = movement_count(&api);

    let response = transfer(&api, &product, &north, &south, 5);
    assert_eq!(response.status, 400);
    let body = response.json_body();
    assert_eq!(body["error"], "InsufficientStock");

    assert_eq!(quantity(&api, &product, &north), 4);
    assert_eq!(quantity(&api, &product, &south), 0);
    assert_eq!(movement_count(&api), movements_before);
}

#[test]
fn test_failed_credit_rolls_back_the_debit() {
    let api = api();
    let product = create_product(&api, "Bolt", "BLT-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 10);
    receive(&api, &product, &south, 1);

    let rows = ok(
        &api,
        "GET",
        &format!("/inventory?productId={product}&storeId={south}"),
        Value::Null,
    );
    let target_row = rows[0]["id"].as_str().unwrap().to_string();
    ok(
        &api,
        "PUT",
        &format!("/inventory/{target_row}"),
        json!({ "quantity": i32::MAX, "minStock": 0 }),
    );
    let movements_before = movement_count(&api);

    // The source can cover the debit; only adding to the full target fails.
    let response = transfer(&api, &product, &north, &south, 1);
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body()["error"], "ValidationError");

    assert_eq!(quantity(&api, &product, &north), 10);
    assert_eq!(quantity(&api, &product, &south), i64::from(i32::MAX));
    assert_eq!(movement_count(&api), movements_before);
}

#[test]
fn test_store_inventory_reads_are_repeatable() {
    let api = api();
    let product = create_product(&api, "Chisel", "CHS-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 9);
    let path = format!("/stores/{north}/inventory");

    let first = ok(&api, "GET", &path, Value::Null);
    let second = ok(&api, "GET", &path, Value::Null);
    assert_eq!(first, second);
    assert_eq!(first[0]["quantity"], 9);

    assert_eq!(transfer(&api, &product, &north, &south, 4).status, 200);

    let third = ok(&api, "GET", &path, Value::Null);
    let fourth = ok(&api, "GET", &path, Value::Null);
    assert_eq!(third, fourth);
    assert_eq!(third[0]["quantity"], 5);
}

#[test]
fn test_lists_carry_product_and_store_names() {
    let api = api();
    let product = create_product(&api, "Pliers", "PLI-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 6);
    // Keep the two movement timestamps apart so the order is deterministic.
    thread::sleep(Duration::from_millis(2));
    assert_eq!(transfer(&api, &product, &north, &south, 2).status, 200);

    let rows = ok(&api, "GET", &format!("/inventory?storeId={south}"), Value::Null);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["productName"], "Pliers");
    assert_eq!(rows[0]["storeName"], "South");
    assert_eq!(rows[0]["quantity"], 2);

    let id = rows[0]["id"].as_str().unwrap();
    let one = ok(&api, "GET", &format!("/inventory/{id}"), Value::Null);
    assert_eq!(one["storeName"], "South");

    let movements = ok(&api, "GET", "/movements", Value::Null);
    let movements = movements.as_array().unwrap();
    assert_eq!(movements.len(), 2);
    // Newest first.
    assert_eq!(movements[0]["type"], "TRANSFER");
    assert_eq!(movements[0]["productName"], "Pliers");
    assert_eq!(movements[0]["sourceStoreName"], "North");
    assert_eq!(movements[0]["targetStoreName"], "South");
    assert_eq!(movements[1]["type"], "IN");
    assert_eq!(movements[1]["sourceStoreName"], "North");

    // Names survive deactivation of the store they point at.
    ok(&api, "PATCH", &format!("/stores/{south}"), json!({ "active": false }));
    let movements = ok(&api, "GET", "/movements?type=TRANSFER", Value::Null);
    assert_eq!(movements[0]["targetStoreName"], "South");
}

#[test]
fn test_transfer_validation() {
    let api = api();
    let product = create_product(&api, "Level", "LVL-1");
    let north = create_store(&api, "North");

    for quantity in [0, -3] {
        let response = transfer(&api, &product, &north, &create_store(&api, "X"), quantity);
        assert_eq!(response.status, 400, "quantity {quantity}");
    }

    let response = transfer(&api, &product, &north, &north, 1);
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body()["error"], "ValidationError");

    let response = send(
        &api,
        "POST",
        "/inventory/transfer",
        json!({ "productId": product, "sourceStoreId": north, "quantity": 1 }),
    );
    assert_eq!(response.status, 400);
}

#[test]
fn test_transfer_with_unknown_or_inactive_parties() {
    let api = api();
    let product = create_product(&api, "Tape", "TAP-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 10);

    let missing = uuid::Uuid::new_v4().to_string();
    assert_eq!(transfer(&api, &missing, &north, &south, 1).status, 404);
    assert_eq!(transfer(&api, &product, &north, &missing, 1).status, 404);

    ok(&api, "PATCH", &format!("/stores/{south}"), json!({ "active": false }));
    let response = transfer(&api, &product, &north, &south, 1);
    assert_eq!(response.status, 404);
    assert_eq!(quantity(&api, &product, &north), 10);

    ok(&api, "PATCH", &format!("/stores/{south}"), json!({ "active": true }));
    assert_eq!(transfer(&api, &product, &north, &south, 1).status, 200);
}

#[test]
fn test_quantity_is_conserved_across_many_transfers() {
    let api = api();
    let product = create_product(&api, "Nails", "NAI-1");
    let stores: Vec<String> = (0..4).map(|i| create_store(&api, &format!("S{i}"))).collect();
    receive(&api, &product, &stores[0], 100);

    let mut succeeded = 0;
    for step in 0..40 {
        let from = &stores[step % 4];
        let to = &stores[(step * 3 + 1) % 4];
        if from == to {
            continue;
        }
        let response = transfer(&api, &product, from, to, (step % 7 + 1) as i64);
        assert!(matches!(response.status, 200 | 400));
        if response.status == 200 {
            succeeded += 1;
        }
    }

    let total: i64 = stores.iter().map(|s| quantity(&api, &product, s)).sum();
    assert_eq!(total, 100);
    // One IN plus one record per successful transfer.
    assert_eq!(movement_count(&api), succeeded + 1);
}

#[test]
fn test_concurrent_transfers_never_oversell() {
    let api = Arc::new(api());
    let product = create_product(&api, "Glue", "GLU-1");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");
    receive(&api, &product, &north, 50);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let api = Arc::clone(&api);
            let (product, north, south) = (product.clone(), north.clone(), south.clone());
            thread::spawn(move || {
                (0..10)
                    .map(|_| transfer(&api, &product, &north, &south, 1).status)
                    .filter(|status| *status == 200)
                    .count()
            })
        })
        .collect();
    let moved: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(moved, 50);
    assert_eq!(quantity(&api, &product, &north), 0);
    assert_eq!(quantity(&api, &product, &south), 50);
}

#[test]
fn test_dispatch_and_movement_filters() {
    let api = api();
    let product = create_product(&api, "Rope", "ROP-1");
    let north = create_store(&api, "North");
    receive(&api, &product, &north, 6);

    let out = json!({ "type": "OUT", "productId": product, "sourceStoreId": north, "quantity": 4 });
    let movement = ok(&api, "POST", "/movements", out.clone());
    assert_eq!(movement["type"], "OUT");
    assert_eq!(quantity(&api, &product, &north), 2);

    let response = send(&api, "POST", "/movements", out);
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body()["error"], "InsufficientStock");

    let ins = ok(&api, "GET", "/movements?type=in", Value::Null);
    assert_eq!(ins.as_array().unwrap().len(), 1);
    let by_store = ok(&api, "GET", &format!("/movements?storeId={north}"), Value::Null);
    assert_eq!(by_store.as_array().unwrap().len(), 2);

    let missing_side = json!({ "type": "IN", "productId": product, "quantity": 1 });
    assert_eq!(send(&api, "POST", "/movements", missing_side).status, 400);
}

#[test]
fn test_movements_are_immutable() {
    let api = api();
    let product = create_product(&api, "Clamp", "CLP-1");
    let north = create_store(&api, "North");
    receive(&api, &product, &north, 1);
    let movements = ok(&api, "GET", "/movements", Value::Null);
    let id = movements[0]["id"].as_str().unwrap();

    for method in ["PUT", "PATCH", "DELETE"] {
        let response = send(&api, method, &format!("/movements/{id}"), json!({}));
        assert_eq!(response.status, 405, "{method}");
    }
}

#[test]
fn test_product_crud_and_soft_delete() {
    let api = api();
    let id = create_product(&api, "Wrench", "WRN-1");

    let duplicate = send(
        &api,
        "POST",
        "/products",
        json!({ "name": "Other", "price": 1, "sku": "WRN-1" }),
    );
    assert_eq!(duplicate.status, 409);

    let invalid = send(&api, "POST", "/products", json!({ "name": "", "price": 1, "sku": "X" }));
    assert_eq!(invalid.status, 400);
    let negative = send(&api, "POST", "/products", json!({ "name": "N", "price": -1, "sku": "Y" }));
    assert_eq!(negative.status, 400);

    let updated = ok(
        &api,
        "PUT",
        &format!("/products/{id}"),
        json!({ "name": "Big Wrench", "category": "tools", "price": 12.25, "sku": "WRN-1" }),
    );
    assert_eq!(updated["name"], "Big Wrench");
    assert_eq!(updated["price"], 12.25);

    let listed = ok(&api, "GET", "/products?category=tools", Value::Null);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = send(&api, "DELETE", &format!("/products/{id}"), Value::Null);
    assert_eq!(response.status, 204);
    assert_eq!(send(&api, "GET", &format!("/products/{id}"), Value::Null).status, 404);
    assert_eq!(send(&api, "DELETE", &format!("/products/{id}"), Value::Null).status, 404);
    assert_eq!(ok(&api, "GET", "/products", Value::Null), json!([]));

    let restored = ok(&api, "PATCH", &format!("/products/{id}"), json!({ "active": true }));
    assert_eq!(restored["active"], true);

    let missing = uuid::Uuid::new_v4();
    assert_eq!(send(&api, "GET", &format!("/products/{missing}"), Value::Null).status, 404);
    assert_eq!(send(&api, "DELETE", &format!("/products/{missing}"), Value::Null).status, 404);
}

#[test]
fn test_inventory_crud() {
    let api = api();
    let product = create_product(&api, "Brush", "BRU-1");
    let store = create_store(&api, "North");

    let row = ok(
        &api,
        "POST",
        "/inventory",
        json!({ "productId": product, "storeId": store, "quantity": 3, "minStock": 2 }),
    );
    let id = row["id"].as_str().unwrap();
    assert_eq!(row["quantity"], 3);

    let again = send(
        &api,
        "POST",
        "/inventory",
        json!({ "productId": product, "storeId": store }),
    );
    assert_eq!(again.status, 409);

    let negative = send(
        &api,
        "PUT",
        &format!("/inventory/{id}"),
        json!({ "quantity": -1, "minStock": 0 }),
    );
    assert_eq!(negative.status, 400);

    let updated = ok(
        &api,
        "PUT",
        &format!("/inventory/{id}"),
        json!({ "quantity": 7, "minStock": 1 }),
    );
    assert_eq!(updated["quantity"], 7);
    assert_eq!(updated["productId"], json!(product));

    let unknown_store = send(
        &api,
        "POST",
        "/inventory",
        json!({ "productId": product, "storeId": uuid::Uuid::new_v4() }),
    );
    assert_eq!(unknown_store.status, 404);
}

#[test]
fn test_stock_alerts_are_ordered_by_quantity() {
    let api = api();
    let hammer = create_product(&api, "Hammer", "HAM-9");
    let anvil = create_product(&api, "Anvil", "ANV-9");
    let north = create_store(&api, "North");
    let south = create_store(&api, "South");

    receive(&api, &hammer, &north, 4);
    receive(&api, &anvil, &south, 2);
    receive(&api, &anvil, &north, 100);

    let alerts = ok(&api, "GET", "/inventory/alerts", Value::Null);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["productName"], "Anvil");
    assert_eq!(alerts[0]["currentQuantity"], 2);
    assert_eq!(alerts[1]["productName"], "Hammer");
    assert_eq!(alerts[1]["minStock"], MIN_STOCK);

    // Reads do not change state.
    assert_eq!(ok(&api, "GET", "/inventory/alerts", Value::Null).as_array().unwrap().len(), 2);
}

#[test]
fn test_inventory_of_unknown_store_is_empty() {
    let api = api();
    let store = uuid::Uuid::new_v4();
    let rows = ok(&api, "GET", &format!("/stores/{store}/inventory"), Value::Null);
    assert_eq!(rows, json!([]));
}

#[test]
fn test_error_envelope() {
    let api = api();
    let response = send(&api, "GET", "/products/nope", Value::Null);
    assert_eq!(response.status, 400);
    let body = response.json_body();
    assert_eq!(body["error"], "ValidationError");
    assert!(body["message"].is_string());
    assert_eq!(response.content_type, "Content-Type: application/json");
}
