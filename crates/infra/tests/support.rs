//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cashlink_domain::{RecordKind, StoreConfig};
use cashlink_infra::database::DbManager;
use cashlink_infra::http::HttpClient;
use cashlink_infra::{RetailApiClient, Transport};
use chrono::NaiveDate;
use rusqlite::params;
use tempfile::TempDir;

/// A temp-dir database with migrations applied.
pub struct TestDb {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

pub fn setup_db() -> TestDb {
    let temp_dir = TempDir::new().expect("temp dir created");
    let db_path = temp_dir.path().join("test.db");
    let manager = DbManager::new(&db_path, 4).expect("manager created");
    manager.run_migrations().expect("migrations applied");
    TestDb { manager: Arc::new(manager), _temp_dir: temp_dir }
}

pub fn store_config(base_url: String) -> StoreConfig {
    StoreConfig {
        company_id: 9001,
        location_id: 17,
        erp_company_id: 1,
        base_urls: vec![base_url],
    }
}

/// Retail client with test-friendly backoff and pauses.
pub fn retail_client(max_attempts: usize) -> RetailApiClient {
    let http = HttpClient::builder()
        .base_backoff(Duration::from_millis(5))
        .max_attempts(max_attempts)
        .build()
        .expect("http client");
    RetailApiClient::new(Transport::from_parts(
        http,
        "store-user",
        "secret",
        "8.1.0",
        "8.0.4",
        Duration::from_millis(5),
    ))
}

/// Seed one register transaction with a single cash-paid line and a matching
/// pending-sales row.
pub fn seed_cash_sale(db: &TestDb, transaction_id: i64, receipt: i64, total: f64) {
    seed_register(db, transaction_id, "sale", receipt, total);
    seed_sold_item(db, transaction_id, 100, 1.0, total);
    seed_pending(db, transaction_id, RecordKind::Sale);
}

/// Seed a cancellation: register row, cancelled-items snapshot, pending row.
pub fn seed_cancellation(db: &TestDb, transaction_id: i64, receipt: i64, total: f64) {
    seed_register(db, transaction_id, "cancellation", receipt, total);
    let conn = db.manager.get_connection().expect("conn");
    conn.execute(
        "INSERT INTO cancelled_items (
            transaction_id, company_id, product_code, barcode, description,
            quantity, unit_amount, discount
        ) VALUES (?1, 1, 200, '789', 'RETURNED ITEM', 1.0, ?2, 0.0)",
        params![transaction_id, total],
    )
    .expect("cancelled item");
    seed_pending(db, transaction_id, RecordKind::Cancellation);
}

pub fn seed_register(
    db: &TestDb,
    transaction_id: i64,
    entry_kind: &str,
    receipt: i64,
    total: f64,
) {
    let conn = db.manager.get_connection().expect("conn");
    conn.execute(
        "INSERT INTO register (
            transaction_id, company_id, station_id, entry_kind, receipt_number,
            total, recorded_on, recorded_time, cash_amount
        ) VALUES (?1, 1, 3, ?2, ?3, ?4, '2025-08-01', '10:00:00', ?4)",
        params![transaction_id, entry_kind, receipt, total],
    )
    .expect("register row");
}

pub fn seed_sold_item(
    db: &TestDb,
    transaction_id: i64,
    product: i64,
    quantity: f64,
    unit_price: f64,
) {
    let conn = db.manager.get_connection().expect("conn");
    conn.execute(
        "INSERT INTO sold_items (
            transaction_id, company_id, product_code, barcode, description,
            quantity, gross_price, net_price, list_price
        ) VALUES (?1, 1, ?2, '7891000100103', 'TEST ITEM', ?3, ?4, ?4, ?4)",
        params![transaction_id, product, quantity, unit_price],
    )
    .expect("sold item");
}

pub fn seed_pending(db: &TestDb, transaction_id: i64, kind: RecordKind) {
    let conn = db.manager.get_connection().expect("conn");
    conn.execute(
        "INSERT INTO pending_sales (
            transaction_id, company_id, station_id, record_kind, attempts,
            enqueued_at, recorded_on
        ) VALUES (?1, 1, 3, ?2, 0, ?1, '2025-08-01')",
        params![transaction_id, kind.to_string()],
    )
    .expect("pending row");
}

pub fn pending_count(db: &TestDb) -> i64 {
    let conn = db.manager.get_connection().expect("conn");
    conn.query_row("SELECT COUNT(*) FROM pending_sales", [], |row| row.get(0)).unwrap()
}

pub fn event_count(db: &TestDb, event_type: &str) -> i64 {
    let conn = db.manager.get_connection().expect("conn");
    conn.query_row(
        "SELECT COUNT(*) FROM sale_events WHERE event_type = ?1",
        params![event_type],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn stale_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}
