//! Renders one sale/cancellation/return as a wire record.
//!
//! A build is a pure function of the transaction id plus current database
//! state: repeated calls without an intervening state change produce
//! byte-identical JSON, which is what makes resubmission after a transport
//! failure safe.

use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::footing::{drop_subcent_lines, foot_lines, foot_payments, round2};
use cashlink_core::numbering::format_receipt;
use cashlink_core::sanitize::description_or_placeholder;
use cashlink_core::sync::ports::{BuildMode, SalePayloadBuilder};
use cashlink_domain::constants::{channel, payment, CURRENCY_CODE, EXCHANGE_RATE};
use cashlink_domain::{CashlinkError, Result, SaleLine, SalePayment, SaleRecord};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rusqlite::{params, OptionalExtension};
use tokio::task;
use tracing::debug;

use crate::database::DbManager;
use crate::errors::InfraError;

/// Local wall-clock offset stamped on every record (UTC-3).
const LOCAL_OFFSET_SECS: i32 = -3 * 3600;

pub struct SqlSalePayloadBuilder {
    db: Arc<DbManager>,
}

impl SqlSalePayloadBuilder {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SalePayloadBuilder for SqlSalePayloadBuilder {
    async fn build_sale(
        &self,
        company_id: i64,
        transaction_id: i64,
        station_code: &str,
        mode: BuildMode,
    ) -> Result<SaleRecord> {
        debug!(company_id, transaction_id, station = station_code, ?mode, "building sale record");
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || build_blocking(&db, company_id, transaction_id, mode))
            .await
            .map_err(|err| {
                CashlinkError::Internal(format!("payload build task failed: {err}"))
            })?
    }
}

struct RegisterRow {
    entry_kind: String,
    receipt_number: i64,
    total: f64,
    recorded_on: String,
    recorded_time: Option<String>,
    cash_amount: f64,
    cheque_amount: f64,
    other_amount: f64,
    channel: Option<String>,
}

fn build_blocking(
    db: &DbManager,
    company_id: i64,
    transaction_id: i64,
    mode: BuildMode,
) -> Result<SaleRecord> {
    let conn = db.get_connection()?;

    let register: RegisterRow = conn
        .query_row(
            "SELECT entry_kind, receipt_number, total, recorded_on, recorded_time,
                    cash_amount, cheque_amount, other_amount, channel
             FROM register
             WHERE transaction_id = ?1 AND company_id = ?2",
            params![transaction_id, company_id],
            |row| {
                Ok(RegisterRow {
                    entry_kind: row.get(0)?,
                    receipt_number: row.get(1)?,
                    total: row.get(2)?,
                    recorded_on: row.get(3)?,
                    recorded_time: row.get(4)?,
                    cash_amount: row.get(5)?,
                    cheque_amount: row.get(6)?,
                    other_amount: row.get(7)?,
                    channel: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(map_sql)?
        .ok_or_else(|| {
            CashlinkError::Payload(format!(
                "transaction {transaction_id} not found in register for company {company_id}"
            ))
        })?;

    let is_reversal_kind =
        matches!(register.entry_kind.as_str(), "cancellation" | "return");

    let mut reversal = is_reversal_kind;
    let mut lines = if is_reversal_kind {
        load_cancelled_lines(&conn, company_id, transaction_id)?
    } else {
        let (built, fully_returned) = load_sold_lines(&conn, company_id, transaction_id)?;
        if fully_returned {
            reversal = true;
        }
        built
    };

    // Reconstruction renders the original sale the reversal is based on.
    if mode == BuildMode::ReconstructSale {
        reversal = false;
    }

    let total = round2(register.total);
    drop_subcent_lines(&mut lines)?;
    foot_lines(&mut lines, total);

    let (payments, tender_labels) =
        load_payments(&conn, company_id, transaction_id, &register, total)?;
    let mut payments = payments;
    foot_payments(&mut payments, total);

    let discount_total = round2(lines.iter().map(|line| line.discount).sum());
    let surcharge_total = round2(lines.iter().map(|line| line.surcharge).sum());

    let channel_code = channel::code_for(register.channel.as_deref());
    let channel_description =
        format!("{}-{}", channel::description(channel_code), tender_labels.join("-"));

    Ok(SaleRecord {
        recorded_at: format_recorded_at(&register.recorded_on, register.recorded_time.as_deref())?,
        number: format_receipt(register.receipt_number, reversal),
        total,
        currency_code: CURRENCY_CODE.to_string(),
        exchange_rate: EXCHANGE_RATE,
        discount_total,
        surcharge_total,
        reversal,
        channel_code,
        channel_description,
        lines,
        payments,
    })
}

/// Lines for a reversal (or a reconstruction) come from the snapshot taken
/// when the transaction was cancelled; it still holds the original
/// quantities and prices.
fn load_cancelled_lines(
    conn: &rusqlite::Connection,
    company_id: i64,
    transaction_id: i64,
) -> Result<Vec<SaleLine>> {
    let mut stmt = conn
        .prepare(
            "SELECT product_code, barcode, description, quantity, unit_amount, discount
             FROM cancelled_items
             WHERE transaction_id = ?1 AND company_id = ?2
             ORDER BY rowid ASC",
        )
        .map_err(map_sql)?;

    let rows = stmt
        .query_map(params![transaction_id, company_id], |row| {
            let product_code: i64 = row.get(0)?;
            let barcode: Option<String> = row.get(1)?;
            let description: Option<String> = row.get(2)?;
            let quantity: f64 = row.get(3)?;
            let unit_amount: f64 = row.get(4)?;
            let discount: f64 = row.get(5)?;
            Ok((product_code, barcode, description, quantity, unit_amount, discount))
        })
        .map_err(map_sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_sql)?;

    if rows.is_empty() {
        return Err(CashlinkError::Payload(format!(
            "reversal {transaction_id} has no cancelled-items snapshot"
        )));
    }

    Ok(rows
        .into_iter()
        .map(|(product_code, barcode, description, quantity, unit_amount, discount)| {
            SaleLine {
                article_code: product_code.to_string(),
                barcode: clean_barcode(barcode.as_deref()),
                description: description_or_placeholder(description.as_deref()),
                quantity,
                unit_amount: round2(unit_amount),
                amount: round2(quantity * unit_amount),
                discount: round2(discount),
                surcharge: 0.0,
            }
        })
        .collect())
}

/// Lines for a regular sale. Also reports whether every line was fully
/// returned, which turns the record into a reversal.
fn load_sold_lines(
    conn: &rusqlite::Connection,
    company_id: i64,
    transaction_id: i64,
) -> Result<(Vec<SaleLine>, bool)> {
    let mut stmt = conn
        .prepare(
            "SELECT product_code, barcode, description, quantity, gross_price, net_price,
                    list_price, returned_qty, surcharge_applied
             FROM sold_items
             WHERE transaction_id = ?1 AND company_id = ?2
             ORDER BY rowid ASC",
        )
        .map_err(map_sql)?;

    struct SoldRow {
        product_code: i64,
        barcode: Option<String>,
        description: Option<String>,
        quantity: f64,
        gross_price: f64,
        net_price: f64,
        list_price: f64,
        returned_qty: f64,
        surcharge_applied: bool,
    }

    let rows = stmt
        .query_map(params![transaction_id, company_id], |row| {
            Ok(SoldRow {
                product_code: row.get(0)?,
                barcode: row.get(1)?,
                description: row.get(2)?,
                quantity: row.get(3)?,
                gross_price: row.get(4)?,
                net_price: row.get(5)?,
                list_price: row.get(6)?,
                returned_qty: row.get(7)?,
                surcharge_applied: row.get::<_, i64>(8)? != 0,
            })
        })
        .map_err(map_sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_sql)?;

    if rows.is_empty() {
        return Err(CashlinkError::Payload(format!(
            "sale {transaction_id} has no line items"
        )));
    }

    let sold: f64 = rows.iter().map(|row| row.quantity).sum();
    let returned: f64 = rows.iter().map(|row| row.returned_qty).sum();
    let fully_returned = sold > 0.0 && (sold - returned).abs() < f64::EPSILON;

    let lines = rows
        .into_iter()
        .map(|row| {
            let (unit_amount, amount, discount, surcharge) = if row.surcharge_applied {
                // Marked-up line: the surcharge is the gap between the list
                // price actually charged and the base price.
                let surcharge = round2((row.list_price - row.gross_price).abs() * row.quantity);
                let amount = round2(row.list_price * row.quantity + surcharge);
                (row.list_price, amount, 0.0, surcharge)
            } else {
                let spread = row.gross_price - row.net_price;
                let discount =
                    if spread > 0.0 { round2(spread * row.quantity) } else { 0.0 };
                let amount = round2(row.net_price * row.quantity);
                (row.gross_price, amount, discount, 0.0)
            };
            SaleLine {
                article_code: row.product_code.to_string(),
                barcode: clean_barcode(row.barcode.as_deref()),
                description: description_or_placeholder(row.description.as_deref()),
                quantity: row.quantity,
                unit_amount: round2(unit_amount),
                amount,
                discount,
                surcharge,
            }
        })
        .collect();

    Ok((lines, fully_returned))
}

/// Tender entries: card rows first, then the cash/cheque/other columns.
/// A transaction with no recorded tender at all falls back to cash for the
/// full header total.
fn load_payments(
    conn: &rusqlite::Connection,
    company_id: i64,
    transaction_id: i64,
    register: &RegisterRow,
    total: f64,
) -> Result<(Vec<SalePayment>, Vec<&'static str>)> {
    let mut payments = Vec::new();
    let mut labels = Vec::new();

    let mut stmt = conn
        .prepare(
            "SELECT amount, card_kind FROM card_payments
             WHERE transaction_id = ?1 AND company_id = ?2
             ORDER BY rowid ASC",
        )
        .map_err(map_sql)?;
    let card_rows = stmt
        .query_map(params![transaction_id, company_id], |row| {
            let amount: f64 = row.get(0)?;
            let kind: Option<String> = row.get(1)?;
            Ok((amount, kind))
        })
        .map_err(map_sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_sql)?;

    for (amount, kind) in card_rows {
        let code = match kind.as_deref().map(str::trim).map(str::to_ascii_uppercase).as_deref()
        {
            Some("CREDIT") => payment::CREDIT_CARD,
            Some("DEBIT") => payment::DEBIT_CARD,
            _ => payment::OTHER,
        };
        payments.push(tender(code, amount));
        labels.push(payment::description(code));
    }

    if register.cash_amount > 0.0 {
        payments.push(tender(payment::CASH, register.cash_amount));
        labels.push(payment::description(payment::CASH));
    }
    if register.cheque_amount > 0.0 {
        payments.push(tender(payment::CHEQUE, register.cheque_amount));
        labels.push(payment::description(payment::CHEQUE));
    }
    if register.other_amount > 0.0 {
        payments.push(tender(payment::OTHER, register.other_amount));
        labels.push(payment::description(payment::OTHER));
    }

    if payments.is_empty() && total > 0.0 {
        payments.push(tender(payment::CASH, total));
        labels.push(payment::description(payment::CASH));
    }

    Ok((payments, labels))
}

fn tender(code: i32, amount: f64) -> SalePayment {
    SalePayment {
        method_code: code,
        amount: round2(amount),
        currency_code: CURRENCY_CODE.to_string(),
        exchange_rate: EXCHANGE_RATE,
    }
}

fn format_recorded_at(recorded_on: &str, recorded_time: Option<&str>) -> Result<String> {
    let date = NaiveDate::parse_from_str(recorded_on, "%Y-%m-%d").map_err(|err| {
        CashlinkError::Payload(format!("invalid register date {recorded_on:?}: {err}"))
    })?;
    let time = match recorded_time {
        Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M:%S").map_err(|err| {
            CashlinkError::Payload(format!("invalid register time {raw:?}: {err}"))
        })?,
        None => NaiveTime::MIN,
    };
    let offset = FixedOffset::east_opt(LOCAL_OFFSET_SECS).ok_or_else(|| {
        CashlinkError::Internal("invalid local offset".into())
    })?;
    let stamped = offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .ok_or_else(|| {
            CashlinkError::Payload(format!(
                "ambiguous local timestamp for {recorded_on} {recorded_time:?}"
            ))
        })?;
    Ok(stamped.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string())
}

/// Barcodes occasionally arrive as floats ("7891000100103.0"); keep digits.
fn clean_barcode(barcode: Option<&str>) -> String {
    match barcode {
        Some(raw) => raw.trim().trim_end_matches(".0").to_string(),
        None => String::new(),
    }
}

fn map_sql(err: rusqlite::Error) -> CashlinkError {
    CashlinkError::from(InfraError::from(err))
}
