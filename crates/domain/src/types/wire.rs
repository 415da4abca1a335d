//! Wire-format records exchanged with the remote retail platform.
//!
//! Field names follow the platform's JSON schema (Spanish identifiers);
//! Rust-side names stay descriptive and the serde renames carry the wire
//! casing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One sale, cancellation or return as submitted in a movement batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleRecord {
    /// Local timestamp with explicit offset, e.g. `2025-08-01T14:03:00.000-03:00`.
    #[serde(rename = "fecha")]
    pub recorded_at: String,
    /// Zero-padded receipt number; negative (prefixed `-`) for reversals.
    /// This sign is the sole sale/reversal discriminator on the wire.
    #[serde(rename = "numero")]
    pub number: String,
    pub total: f64,
    #[serde(rename = "codigoMoneda")]
    pub currency_code: String,
    #[serde(rename = "cotizacion")]
    pub exchange_rate: f64,
    #[serde(rename = "descuentoTotal")]
    pub discount_total: f64,
    #[serde(rename = "recargoTotal")]
    pub surcharge_total: f64,
    #[serde(rename = "cancelacion")]
    pub reversal: bool,
    #[serde(rename = "codigoCanalVenta")]
    pub channel_code: i32,
    #[serde(rename = "descripcionCanalVenta")]
    pub channel_description: String,
    #[serde(rename = "detalles")]
    pub lines: Vec<SaleLine>,
    #[serde(rename = "pagos")]
    pub payments: Vec<SalePayment>,
}

/// One line item inside a [`SaleRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    #[serde(rename = "codigoArticulo")]
    pub article_code: String,
    #[serde(rename = "codigoBarras")]
    pub barcode: String,
    #[serde(rename = "descripcionArticulo")]
    pub description: String,
    #[serde(rename = "cantidad")]
    pub quantity: f64,
    #[serde(rename = "importeUnitario")]
    pub unit_amount: f64,
    /// Net line amount; all line amounts must foot to the header total.
    #[serde(rename = "importe")]
    pub amount: f64,
    #[serde(rename = "descuento")]
    pub discount: f64,
    #[serde(rename = "recargo")]
    pub surcharge: f64,
}

/// One tender entry inside a [`SaleRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalePayment {
    #[serde(rename = "codigoTipoPago")]
    pub method_code: i32,
    #[serde(rename = "importe")]
    pub amount: f64,
    #[serde(rename = "codigoMoneda")]
    pub currency_code: String,
    #[serde(rename = "cotizacion")]
    pub exchange_rate: f64,
}

/// Consolidated daily closing for one business date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosingRecord {
    /// Business date, `YYYY-MM-DD`.
    #[serde(rename = "fechaVentas")]
    pub sales_date: String,
    #[serde(rename = "montoVentaLiquida")]
    pub net_sales_amount: f64,
    #[serde(rename = "montoCancelaciones")]
    pub cancellations_amount: f64,
    #[serde(rename = "cantidadMovimientos")]
    pub movement_count: i64,
    #[serde(rename = "cantidadCancelaciones")]
    pub cancellation_count: i64,
}

/// Body of a 2xx batch-submission response. A missing or empty `errores`
/// list means full batch acceptance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchResponse {
    #[serde(rename = "idLote", default)]
    pub batch_id: Option<String>,
    #[serde(rename = "errores", default)]
    pub item_errors: Vec<ItemError>,
}

/// Per-item rejection inside an otherwise accepted batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemError {
    /// The record's own identifying number as submitted (sign included).
    #[serde(rename = "numero")]
    pub number: String,
    pub error: ItemErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// One day/station the remote platform wants resent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResendRequest {
    /// Business date, `YYYY-MM-DD`.
    #[serde(rename = "fecha")]
    pub date: String,
    /// Optional station code; absent means every station of the store.
    #[serde(rename = "codigoCaja", default)]
    pub station_code: Option<String>,
}

/// One promotion published by the platform for a store.
///
/// Only identity and labels are typed; the remaining attributes are kept
/// verbatim so the POS can interpret them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    #[serde(rename = "idPromocion")]
    pub id: i64,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "tipo", default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
