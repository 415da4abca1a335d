//! Typed client for the retail platform's REST API, implemented on top of
//! the failover [`Transport`].
//!
//! Batch submissions fold expected HTTP failures into a [`BatchResult`];
//! only configuration faults and programmer errors surface as `Err`.

use async_trait::async_trait;
use cashlink_domain::{
    BatchResponse, BatchResult, ClosingRecord, Promotion, ResendRequest, Result, SaleRecord,
    StoreConfig,
};
use cashlink_core::RetailClient;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{Transport, TransportOutcome};

/// Promotion kinds the engine asks the platform for.
const PROMOTION_KINDS: &str = "LLEVA_PAGA,PRECIO_FIJO,DESCUENTO_VARIABLE,DESCUENTO_FIJO";

pub struct RetailApiClient {
    transport: Transport,
}

impl RetailApiClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    async fn submit_batch(
        &self,
        store: &StoreConfig,
        path: String,
        payload: Value,
    ) -> Result<BatchResult> {
        // Correlates the submission with the platform's server-side logs.
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let headers = vec![("x-correlation-id".to_string(), correlation_id.clone())];

        let outcome = self
            .transport
            .execute(&store.base_urls, &path, Method::POST, Some(&payload), &headers)
            .await?;

        let result = match outcome {
            TransportOutcome::Response { status, body } if (200..300).contains(&status) => {
                let response: BatchResponse = parse_batch_body(&body);
                BatchResult::accepted(status, response.batch_id, response.item_errors)
            }
            TransportOutcome::Response { status, body } => {
                BatchResult::rejected(status, body_message(&body, status))
            }
            TransportOutcome::Unavailable { message } => {
                BatchResult::transport_failure(message)
            }
        };

        debug!(
            path = %path,
            correlation_id = %correlation_id,
            status = result.http_status,
            item_errors = result.item_errors.len(),
            "batch submission finished"
        );
        Ok(result)
    }

    async fn fetch_list<T>(&self, store: &StoreConfig, path: String) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let outcome =
            self.transport.execute(&store.base_urls, &path, Method::GET, None, &[]).await?;

        match outcome {
            TransportOutcome::Response { status, body } if (200..300).contains(&status) => {
                // Some endpoints wrap the list in a `results` envelope.
                let list = body.get("results").cloned().unwrap_or(body);
                if list.is_null() {
                    return Ok(Vec::new());
                }
                serde_json::from_value(list).map_err(|err| {
                    cashlink_domain::CashlinkError::Internal(format!(
                        "unexpected response shape from {path}: {err}"
                    ))
                })
            }
            TransportOutcome::Response { status, body } => Err(
                cashlink_domain::CashlinkError::Network(body_message(&body, status)),
            ),
            TransportOutcome::Unavailable { message } => {
                Err(cashlink_domain::CashlinkError::Network(message))
            }
        }
    }
}

#[async_trait]
impl RetailClient for RetailApiClient {
    async fn submit_sales_batch(
        &self,
        store: &StoreConfig,
        station_code: &str,
        records: &[SaleRecord],
    ) -> Result<BatchResult> {
        // The batch body is the bare array of movements.
        let path = format!(
            "/api-minoristas/api/v2/minoristas/{}/locales/{}/cajas/{}/movimientos/lotes",
            store.company_id, store.location_id, station_code
        );
        self.submit_batch(store, path, serde_json::to_value(records).map_err(internal)?).await
    }

    async fn submit_closings_batch(
        &self,
        store: &StoreConfig,
        station_code: &str,
        records: &[ClosingRecord],
    ) -> Result<BatchResult> {
        let path = format!(
            "/api-minoristas/api/v2/minoristas/{}/locales/{}/cajas/{}/cierresDiarios/lotes",
            store.company_id, store.location_id, station_code
        );
        self.submit_batch(store, path, serde_json::to_value(records).map_err(internal)?).await
    }

    async fn fetch_promotions(&self, store: &StoreConfig) -> Result<Vec<Promotion>> {
        let path = format!(
            "/pmkt-rest-api/v2/minoristas/{}/locales/{}/promociones?estado=ACEPTADA&tipo={}",
            store.company_id, store.location_id, PROMOTION_KINDS
        );
        self.fetch_list(store, path).await
    }

    async fn fetch_sales_resend_requests(
        &self,
        store: &StoreConfig,
    ) -> Result<Vec<ResendRequest>> {
        let path = format!(
            "/api-minoristas/api/v2/minoristas/{}/locales/{}/solicitudes/movimientos",
            store.company_id, store.location_id
        );
        self.fetch_list(store, path).await
    }

    async fn fetch_closing_resend_requests(
        &self,
        store: &StoreConfig,
    ) -> Result<Vec<ResendRequest>> {
        let path = format!(
            "/api-minoristas/api/v2/minoristas/{}/locales/{}/solicitudes/cierresDiarios",
            store.company_id, store.location_id
        );
        self.fetch_list(store, path).await
    }
}

fn parse_batch_body(body: &Value) -> BatchResponse {
    match serde_json::from_value(body.clone()) {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "unparseable batch response body; treating as accepted");
            BatchResponse::default()
        }
    }
}

fn body_message(body: &Value, status: u16) -> String {
    match body {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Null => format!("HTTP {status}"),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn internal(err: serde_json::Error) -> cashlink_domain::CashlinkError {
    cashlink_domain::CashlinkError::Internal(format!("payload serialization failed: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cashlink_domain::BatchStatus;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::HttpClient;

    fn client() -> RetailApiClient {
        let http = HttpClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_attempts(2)
            .build()
            .expect("http client");
        RetailApiClient::new(Transport::from_parts(
            http,
            "user",
            "pass",
            "8.1.0",
            "8.0.4",
            Duration::from_millis(5),
        ))
    }

    fn store(uri: String) -> StoreConfig {
        StoreConfig {
            company_id: 9001,
            location_id: 17,
            erp_company_id: 1,
            base_urls: vec![uri],
        }
    }

    fn sample_record(number: &str) -> SaleRecord {
        SaleRecord {
            recorded_at: "2025-08-01T10:00:00.000-03:00".into(),
            number: number.into(),
            total: 10.0,
            currency_code: "986".into(),
            exchange_rate: 1.0,
            discount_total: 0.0,
            surcharge_total: 0.0,
            reversal: number.starts_with('-'),
            channel_code: 1,
            channel_description: "IN-STORE-CASH".into(),
            lines: vec![],
            payments: vec![],
        }
    }

    #[tokio::test]
    async fn sales_batch_posts_to_the_templated_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api-minoristas/api/v2/minoristas/9001/locales/17/cajas/00003/movimientos/lotes"))
            .and(body_partial_json(serde_json::json!([{"numero": "00000042"}])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"idLote": "L-55", "errores": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .submit_sales_batch(&store(server.uri()), "00003", &[sample_record("00000042")])
            .await
            .expect("batch result");

        assert!(result.is_fully_accepted());
        assert_eq!(result.batch_id.as_deref(), Some("L-55"));
    }

    #[tokio::test]
    async fn partial_errors_survive_the_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idLote": "L-56",
                "errores": [
                    {"numero": "-00000042", "error": {"code": 1201, "message": "no sale"}}
                ]
            })))
            .mount(&server)
            .await;

        let result = client()
            .submit_sales_batch(&store(server.uri()), "00003", &[sample_record("-00000042")])
            .await
            .expect("batch result");

        assert_eq!(result.status, BatchStatus::Accepted);
        assert!(!result.is_fully_accepted());
        assert_eq!(result.item_errors.len(), 1);
        assert_eq!(result.item_errors[0].number, "-00000042");
    }

    #[tokio::test]
    async fn http_4xx_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "bad station"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .submit_sales_batch(&store(server.uri()), "00003", &[sample_record("00000001")])
            .await
            .expect("batch result");

        assert_eq!(result.status, BatchStatus::Rejected);
        assert_eq!(result.http_status, 400);
        assert_eq!(result.message.as_deref(), Some("bad station"));
    }

    #[tokio::test]
    async fn unreachable_hosts_map_to_transport_failure() {
        let mut cfg = store("http://127.0.0.1:9".into());
        cfg.base_urls = vec!["http://127.0.0.1:9".into()];

        let result = client()
            .submit_sales_batch(&cfg, "00003", &[sample_record("00000001")])
            .await
            .expect("batch result");

        assert_eq!(result.status, BatchStatus::TransportFailure);
        assert_eq!(result.http_status, 503);
    }

    #[tokio::test]
    async fn closings_use_their_own_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api-minoristas/api/v2/minoristas/9001/locales/17/cajas/00017/cierresDiarios/lotes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"idLote": "L-77"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let record = ClosingRecord {
            sales_date: "2025-08-01".into(),
            net_sales_amount: 1500.0,
            cancellations_amount: 30.0,
            movement_count: 90,
            cancellation_count: 2,
        };
        let result = client()
            .submit_closings_batch(&store(server.uri()), "00017", &[record])
            .await
            .expect("batch result");

        assert!(result.is_fully_accepted());
        assert_eq!(result.batch_id.as_deref(), Some("L-77"));
    }

    #[tokio::test]
    async fn promotions_unwrap_the_results_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pmkt-rest-api/v2/minoristas/9001/locales/17/promociones"))
            .and(query_param("estado", "ACEPTADA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"idPromocion": 1, "tipo": "PRECIO_FIJO", "precio": 9.9},
                    {"idPromocion": 2, "descripcion": "take 3 pay 2"}
                ]
            })))
            .mount(&server)
            .await;

        let promotions =
            client().fetch_promotions(&store(server.uri())).await.expect("promotions");

        assert_eq!(promotions.len(), 2);
        assert_eq!(promotions[0].id, 1);
        assert_eq!(promotions[1].description.as_deref(), Some("take 3 pay 2"));
    }

    #[tokio::test]
    async fn resend_requests_parse_the_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api-minoristas/api/v2/minoristas/9001/locales/17/solicitudes/movimientos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"fecha": "2025-07-30", "codigoCaja": "00003"},
                {"fecha": "2025-07-29"}
            ])))
            .mount(&server)
            .await;

        let requests = client()
            .fetch_sales_resend_requests(&store(server.uri()))
            .await
            .expect("resend requests");

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].station_code.as_deref(), Some("00003"));
        assert!(requests[1].station_code.is_none());
    }
}
