//! Service API client (storefront backend → settlement server).

use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::{
    AnomalyResponse, CheckoutResponse, CreateOrderRequest, GetOrderRequest, ListAnomaliesRequest,
    OrderResponse,
};
use crate::signature::{SIGNATURE_HEADER, Signature, SignedObject};

/// Typed HTTP client for the **Service API**.
///
/// Every request body is signed with
/// `HMAC-SHA256("{timestamp}.{json}", service_secret)`.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl ServiceClient {
    /// * `base_url` – root URL of the settlement server.
    /// * `service_secret` – the shared HMAC secret for body signing.
    pub fn new(base_url: Url, service_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: service_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` (timeouts, proxies, …).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/service/orders` – record a new pending order.
    pub async fn create_order(
        &self,
        order: CreateOrderRequest,
    ) -> Result<OrderResponse, ClientError> {
        self.post("/api/v1/service/orders", order).await
    }

    /// `POST /api/v1/service/checkout` – record an order and get the signed
    /// gateway redirect for it.
    pub async fn checkout(
        &self,
        order: CreateOrderRequest,
    ) -> Result<CheckoutResponse, ClientError> {
        self.post("/api/v1/service/checkout", order).await
    }

    /// `POST /api/v1/service/orders/status` – current state of an order.
    pub async fn get_order_status(&self, order_id: Uuid) -> Result<OrderResponse, ClientError> {
        self.post("/api/v1/service/orders/status", GetOrderRequest { order_id })
            .await
    }

    /// `POST /api/v1/service/anomalies` – most recent notifications parked
    /// for manual review.
    pub async fn list_anomalies(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<AnomalyResponse>, ClientError> {
        self.post("/api/v1/service/anomalies", ListAnomaliesRequest { limit })
            .await
    }

    async fn post<B: Signature, R: DeserializeOwned>(
        &self,
        path: &str,
        body: B,
    ) -> Result<R, ClientError> {
        let signed = SignedObject::new(body, &self.secret)?;
        let url = self.base_url.join(path)?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
