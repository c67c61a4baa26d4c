use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::InvoiceError;
use crate::ethereum::ChainClient;
use crate::invoice::amount::wei_to_eth_display;
use crate::invoice::service::{CreateInvoiceRequest, InvoiceService};
use crate::invoice::{Invoice, InvoiceStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceBody {
    #[serde(default, alias = "merchant_address")]
    pub merchant_address: Option<String>,
    #[serde(alias = "amount_eth")]
    pub amount_eth: AmountInput,
    #[serde(alias = "expiry_minutes")]
    pub expiry_minutes: i64,
}

/// JSON shape of an invoice returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_invoice_id: Option<String>,
    pub merchant_address: String,
    pub amount_wei: String,
    pub amount_eth: String,
    pub status: InvoiceStatus,
    pub expires_at: DateTime<Utc>,
    pub contract_address: String,
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceView {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.clone(),
            onchain_invoice_id: invoice.onchain_invoice_id.map(|id| id.to_string()),
            merchant_address: invoice.merchant_address.clone(),
            amount_wei: invoice.amount_wei.to_string(),
            amount_eth: wei_to_eth_display(invoice.amount_wei),
            status: invoice.status,
            expires_at: invoice.expires_at,
            contract_address: invoice.contract_address.clone(),
            tx_hash: invoice.tx_hash.clone(),
            payer_address: invoice.payer_address.clone(),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

impl IntoResponse for InvoiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            InvoiceError::Validation(_) => StatusCode::BAD_REQUEST,
            InvoiceError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.is_client_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router<C>(service: Arc<InvoiceService<C>>) -> Router
where
    C: ChainClient + 'static,
{
    let invoices = Router::new()
        .route("/invoices", post(create_invoice::<C>))
        .route("/invoices/{id}", get(get_invoice::<C>));

    Router::new()
        .route("/health", get(health))
        .merge(invoices.clone())
        // the web frontend calls the API under /api
        .nest("/api", invoices)
        .with_state(service)
}

pub async fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("serve http")
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_invoice<C>(
    State(service): State<Arc<InvoiceService<C>>>,
    body: Result<Json<CreateInvoiceBody>, JsonRejection>,
) -> Result<(StatusCode, Json<InvoiceView>), InvoiceError>
where
    C: ChainClient + 'static,
{
    let Json(body) = body.map_err(|e| InvoiceError::Validation(e.body_text()))?;
    let invoice = service
        .create_invoice(CreateInvoiceRequest {
            merchant_address: body.merchant_address,
            amount_eth: body.amount_eth.into_text(),
            expiry_minutes: body.expiry_minutes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(InvoiceView::from(&invoice))))
}

async fn get_invoice<C>(
    State(service): State<Arc<InvoiceService<C>>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceView>, InvoiceError>
where
    C: ChainClient + 'static,
{
    let invoice = service.get_invoice(&id).await?;
    Ok(Json(InvoiceView::from(&invoice)))
}
