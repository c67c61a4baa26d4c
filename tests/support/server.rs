use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use eth_invoice::http;
use eth_invoice::invoice::service::{InvoiceService, InvoiceServiceConfig};
use eth_invoice::invoice::store::SharedInvoiceStore;

use super::chain::MockChainClient;
use super::fixtures::{CONTRACT, MERCHANT, TEST_SIGNING_KEY};
use super::port::get_available_port;
use super::wait::wait_for;

/// Submitter signing with the dev key, defaulting to the test merchant.
pub fn mock_service(
    client: Arc<MockChainClient>,
    store: SharedInvoiceStore,
) -> Result<Arc<InvoiceService<MockChainClient>>> {
    let mut cfg = InvoiceServiceConfig::new(CONTRACT);
    cfg.default_merchant_address = Some(MERCHANT.to_checksum(None));
    let service = InvoiceService::new(cfg, Some(TEST_SIGNING_KEY), client, store)?;
    Ok(Arc::new(service))
}

pub struct ApiServer {
    pub base_url: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub async fn start(service: Arc<InvoiceService<MockChainClient>>) -> Result<Self> {
        let port = get_available_port()?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("bind 127.0.0.1:{port}"))?;
        let base_url = format!("http://127.0.0.1:{port}");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(http::serve(listener, http::router(service), cancel.clone()));

        wait_for("api health", Duration::from_secs(5), || {
            let url = format!("{base_url}/health");
            async move {
                Ok(match reqwest::get(url).await {
                    Ok(resp) if resp.status().is_success() => Some(()),
                    _ => None,
                })
            }
        })
        .await?;

        Ok(Self {
            base_url,
            cancel,
            handle,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .context("api server did not stop")?
            .context("join api server")?
    }
}
