use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Create {
        /// Decimal ETH amount, e.g. 0.01
        #[arg(long)]
        amount_eth: String,

        #[arg(long)]
        expiry_minutes: i64,

        #[arg(long)]
        merchant_address: Option<String>,
    },
    Get {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    eth_invoice::logging::init().ok();
    let args = Args::parse();

    let base = args.api_url.trim_end_matches('/');
    let client = reqwest::Client::new();

    let resp = match args.command {
        Command::Create {
            amount_eth,
            expiry_minutes,
            merchant_address,
        } => {
            let mut body = json!({
              "amountEth": amount_eth,
              "expiryMinutes": expiry_minutes,
            });
            if let Some(merchant) = merchant_address {
                body["merchantAddress"] = json!(merchant);
            }
            client
                .post(format!("{base}/invoices"))
                .json(&body)
                .send()
                .await
                .context("POST /invoices")?
        }
        Command::Get { id } => client
            .get(format!("{base}/invoices/{id}"))
            .send()
            .await
            .with_context(|| format!("GET /invoices/{id}"))?,
    };

    let status = resp.status();
    let out: serde_json::Value = resp.json().await.context("decode response body")?;
    if !status.is_success() {
        let message = out
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| out.to_string());
        anyhow::bail!("request failed ({status}): {message}");
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
