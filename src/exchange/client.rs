use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Credentials;
use crate::exchange::signer::{canonical_json, signed_headers};
use crate::models::Side;
use crate::Result;

/// Authenticated client for the exchange REST API
///
/// Owns the credentials; everything else receives outcomes, never secrets.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    credentials: Credentials,
}

// ============== Request / Response Types ==============

/// Market order payload, built fresh per submission and never mutated after
/// signing
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub product_id: u64,
    pub size: f64,
    pub side: Side,
    pub order_type: &'static str,
}

impl OrderRequest {
    pub fn market(product_id: u64, size: f64, side: Side) -> Self {
        Self {
            product_id,
            size,
            side,
            order_type: "market_order",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    result: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    id: u64,
    symbol: String,
}

/// Classification of an order submission attempt
///
/// All three cases are terminal: there is no internal retry.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// HTTP 200 and the exchange-reported success flag was set
    Filled { raw: String },
    /// The exchange answered but refused the order
    Rejected { message: String },
    /// Network, timeout, or unparsable response
    TransportFailure { message: String },
}

// ============== Implementation ==============

impl ExchangeClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }

    /// Resolve an exchange-native symbol to its numeric product id
    ///
    /// Fatal when it fails: nothing downstream can proceed without the id,
    /// so the error propagates instead of being classified.
    pub async fn resolve_product_id(&self, symbol: &str) -> Result<u64> {
        let url = format!("{}/v2/products", self.credentials.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Product listing failed: HTTP {}", response.status()).into());
        }

        let products: ProductsResponse = response.json().await?;
        products
            .result
            .into_iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.id)
            .ok_or_else(|| format!("Symbol {} not found in product listing", symbol).into())
    }

    /// Set account leverage for a product
    ///
    /// Failure is reported to the caller, which logs and proceeds - the loop
    /// runs with whatever leverage is already configured.
    pub async fn set_leverage(&self, product_id: u64, leverage: u32) -> Result<()> {
        let path = format!("/v2/products/{}/leverage", product_id);
        let body = serde_json::json!({ "leverage": leverage });
        let payload = canonical_json(&body);

        let headers = signed_headers(&self.credentials, "POST", &path, Some(&body));
        let url = format!("{}{}", self.credentials.base_url, path);
        let response = headers
            .apply(self.client.post(&url))
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() && reports_success(&text) {
            Ok(())
        } else {
            Err(format!("Failed to set leverage: {}", text).into())
        }
    }

    /// Submit a market order and classify the response
    ///
    /// Never returns `Err` - every failure mode maps onto an [`OrderOutcome`]
    /// so the caller's bookkeeping can proceed uniformly.
    pub async fn place_order(&self, order: &OrderRequest) -> OrderOutcome {
        let path = "/v2/orders";
        let body = match serde_json::to_value(order) {
            Ok(v) => v,
            Err(e) => {
                return OrderOutcome::TransportFailure {
                    message: format!("Order serialization failed: {}", e),
                }
            }
        };

        // The transmitted bytes are the exact string that was signed
        let payload = canonical_json(&body);
        let headers = signed_headers(&self.credentials, "POST", path, Some(&body));
        let url = format!("{}{}", self.credentials.base_url, path);

        let response = match headers
            .apply(self.client.post(&url))
            .body(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return OrderOutcome::TransportFailure {
                    message: format!("Order request failed: {}", e),
                }
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return OrderOutcome::TransportFailure {
                    message: format!("Order response unreadable: {}", e),
                }
            }
        };

        tracing::debug!("Order response ({}): {}", status, text);

        match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => {
                if status.is_success() && parsed["success"].as_bool().unwrap_or(false) {
                    OrderOutcome::Filled { raw: text }
                } else {
                    OrderOutcome::Rejected {
                        message: rejection_message(&parsed),
                    }
                }
            }
            Err(e) => OrderOutcome::TransportFailure {
                message: format!("Order response unparsable (HTTP {}): {}", status, e),
            },
        }
    }
}

fn reports_success(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .map(|v| v["success"].as_bool().unwrap_or(false))
        .unwrap_or(false)
}

/// Extract a human-readable rejection message from the exchange error payload
fn rejection_message(parsed: &Value) -> String {
    parsed["error"]["message"]
        .as_str()
        .or_else(|| parsed["meta"]["message"].as_str())
        .unwrap_or("Unknown error")
        .to_string()
}
