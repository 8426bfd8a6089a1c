//! # collaborators::balance_http
//!
//! **Balance Custody client**: talks to the ledger service over HTTP.
//!
//! ## Ledger API Contract
//! ```text
//! GET /balances/{account_id}  → 200 { "balance_id": "…", "account_id": "…", "balance": 1000.0 }
//!                               404 when the account has no ledger entry
//! PUT /balances/{account_id}  ← { "balance_id": "…", "account_id": "…", "balance": 900.0 }
//! ```
//! The ledger speaks `f64`; conversion to/from fixed-point happens here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use super::BalanceCustody;
use crate::decimal;
use crate::error::CollaboratorError;
use crate::models::Balance;

// ─── Wire Format ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct BalanceDto {
    balance_id: Uuid,
    account_id: Uuid,
    balance:    f64,
}

impl BalanceDto {
    fn from_balance(balance: &Balance) -> Result<Self, CollaboratorError> {
        let amount = decimal::try_to_f64(&balance.available)
            .map_err(|e| CollaboratorError::Unavailable(format!("unsendable balance: {e}")))?;
        Ok(Self {
            balance_id: balance.balance_id,
            account_id: balance.account_id,
            balance:    amount,
        })
    }

    fn into_balance(self) -> Result<Balance, CollaboratorError> {
        let available = decimal::money(self.balance)
            .map_err(|e| CollaboratorError::Unavailable(format!("malformed balance: {e}")))?;
        Ok(Balance {
            balance_id: self.balance_id,
            account_id: self.account_id,
            available,
        })
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct HttpBalanceCustody {
    client:   reqwest::Client,
    base_url: String,
    timeout:  Duration,
}

impl HttpBalanceCustody {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, account_id: Uuid) -> String {
        format!("{}/balances/{account_id}", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> CollaboratorError {
        if err.is_timeout() {
            CollaboratorError::Timeout(self.timeout)
        } else {
            error!(error = %err, "Balance service unreachable");
            CollaboratorError::Unavailable(format!("balance service unreachable: {err}"))
        }
    }
}

#[async_trait]
impl BalanceCustody for HttpBalanceCustody {
    async fn get_balance(&self, account_id: Uuid) -> Result<Balance, CollaboratorError> {
        let url = self.url(account_id);
        debug!(%account_id, %url, "Fetching balance");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // ── HTTP Status ───────────────────────────────────────────────────────
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(CollaboratorError::NotFound(format!("account {account_id}")));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                error!(http_status = %status, body = %body, "Balance service returned HTTP error");
                return Err(CollaboratorError::Unavailable(format!("HTTP {status}: {body}")));
            }
            _ => {}
        }

        // ── Parse Response ────────────────────────────────────────────────────
        let dto: BalanceDto = response.json().await.map_err(|e| {
            error!(error = %e, "Balance response parse failed");
            CollaboratorError::Unavailable(format!("balance response parse error: {e}"))
        })?;

        dto.into_balance()
    }

    async fn update_balance(&self, balance: &Balance) -> Result<(), CollaboratorError> {
        let url = self.url(balance.account_id);
        let body = BalanceDto::from_balance(balance)?;
        debug!(account_id = %balance.account_id, available = %balance.available, "Updating balance");

        let response = self
            .client
            .put(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "Balance update rejected");
            return Err(CollaboratorError::Unavailable(format!("HTTP {status}: {body}")));
        }

        Ok(())
    }
}
