//! Solana JSON-RPC payment verifier.
//!
//! A payment is a confirmed transaction containing SPL-token `transfer` or
//! `transferChecked` instructions into a token account owned by the treasury
//! and holding the configured mint. Matching transfers are summed and compared
//! in base units.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{PaymentError, PaymentVerifier, VerifiedPayment};

pub struct RpcPaymentVerifier {
    client: Client,
    rpc_url: String,
    treasury: String,
    token_mint: String,
    decimals: u32,
}

impl RpcPaymentVerifier {
    pub fn new(
        rpc_url: String,
        treasury: String,
        token_mint: String,
        decimals: u32,
        request_timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            rpc_url,
            treasury,
            token_mint,
            decimals,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PaymentError> {
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PaymentError::Rpc(format!("{method}: HTTP {status}: {body}")));
        }

        let mut body: Value = resp.json().await?;
        if let Some(err) = body.get("error") {
            let message = err["message"].as_str().unwrap_or("unknown error");
            return Err(PaymentError::Rpc(format!("{method}: {message}")));
        }
        Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    /// Owner and mint of a token account.
    async fn token_account(&self, address: &str) -> Result<Option<(String, String)>, PaymentError> {
        let result = self
            .call("getAccountInfo", json!([address, { "encoding": "jsonParsed" }]))
            .await?;
        let info = &result["value"]["data"]["parsed"]["info"];
        match (info["owner"].as_str(), info["mint"].as_str()) {
            (Some(owner), Some(mint)) => Ok(Some((owner.to_string(), mint.to_string()))),
            _ => Ok(None),
        }
    }
}

/// A parsed SPL-token transfer.
#[derive(Debug, PartialEq, Eq)]
struct TokenTransfer {
    destination: String,
    authority: Option<String>,
    mint: Option<String>,
    amount: u64,
}

/// Collect token transfers from a `jsonParsed` transaction, including inner
/// instructions.
fn token_transfers(tx: &Value) -> Vec<TokenTransfer> {
    let top = tx["transaction"]["message"]["instructions"].as_array().into_iter().flatten();
    let inner = tx["meta"]["innerInstructions"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|group| group["instructions"].as_array().into_iter().flatten());

    top.chain(inner)
        .filter(|ix| ix["program"] == "spl-token")
        .filter_map(|ix| {
            let parsed = &ix["parsed"];
            let kind = parsed["type"].as_str()?;
            if kind != "transfer" && kind != "transferChecked" {
                return None;
            }
            let info = &parsed["info"];
            let amount = info["amount"]
                .as_str()
                .or_else(|| info["tokenAmount"]["amount"].as_str())?
                .parse()
                .ok()?;
            Some(TokenTransfer {
                destination: info["destination"].as_str()?.to_string(),
                authority: info["authority"]
                    .as_str()
                    .or_else(|| info["multisigAuthority"].as_str())
                    .map(str::to_string),
                mint: info["mint"].as_str().map(str::to_string),
                amount,
            })
        })
        .collect()
}

impl PaymentVerifier for RpcPaymentVerifier {
    async fn verify(
        &self,
        signature: String,
        payer: String,
        min_amount: u64,
    ) -> Result<VerifiedPayment, PaymentError> {
        let tx = self
            .call(
                "getTransaction",
                json!([
                    &signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        if tx.is_null() {
            return Err(PaymentError::NotFound);
        }
        if !tx["meta"]["err"].is_null() {
            return Err(PaymentError::FailedOnChain);
        }

        let mut total: u64 = 0;
        let mut matched = false;
        for transfer in token_transfers(&tx) {
            if transfer.mint.as_deref().is_some_and(|m| m != self.token_mint) {
                continue;
            }
            let Some((owner, mint)) = self.token_account(&transfer.destination).await? else {
                continue;
            };
            if owner != self.treasury || mint != self.token_mint {
                continue;
            }
            if transfer.authority.as_deref().is_some_and(|a| a != payer) {
                return Err(PaymentError::PayerMismatch);
            }
            matched = true;
            total = total.saturating_add(transfer.amount);
        }
        if !matched {
            return Err(PaymentError::NoTransfer);
        }

        let unit = 10u64.saturating_pow(self.decimals);
        let expected = min_amount.saturating_mul(unit);
        debug!(%signature, total, expected, "Token transfer located");
        if total < expected {
            return Err(PaymentError::Insufficient { got: total, expected });
        }
        Ok(VerifiedPayment { amount: total / unit })
    }
}
