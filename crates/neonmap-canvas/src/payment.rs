//! Payment verification capability.
//!
//! A verifier confirms that a transaction identified by its signature moved at
//! least a given amount of the payment token from the payer to the treasury.
//! Replay protection is not the verifier's job: callers record the signature
//! in the payment log, whose uniqueness is the only replay guard.

mod rpc;

pub use rpc::RpcPaymentVerifier;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::warn;

/// Reasons a payment was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("transaction not found")]
    NotFound,

    #[error("transaction failed on chain")]
    FailedOnChain,

    #[error("no token transfer to the treasury found in transaction")]
    NoTransfer,

    #[error("insufficient payment: got {got}, expected {expected}")]
    Insufficient { got: u64, expected: u64 },

    #[error("transfer was not sent by the paying wallet")]
    PayerMismatch,

    #[error("verification timed out")]
    Timeout,

    #[error("verification failed: {0}")]
    Rpc(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        PaymentError::Rpc(e.to_string())
    }
}

/// A payment the verifier accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Amount transferred, in whole token units (rounded down).
    pub amount: u64,
}

/// External payment check, keyed by transaction signature.
///
/// Takes owned strings so the boxed form below can be used behind `dyn`.
pub trait PaymentVerifier: Send + Sync {
    /// Confirm `signature` transferred at least `min_amount` whole tokens from
    /// `payer` to the treasury.
    fn verify(
        &self,
        signature: String,
        payer: String,
        min_amount: u64,
    ) -> impl Future<Output = Result<VerifiedPayment, PaymentError>> + Send;
}

/// Object-safe wrapper for [`PaymentVerifier`].
pub trait PaymentVerifierBoxed: Send + Sync {
    fn verify(
        &self,
        signature: String,
        payer: String,
        min_amount: u64,
    ) -> Pin<Box<dyn Future<Output = Result<VerifiedPayment, PaymentError>> + Send + '_>>;
}

impl<T: PaymentVerifier> PaymentVerifierBoxed for T {
    fn verify(
        &self,
        signature: String,
        payer: String,
        min_amount: u64,
    ) -> Pin<Box<dyn Future<Output = Result<VerifiedPayment, PaymentError>> + Send + '_>> {
        Box::pin(PaymentVerifier::verify(self, signature, payer, min_amount))
    }
}

/// Run a verification bounded by `timeout`.
pub async fn verify_within(
    verifier: &dyn PaymentVerifierBoxed,
    signature: &str,
    payer: &str,
    min_amount: u64,
    timeout: Duration,
) -> Result<VerifiedPayment, PaymentError> {
    let call = verifier.verify(signature.to_string(), payer.to_string(), min_amount);
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(signature, payer, ?timeout, "Payment verification timed out");
            Err(PaymentError::Timeout)
        }
    }
}

/// Development verifier: any well-formed signature pays exactly the price.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevPaymentVerifier;

impl PaymentVerifier for DevPaymentVerifier {
    async fn verify(
        &self,
        signature: String,
        _payer: String,
        min_amount: u64,
    ) -> Result<VerifiedPayment, PaymentError> {
        if signature.trim().is_empty() {
            return Err(PaymentError::NotFound);
        }
        Ok(VerifiedPayment { amount: min_amount })
    }
}
