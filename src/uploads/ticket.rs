//! Signed upload tickets
//!
//! A ticket lets a client push bytes for exactly one destination path, up to a
//! size ceiling, before an expiry. Tokens have the form
//! `base64url(claims_json) "." hex(hmac_sha256(secret, base64url(claims_json)))`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    #[error("malformed ticket")]
    Malformed,

    #[error("ticket signature does not match")]
    BadSignature,

    #[error("ticket has expired")]
    Expired,

    #[error("ticket has already been used")]
    AlreadyUsed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketClaims {
    pub pathname: String,
    pub max_size_bytes: u64,
    /// Epoch milliseconds.
    pub expires_at: i64,
    pub client_id: String,
    pub nonce: String,
}

pub struct TicketSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl TicketSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl,
        }
    }

    /// Signer with a random per-process key. Tickets do not survive a restart.
    pub fn ephemeral(ttl: Duration) -> Self {
        let key: [u8; 32] = rand::random();
        Self::new(key, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn claims_for(
        &self,
        pathname: &str,
        max_size_bytes: u64,
        client_id: &str,
        now_ms: i64,
    ) -> TicketClaims {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        TicketClaims {
            pathname: pathname.to_string(),
            max_size_bytes,
            expires_at: now_ms.saturating_add(ttl_ms),
            client_id: client_id.to_string(),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn sign(&self, claims: &TicketClaims) -> Result<String, TicketError> {
        let json = serde_json::to_vec(claims).map_err(|_| TicketError::Malformed)?;
        let payload = B64.encode(json);
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str, now_ms: i64) -> Result<TicketClaims, TicketError> {
        let (payload, signature) = token.split_once('.').ok_or(TicketError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TicketError::Malformed)?;

        // verify_slice compares in constant time
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| TicketError::BadSignature)?;

        let json = B64.decode(payload).map_err(|_| TicketError::Malformed)?;
        let claims: TicketClaims =
            serde_json::from_slice(&json).map_err(|_| TicketError::Malformed)?;

        if now_ms > claims.expires_at {
            return Err(TicketError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, TicketError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| TicketError::Malformed)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

/// Nonces of redeemed tickets, each kept until its ticket expires.
#[derive(Clone, Default)]
pub struct RedeemedTickets {
    nonces: Arc<Mutex<HashMap<String, i64>>>,
}

impl RedeemedTickets {
    /// Marks the ticket as used. Fails if it was redeemed before.
    pub async fn redeem(&self, claims: &TicketClaims, now_ms: i64) -> Result<(), TicketError> {
        let mut nonces = self.nonces.lock().await;
        // Expired tickets fail verification, so their nonces can go.
        nonces.retain(|_, expires_at| *expires_at >= now_ms);

        if nonces.contains_key(&claims.nonce) {
            return Err(TicketError::AlreadyUsed);
        }
        nonces.insert(claims.nonce.clone(), claims.expires_at);
        Ok(())
    }

    pub async fn release(&self, nonce: &str) {
        self.nonces.lock().await.remove(nonce);
    }

    pub async fn len(&self) -> usize {
        self.nonces.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nonces.lock().await.is_empty()
    }
}
