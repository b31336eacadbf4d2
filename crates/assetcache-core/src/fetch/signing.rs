//! HMAC-SHA256 request signing for the metadata endpoint.
//!
//! The signature covers, in order: the `X-Date` timestamp (epoch millis),
//! the HTTP method, the request path and the lowercase hex MD5 of the
//! compact JSON body. It is sent as
//! `Authorization: HMAC-SHA256 Credential=<access key>,Signature=<hex>`.

use std::time::{SystemTime, UNIX_EPOCH};

use ring::hmac;
use secrecy::{ExposeSecret, SecretString};

/// Header carrying the signing timestamp.
pub const DATE_HEADER: &str = "X-Date";

/// Signs metadata requests with an access/secret key pair.
pub struct RequestSigner {
    access_key: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Headers produced for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub authorization: String,
}

impl RequestSigner {
    pub fn new(access_key: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key,
        }
    }

    /// A signer only when both keys are configured and non-empty.
    pub fn from_optional(
        access_key: Option<String>,
        secret_key: Option<SecretString>,
    ) -> Option<Self> {
        match (access_key, secret_key) {
            (Some(access), Some(secret))
                if !access.is_empty() && !secret.expose_secret().is_empty() =>
            {
                Some(Self::new(access, secret))
            }
            _ => None,
        }
    }

    /// Hex signature of a request at a given timestamp.
    pub fn signature(&self, timestamp: &str, method: &str, path: &str, body: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, self.secret_key.expose_secret().as_bytes());
        let body_digest = format!("{:x}", md5::compute(body));

        let mut ctx = hmac::Context::with_key(&key);
        ctx.update(timestamp.as_bytes());
        ctx.update(method.as_bytes());
        ctx.update(path.as_bytes());
        ctx.update(body_digest.as_bytes());
        hex::encode(ctx.sign().as_ref())
    }

    /// Signed headers for a request at an explicit timestamp.
    pub fn sign_with_timestamp(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> SignedHeaders {
        let signature = self.signature(timestamp, method, path, body);
        SignedHeaders {
            date: timestamp.to_owned(),
            authorization: format!(
                "HMAC-SHA256 Credential={},Signature={signature}",
                self.access_key
            ),
        }
    }

    /// Signed headers for a request made now.
    pub fn sign(&self, method: &str, path: &str, body: &[u8]) -> SignedHeaders {
        self.sign_with_timestamp(&epoch_millis().to_string(), method, path, body)
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}
