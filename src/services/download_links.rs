//! Short-lived signed links for downloading artifacts.
//!
//! Signature = base64url(HMAC-SHA256(signing key, "{key}\n{expires}")).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid signing key")]
    InvalidSigningKey(#[from] InvalidLength),

    #[error("public base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),

    #[error("download link expired")]
    Expired,

    #[error("invalid download link signature")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLink {
    pub url: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct LinkSigner {
    mac: HmacSha256,
    public_base_url: String,
    ttl_secs: u64,
}

impl LinkSigner {
    pub fn new(signing_key: &str, public_base_url: &str, ttl_secs: u64) -> Result<Self, LinkError> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(signing_key.as_bytes())?,
            public_base_url: public_base_url.to_string(),
            ttl_secs,
        })
    }

    fn keyed(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{}\n{}", key, expires).as_bytes());
        mac
    }

    pub fn signature(&self, key: &str, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.keyed(key, expires).finalize().into_bytes())
    }

    /// Link to `/artifacts/{key}` valid until `now_secs + ttl`
    pub fn presign(&self, key: &str, now_secs: i64) -> Result<SignedLink, LinkError> {
        let expires_at = now_secs + self.ttl_secs as i64;

        let mut url = Url::parse(&self.public_base_url)
            .map_err(|e| LinkError::InvalidBaseUrl(format!("{}: {}", self.public_base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| LinkError::InvalidBaseUrl(self.public_base_url.clone()))?
            .pop_if_empty()
            .push("artifacts")
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires_at.to_string())
            .append_pair("signature", &self.signature(key, expires_at));

        Ok(SignedLink {
            url: url.to_string(),
            expires_at,
        })
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now_secs: i64) -> Result<(), LinkError> {
        if expires < now_secs {
            return Err(LinkError::Expired);
        }
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| LinkError::BadSignature)?;
        self.keyed(key, expires)
            .verify_slice(&provided)
            .map_err(|_| LinkError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> LinkSigner {
        LinkSigner::new("test-signing-key", "http://localhost:3000", 600).unwrap()
    }

    #[test]
    fn test_presign_layout() {
        let link = signer().presign("bitget-orders/1700000000000.json", 1_000).unwrap();
        assert_eq!(link.expires_at, 1_600);
        assert!(link
            .url
            .starts_with("http://localhost:3000/artifacts/bitget-orders/1700000000000.json?expires=1600&signature="));
    }

    #[test]
    fn test_verify_roundtrip_and_expiry() {
        let signer = signer();
        let key = "bitget-orders/1.json";
        let signature = signer.signature(key, 1_600);

        assert!(signer.verify(key, 1_600, &signature, 1_000).is_ok());
        assert!(matches!(signer.verify(key, 1_600, &signature, 1_601), Err(LinkError::Expired)));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signer = signer();
        let signature = signer.signature("bitget-orders/1.json", 1_600);

        assert!(matches!(
            signer.verify("bitget-orders/2.json", 1_600, &signature, 1_000),
            Err(LinkError::BadSignature)
        ));
        assert!(matches!(
            signer.verify("bitget-orders/1.json", 1_700, &signature, 1_000),
            Err(LinkError::BadSignature)
        ));
        assert!(matches!(
            signer.verify("bitget-orders/1.json", 1_600, "not base64!", 1_000),
            Err(LinkError::BadSignature)
        ));

        let other = LinkSigner::new("other-key", "http://localhost:3000", 600).unwrap();
        assert!(other.verify("bitget-orders/1.json", 1_600, &signature, 1_000).is_err());
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let signer = LinkSigner::new("k", "https://example.com/pipeline/", 60).unwrap();
        let link = signer.presign("a/b.json", 0).unwrap();
        assert!(link.url.starts_with("https://example.com/pipeline/artifacts/a/b.json?expires=60&"));
    }
}
