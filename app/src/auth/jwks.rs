use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonwebtoken::DecodingKey;
use log::*;
use serde::{Deserialize, Serialize};
use url::Url;

/// One entry of a JSON Web Key Set. Only RSA signing keys are usable; the
/// other members are kept so that foreign keys still parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(rename = "use", default)]
    pub use_field: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Verification keys indexed by key id.
#[derive(Default)]
pub struct KeySet {
    keys: HashMap<String, DecodingKey>,
}

impl Jwks {
    pub async fn fetch(url: &Url) -> Result<Jwks> {
        info!("Fetching signing keys from {}", url);
        let jwks = reqwest::get(url.clone())
            .await
            .context("fetch jwks")?
            .error_for_status()
            .context("fetch jwks")?
            .json::<Jwks>()
            .await
            .context("decode jwks")?;
        debug!("Fetched {} keys", jwks.keys.len());
        Ok(jwks)
    }
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jwks(jwks: &Jwks) -> Result<Self> {
        let mut keys = KeySet::new();
        keys.add_jwks(jwks)?;
        Ok(keys)
    }

    pub fn add_jwks(&mut self, jwks: &Jwks) -> Result<()> {
        for key in &jwks.keys {
            let (kid, n, e) = match (&key.kid, &key.n, &key.e) {
                (Some(kid), Some(n), Some(e)) if key.kty == "RSA" => (kid, n, e),
                _ => {
                    warn!("Skipping unusable {} key {:?}", key.kty, key.kid);
                    continue;
                }
            };
            let decoding_key = DecodingKey::from_rsa_components(n, e)
                .with_context(|| format!("rsa key {}", kid))?;
            self.keys.insert(kid.clone(), decoding_key);
        }
        Ok(())
    }

    pub fn add_pem(&mut self, kid: &str, pem: &[u8]) -> Result<()> {
        let decoding_key =
            DecodingKey::from_rsa_pem(pem).with_context(|| format!("pem key {}", kid))?;
        self.keys.insert(kid.to_string(), decoding_key);
        Ok(())
    }

    pub fn add_pem_file(&mut self, kid: &str, path: &Path) -> Result<()> {
        let pem = fs::read(path).with_context(|| format!("read {:?}", path))?;
        self.add_pem(kid, &pem)
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_set().entries(self.keys.keys()).finish()
    }
}
