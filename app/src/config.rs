use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use infra::pool::PostgresConfig;

use crate::auth::{Jwks, KeySet, TokenVerifier};
use crate::menu::PatchSemantics;

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Without this section drinks are kept in memory only.
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub menu: MenuConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider tenant, e.g. `coffee.eu.auth0.com`.
    #[serde(default)]
    pub domain: Option<String>,
    pub audience: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<Url>,
    /// Seconds of clock skew tolerated on `exp`.
    #[serde(default)]
    pub leeway: u64,
    #[serde(default)]
    pub keys: Vec<StaticKey>,
}

/// A locally configured RSA public key, used alongside (or instead of) the
/// provider's published key set.
#[derive(Deserialize, Debug, Clone)]
pub struct StaticKey {
    pub kid: String,
    pub pem_path: PathBuf,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct MenuConfig {
    #[serde(default)]
    pub patch: PatchSemantics,
}

/// Settings that may also come from the process environment, which wins over
/// the config file.
#[derive(Deserialize, Debug, Default)]
pub struct EnvOverrides {
    pub database_url: Option<String>,
    pub auth0_domain: Option<String>,
    pub api_audience: Option<String>,
    pub listen_addr: Option<SocketAddr>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
    let config = toml::from_str(&buf).with_context(|| format!("parse config {:?}", path))?;
    Ok(config)
}

impl Config {
    pub fn apply(&mut self, env: &EnvOverrides) {
        self.postgres = env.postgres(self.postgres.take());
        if let Some(domain) = env.auth0_domain.as_ref() {
            self.auth.domain = Some(domain.clone());
        }
        if let Some(audience) = env.api_audience.as_ref() {
            self.auth.audience = audience.clone();
        }
    }
}

impl AuthConfig {
    pub fn issuer(&self) -> Result<String> {
        match (&self.issuer, &self.domain) {
            (Some(issuer), _) => Ok(issuer.clone()),
            (None, Some(domain)) => Ok(format!("https://{}/", domain)),
            (None, None) => bail!("auth needs either a domain or an issuer"),
        }
    }

    pub fn jwks_url(&self) -> Result<Option<Url>> {
        if let Some(url) = self.jwks_url.as_ref() {
            return Ok(Some(url.clone()));
        }
        match self.domain.as_ref() {
            Some(domain) => {
                let url = format!("https://{}/.well-known/jwks.json", domain);
                let url = Url::parse(&url).with_context(|| format!("jwks url for {:?}", domain))?;
                Ok(Some(url))
            }
            None => Ok(None),
        }
    }

    /// Loads every configured key and builds the verifier. The remote key
    /// set is fetched once; later rotations need a restart.
    pub async fn verifier(&self) -> Result<TokenVerifier> {
        let mut keys = KeySet::new();
        for key in self.keys.iter() {
            keys.add_pem_file(&key.kid, &key.pem_path)?;
        }
        if let Some(url) = self.jwks_url()? {
            let jwks = Jwks::fetch(&url).await?;
            keys.add_jwks(&jwks)?;
        }
        if keys.is_empty() {
            bail!("no usable signing keys configured");
        }

        let issuer = self.issuer()?;
        info!(
            "Accepting tokens from {} for {:?} signed by {:?}",
            issuer, self.audience, keys
        );
        Ok(TokenVerifier::new(
            &issuer,
            &self.audience,
            self.leeway,
            keys,
        ))
    }
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        let env = envy::from_env::<EnvOverrides>().context("read environment")?;
        Ok(env)
    }

    pub fn postgres(&self, section: Option<PostgresConfig>) -> Option<PostgresConfig> {
        match (self.database_url.as_ref(), section) {
            (Some(url), Some(section)) => Some(PostgresConfig {
                url: url.clone(),
                ..section
            }),
            (Some(url), None) => Some(PostgresConfig::new(url)),
            (None, section) => section,
        }
    }
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}
