//! Credentials and secret handling

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{E2eError, E2eResult};

pub const EMAIL_VAR: &str = "EMAIL";
pub const PASSWORD_VAR: &str = "PASSWORD";

/// Login credentials for the hosted app
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Load credentials from the process environment, reading `.env` first if present
    pub fn from_env() -> E2eResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through an arbitrary key lookup.
    ///
    /// Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| E2eError::MissingConfig { key: key.to_string() })
        };

        Ok(Self {
            email: required(EMAIL_VAR)?,
            password: required(PASSWORD_VAR)?,
        })
    }

    /// Environment entries handed to the browser script
    pub fn to_secrets(&self) -> Secrets {
        let mut secrets = Secrets::default();
        secrets.insert(EMAIL_VAR, &self.email);
        secrets.insert(PASSWORD_VAR, &self.password);
        secrets
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a scenario gets its credentials from
#[derive(Debug, Clone, Default)]
pub enum CredentialSource {
    /// Process environment plus `.env`
    #[default]
    Env,
    /// Explicit key/value pairs
    Vars(BTreeMap<String, String>),
}

impl CredentialSource {
    pub fn resolve(&self) -> E2eResult<Credentials> {
        match self {
            CredentialSource::Env => Credentials::from_env(),
            CredentialSource::Vars(vars) => Credentials::from_lookup(|key| vars.get(key).cloned()),
        }
    }
}

/// Environment variables passed to the script process, never written into script text
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
