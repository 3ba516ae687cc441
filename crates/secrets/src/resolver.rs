//! Secret resolution chain (§4.6).

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use sykli_core::ir::{SecretRef, Task};
use thiserror::Error;

use crate::salt::SaltConfig;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{name}' is unavailable")]
    NotFound { name: String },

    #[error("secret '{name}': failed to read file '{path}': {source}")]
    FileRead {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secret '{name}': vault lookup for key '{key}' failed: {reason}")]
    VaultLookup {
        name: String,
        key: String,
        reason: String,
    },

    #[error("cache-key secrets require a system salt, none configured")]
    MissingSalt,
}

/// The outcome of asking a target's Secrets capability for a value
/// (§4.3 "Secrets": `resolve(name) -> value | not_found | not_supported`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSecretLookup {
    Found(String),
    NotFound,
    NotSupported,
}

/// A target's Secrets capability, looked up by bare name.
///
/// Implemented by each `sykli-targets` driver; kept as a trait here so this
/// crate has no dependency on `sykli-targets` (the driver crate depends on
/// `sykli-secrets`, not the reverse).
pub trait TargetSecrets: Send + Sync {
    fn resolve(&self, name: &str) -> TargetSecretLookup;
}

/// A `from-vault` secret source. No concrete vault backend ships with the
/// engine core; callers inject one (or accept that every `from-vault`
/// reference fails with `VaultLookup`).
pub trait VaultClient: Send + Sync {
    fn lookup(&self, key: &str) -> Result<String, String>;
}

/// A vault client that never resolves anything, used when no vault is
/// configured. Every `from-vault` secret_ref then reports `VaultLookup`.
pub struct NoVault;

impl VaultClient for NoVault {
    fn lookup(&self, key: &str) -> Result<String, String> {
        Err(format!("no vault client configured (key '{key}')"))
    }
}

/// Resolves a task's requested secrets into environment-ready values,
/// following the chain in §4.6: typed `secret_ref` -> target -> bare
/// env fallback.
pub struct SecretResolver<'a> {
    target: &'a dyn TargetSecrets,
    vault: &'a dyn VaultClient,
    salt: SaltConfig,
}

impl<'a> SecretResolver<'a> {
    #[must_use]
    pub fn new(target: &'a dyn TargetSecrets, vault: &'a dyn VaultClient, salt: SaltConfig) -> Self {
        Self { target, vault, salt }
    }

    /// Resolve every secret a task requests (`secrets` names plus any
    /// `secret_refs` not otherwise named) into a map ready to inject as
    /// environment variables. Registers each value with the redaction
    /// registry as it is resolved.
    ///
    /// # Errors
    /// Returns the first `SecretError` encountered; per §4.6 this fails
    /// the task before command execution (`secret_unavailable`).
    pub fn resolve_task_secrets(&self, task: &Task) -> Result<HashMap<String, SecretString>, SecretError> {
        let mut names: Vec<&str> = task.secrets.iter().map(String::as_str).collect();
        for secret_ref in &task.secret_refs {
            let name = secret_ref.name();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let mut resolved = HashMap::with_capacity(names.len());
        for name in names {
            let secret_ref = task.secret_refs.iter().find(|r| r.name() == name);
            let value = self.resolve_one(name, secret_ref)?;
            sykli_events::redaction::register_secret(value.expose_secret());
            resolved.insert(name.to_string(), value);
        }
        Ok(resolved)
    }

    fn resolve_one(&self, name: &str, secret_ref: Option<&SecretRef>) -> Result<SecretString, SecretError> {
        if let Some(secret_ref) = secret_ref {
            return self.resolve_typed(name, secret_ref);
        }

        if let TargetSecretLookup::Found(value) = self.target.resolve(name) {
            return Ok(SecretString::from(value));
        }

        std::env::var(name)
            .map(SecretString::from)
            .map_err(|_| SecretError::NotFound { name: name.to_string() })
    }

    fn resolve_typed(&self, name: &str, secret_ref: &SecretRef) -> Result<SecretString, SecretError> {
        match secret_ref {
            SecretRef::FromEnv { var, .. } => std::env::var(var)
                .map(SecretString::from)
                .map_err(|_| SecretError::NotFound { name: name.to_string() }),
            SecretRef::FromFile { path, .. } => std::fs::read_to_string(path)
                .map(|s| SecretString::from(s.trim_end().to_string()))
                .map_err(|source| SecretError::FileRead {
                    name: name.to_string(),
                    path: path.clone(),
                    source,
                }),
            SecretRef::FromVault { key, .. } => self.vault.lookup(key).map(SecretString::from).map_err(|reason| {
                SecretError::VaultLookup {
                    name: name.to_string(),
                    key: key.clone(),
                    reason,
                }
            }),
        }
    }

    /// Salted fingerprint of a resolved value, for cache-key inclusion.
    ///
    /// # Errors
    /// Returns `MissingSalt` if no salt is configured.
    pub fn fingerprint(&self, name: &str, value: &SecretString) -> Result<String, SecretError> {
        let salt = self.salt.write_salt().ok_or(SecretError::MissingSalt)?;
        Ok(crate::fingerprint::compute_secret_fingerprint(name, value.expose_secret(), salt))
    }
}

/// Values resolved for one task, plus their salted fingerprints for cache
/// keys.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    pub values: HashMap<String, String>,
    pub fingerprints: HashMap<String, String>,
}

impl ResolvedSecrets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}
