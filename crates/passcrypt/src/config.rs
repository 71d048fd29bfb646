//! Vault configuration.

use serde::{Deserialize, Serialize};

use passcrypt_perms::CascadeConfig;

use crate::error::Result;

/// Configuration for a [`Vault`](crate::Vault).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Permission cascade tuning.
    pub cascade: CascadeConfig,
    /// Commit message for writes that do not carry one.
    pub default_message: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            cascade: CascadeConfig::default(),
            default_message: passcrypt_api::DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }
}

impl VaultConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_cascade(mut self, cascade: CascadeConfig) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }
}
