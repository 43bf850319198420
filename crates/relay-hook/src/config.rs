//! Relay settings.

use parking_lot::RwLock;
use relay_forward::{ForwardTarget, TOKEN_ENV_VAR};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default name of the protected administrative role.
pub const DEFAULT_PRIVILEGED_ROLE: &str = "neon_superuser";

/// Configuration for the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Control plane endpoint. Nothing is sent while unset.
    pub console_url: Option<String>,
    /// Forward tracked statements to the control plane.
    pub forward_ddl: bool,
    /// Relax restrictions that only make sense in production.
    pub regress_test_mode: bool,
    /// Role ordinary callers may not hand databases to or alter.
    pub privileged_role_name: String,
    /// Environment variable holding the bearer token.
    pub token_env_var: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            console_url: None,
            forward_ddl: true,
            regress_test_mode: false,
            privileged_role_name: DEFAULT_PRIVILEGED_ROLE.to_string(),
            token_env_var: TOKEN_ENV_VAR.to_string(),
        }
    }
}

impl RelaySettings {
    pub fn forward_target(&self) -> ForwardTarget {
        ForwardTarget {
            url: self.console_url.clone(),
            enabled: self.forward_ddl,
        }
    }
}

/// Builder for relay settings.
pub struct RelaySettingsBuilder {
    settings: RelaySettings,
}

impl RelaySettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: RelaySettings::default(),
        }
    }

    pub fn console_url(mut self, url: impl Into<String>) -> Self {
        self.settings.console_url = Some(url.into());
        self
    }

    pub fn forward_ddl(mut self, enabled: bool) -> Self {
        self.settings.forward_ddl = enabled;
        self
    }

    pub fn regress_test_mode(mut self, enabled: bool) -> Self {
        self.settings.regress_test_mode = enabled;
        self
    }

    pub fn privileged_role_name(mut self, name: impl Into<String>) -> Self {
        self.settings.privileged_role_name = name.into();
        self
    }

    pub fn token_env_var(mut self, var: impl Into<String>) -> Self {
        self.settings.token_env_var = var.into();
        self
    }

    pub fn build(self) -> RelaySettings {
        self.settings
    }
}

impl Default for RelaySettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings shared by every connection of the process.
///
/// Readers take a snapshot; a transaction keeps the snapshot it started with.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<RelaySettings>>,
}

impl SharedSettings {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> RelaySettings {
        self.inner.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut RelaySettings)) {
        let mut guard = self.inner.write();
        f(&mut *guard);
    }
}
