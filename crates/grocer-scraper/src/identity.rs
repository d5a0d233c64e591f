//! Outbound request identities and per-request rotation.

use grocer_core::IdentityConfig;

use crate::error::ScraperError;

/// The face a request shows the retailer: its `User-Agent` and, optionally,
/// the proxy it is routed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            proxy: None,
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

impl From<&IdentityConfig> for Identity {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
        }
    }
}

/// Read-only pool of identities.
///
/// With rotation enabled every [`IdentityPool::pick`] draws uniformly at
/// random; otherwise the first identity is always used.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    identities: Vec<Identity>,
    rotate: bool,
}

impl IdentityPool {
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidConfig`] if `identities` is empty.
    pub fn new(identities: Vec<Identity>, rotate: bool) -> Result<Self, ScraperError> {
        if identities.is_empty() {
            return Err(ScraperError::InvalidConfig(
                "identity pool must contain at least one identity".to_string(),
            ));
        }
        Ok(Self { identities, rotate })
    }

    /// A pool that always answers with `identity`.
    #[must_use]
    pub fn fixed(identity: Identity) -> Self {
        Self {
            identities: vec![identity],
            rotate: false,
        }
    }

    #[must_use]
    pub fn pick(&self) -> &Identity {
        if self.rotate && self.identities.len() > 1 {
            &self.identities[rand::random_range(0..self.identities.len())]
        } else {
            &self.identities[0]
        }
    }

    #[must_use]
    pub fn rotates(&self) -> bool {
        self.rotate
    }

    #[must_use]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }
}
