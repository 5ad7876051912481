//! User capability checks.

use std::collections::BTreeSet;

/// Capability granting moderation rights over community content.
pub const BP_MODERATE: &str = "bp_moderate";

/// The subset of a host user the core consults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// `0` is the anonymous visitor.
    pub id: u64,
    pub login: String,
    pub email: String,
    pub url: String,
    pub super_admin: bool,
    capabilities: BTreeSet<String>,
}

impl User {
    pub fn new(id: u64, login: &str) -> Self {
        Self {
            id,
            login: login.to_string(),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.super_admin = true;
        self
    }

    pub fn grant(mut self, capability: &str) -> Self {
        self.capabilities.insert(capability.to_string());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }

    pub fn has_cap(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Primitive capability a meta capability resolves to.
pub fn map_meta_cap(capability: &str, network_active: bool) -> &str {
    match capability {
        BP_MODERATE if network_active => "manage_network_options",
        BP_MODERATE => "manage_options",
        other => other,
    }
}

pub fn user_can(user: &User, capability: &str, network_active: bool) -> bool {
    if user.super_admin {
        return true;
    }
    if user.is_anonymous() {
        return false;
    }
    user.has_cap(map_meta_cap(capability, network_active))
}
