//! Server-driven module visibility.
//!
//! The API publishes, per role, which feature modules the client should
//! show. The map is fetched once per session through the gateway and held in
//! memory only. A key the map does not mention is visible.

use rafflekit_platform_access::Role;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::VisibilityPolicy;
use crate::gateway::AuthenticatedGateway;
use crate::response::unwrap_envelope;

/// Module map endpoint, relative to the API base URL.
pub const MODULES_PATH: &str = "/modules";

/// Where a set of flags came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSource {
    /// Fetched from the API.
    Remote,
    /// The API could not answer; the policy's default applies to every key.
    Fallback,
}

/// Feature visibility for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags {
    flags: HashMap<String, bool>,
    default_visible: bool,
    source: FlagSource,
}

impl FeatureFlags {
    fn remote(flags: HashMap<String, bool>) -> Self {
        Self {
            flags,
            default_visible: true,
            source: FlagSource::Remote,
        }
    }

    /// Flags used when the map could not be fetched.
    #[must_use]
    pub fn fallback(policy: VisibilityPolicy) -> Self {
        Self {
            flags: HashMap::new(),
            default_visible: policy.fallback_visible(),
            source: FlagSource::Fallback,
        }
    }

    /// Returns whether the module `key` should be shown.
    #[must_use]
    pub fn is_visible(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(self.default_visible)
    }

    #[must_use]
    pub fn source(&self) -> FlagSource {
        self.source
    }

    /// Returns the explicitly listed keys and their visibility.
    pub fn explicit(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Role-keyed feature map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleMap {
    by_role: HashMap<Role, HashMap<String, bool>>,
}

impl ModuleMap {
    /// Parses a map shaped `{ "<role>": { "<feature>": bool } }`.
    ///
    /// Unknown roles and non-boolean entries are skipped. Returns `None` if
    /// the value is not an object.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        let roles = value.as_object()?;
        let mut by_role = HashMap::new();

        for (name, entries) in roles {
            let role = Role::parse(name);
            if !role.is_recognized() {
                debug!(role = %name, "skipping unknown role in module map");
                continue;
            }
            let Some(entries) = entries.as_object() else {
                debug!(%role, "skipping non-object module entry");
                continue;
            };
            let flags = entries
                .iter()
                .filter_map(|(key, visible)| visible.as_bool().map(|v| (key.clone(), v)))
                .collect();
            by_role.insert(role, flags);
        }

        Some(Self { by_role })
    }

    /// Returns the flags for `role`. A role with no entry sees everything.
    #[must_use]
    pub fn flags_for(&self, role: Role) -> FeatureFlags {
        FeatureFlags::remote(self.by_role.get(&role).cloned().unwrap_or_default())
    }
}

struct CachedMap {
    epoch: u64,
    map: ModuleMap,
}

/// Resolves feature visibility for the current session.
pub struct ModuleVisibility {
    gateway: AuthenticatedGateway,
    policy: VisibilityPolicy,
    cache: Mutex<Option<CachedMap>>,
}

impl ModuleVisibility {
    #[must_use]
    pub fn new(gateway: AuthenticatedGateway, policy: VisibilityPolicy) -> Self {
        Self {
            gateway,
            policy,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    /// Returns the feature flags for `role`.
    ///
    /// The first call in a session fetches the map; later calls in the same
    /// session are answered from memory. Failed fetches are not cached.
    pub async fn resolve(&self, role: Role) -> FeatureFlags {
        let sessions = self.gateway.sessions();
        sessions.bootstrap().await;

        let mut cache = self.cache.lock().await;
        let epoch = sessions.epoch().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.epoch == epoch) {
            return cached.map.flags_for(role);
        }

        match self.fetch().await {
            Ok(map) => {
                let flags = map.flags_for(role);
                *cache = Some(CachedMap { epoch, map });
                flags
            }
            Err(reason) => {
                warn!(policy = ?self.policy, %reason, "module map unavailable, using fallback visibility");
                FeatureFlags::fallback(self.policy)
            }
        }
    }

    /// Drops the cached map.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn fetch(&self) -> Result<ModuleMap, String> {
        let response = self
            .gateway
            .get(MODULES_PATH)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("status {}", response.status()));
        }
        let body = response
            .body()
            .ok_or_else(|| "empty or non-JSON body".to_string())?;
        ModuleMap::parse(unwrap_envelope(unwrap_envelope(body)))
            .ok_or_else(|| "body is not a role-keyed object".to_string())
    }
}
