//! Read-only configuration access

use std::sync::RwLock;

use crate::types::OrchestratorConfig;

/// Configuration source Trait
///
/// The effective configuration is merged and migrated elsewhere; the core only reads it.
pub trait ConfigSource: Send + Sync {
    /// Current effective configuration
    fn current(&self) -> OrchestratorConfig;

    /// Global open-view limit
    fn view_limit(&self) -> usize {
        self.current().view_limit
    }
}

/// Fixed configuration, replaceable by the owner (e.g. after a settings change)
#[derive(Debug, Default)]
pub struct StaticConfig {
    config: RwLock<OrchestratorConfig>,
}

impl StaticConfig {
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Swap in a new configuration
    pub fn replace(&self, config: OrchestratorConfig) {
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }
}

impl ConfigSource for StaticConfig {
    fn current(&self) -> OrchestratorConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_visible_to_readers() {
        let source = StaticConfig::default();
        assert_eq!(source.view_limit(), 15);
        source.replace(OrchestratorConfig {
            view_limit: 2,
            ..OrchestratorConfig::default()
        });
        assert_eq!(source.view_limit(), 2);
    }
}
