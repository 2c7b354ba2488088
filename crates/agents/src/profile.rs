//! Named agent profiles a scheduled task can target.

use std::collections::BTreeMap;

use {
    agentdesk_config::AgentConfig,
    serde::{Deserialize, Serialize},
    tracing::warn,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    /// Model override; the runner's default applies when unset.
    #[serde(default)]
    pub model: Option<String>,
    pub is_active: bool,
}

impl From<&AgentConfig> for AgentProfile {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            description: cfg.description.clone(),
            system_prompt: cfg.system_prompt.clone(),
            model: cfg.model.clone(),
            is_active: cfg.is_active,
        }
    }
}

/// Lookup of agent profiles by name.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    agents: BTreeMap<String, AgentProfile>,
}

impl AgentDirectory {
    pub fn new(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        let mut agents = BTreeMap::new();
        for profile in profiles {
            if let Some(previous) = agents.insert(profile.name.clone(), profile) {
                warn!(agent = %previous.name, "duplicate agent name, keeping the last definition");
            }
        }
        Self { agents }
    }

    pub fn from_config(agents: &[AgentConfig]) -> Self {
        Self::new(agents.iter().map(AgentProfile::from))
    }

    /// The active profile named `name`. Inactive agents resolve to `None`.
    pub fn resolve(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name).filter(|p| p.is_active)
    }

    /// Any profile named `name`, active or not.
    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str, active: bool) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            description: None,
            system_prompt: format!("You are the {name} analyst."),
            model: None,
            is_active: active,
        }
    }

    #[test]
    fn resolve_skips_inactive() {
        let dir = AgentDirectory::from_config(&[cfg("sales", true), cfg("hr", false)]);
        assert_eq!(dir.len(), 2);
        assert!(dir.resolve("sales").is_some());
        assert!(dir.resolve("hr").is_none());
        assert!(dir.get("hr").is_some());
        assert!(dir.resolve("finance").is_none());
    }

    #[test]
    fn duplicate_name_keeps_last() {
        let mut second = cfg("sales", true);
        second.system_prompt = "second".into();
        let dir = AgentDirectory::from_config(&[cfg("sales", true), second]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.resolve("sales").unwrap().system_prompt, "second");
    }
}
