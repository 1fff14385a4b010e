use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub storage: StorageConfig,
    pub agents: AgentsConfig,
    pub providers: ProvidersConfig,
}

/// Where the session database lives and how its connection pool is sized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Path to the SQLite database file. `~` expands to the home directory.
    pub path: String,
    /// Minimum number of idle connections the pool keeps warm.
    pub pool_min_idle: u32,
    /// Maximum number of pooled connections.
    pub pool_max_size: u32,
    /// How long a caller waits for a connection before failing.
    pub acquire_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.atelier/atelier.sqlite3".into(),
            pool_min_idle: 1,
            pool_max_size: 8,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
    /// Named model tiers. Must contain at least a "default" entry.
    pub models: HashMap<String, ModelRef>,
}

/// Reference to a provider + model combination for a named tier.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    /// Hard bound on Decide steps per run. A run that exhausts it fails.
    pub max_iterations: usize,
    /// Timeout applied to each model invocation and each tool execution.
    pub step_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            step_timeout_secs: 120,
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub ollama: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    pub openrouter: Option<ProviderConfig>,
    pub deepseek: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub mistral: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.storage.pool_max_size, 8);
        assert_eq!(cfg.storage.pool_min_idle, 1);
        assert_eq!(cfg.agents.defaults.max_iterations, 20);
        assert_eq!(cfg.agents.defaults.step_timeout_secs, 120);
        assert!(cfg.agents.models.is_empty());
    }

    #[test]
    fn storage_fields_parsed() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "storage": {
                "path": "/tmp/sessions.db",
                "poolMinIdle": 2,
                "poolMaxSize": 16,
                "acquireTimeoutSecs": 3
            }
        }))
        .unwrap();
        assert_eq!(cfg.storage.path, "/tmp/sessions.db");
        assert_eq!(cfg.storage.pool_min_idle, 2);
        assert_eq!(cfg.storage.pool_max_size, 16);
        assert_eq!(cfg.storage.acquire_timeout_secs, 3);
    }

    #[test]
    fn model_tiers_parsed() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "agents": {
                "models": {
                    "default": { "provider": "ollama", "model": "qwen3" }
                }
            }
        }))
        .unwrap();
        let default = cfg.agents.models.get("default").unwrap();
        assert_eq!(default.provider, "ollama");
        assert_eq!(default.model, "qwen3");
    }

    #[test]
    fn provider_keys_optional() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "providers": {
                "openai": { "apiKey": "sk-test" }
            }
        }))
        .unwrap();
        assert_eq!(
            cfg.providers.openai.unwrap().api_key.as_deref(),
            Some("sk-test")
        );
        assert!(cfg.providers.anthropic.is_none());
    }
}
