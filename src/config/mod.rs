//! Application configuration
//!
//! Everything comes from environment variables (a `.env` file is honored).
//! Missing memory-service variables are aggregated into one fatal error so
//! the operator sees the full list at once instead of fixing them one by one.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

pub const DEFAULT_AWS_REGION: &str = "us-west-2";
pub const DEFAULT_MODEL_ID: &str = "openai.gpt-oss-20b-1:0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Missing required environment variables: {}. \
         Please set them in your .env file (see .env.example).",
        .0.join(", ")
    )]
    MissingVars(Vec<String>),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Tenancy and endpoint settings for the remote memory service. Present
/// only in the memory-enabled variant.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub server_url: String,
    pub org_id: String,
    pub project_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub aws_region: String,
    pub default_model_id: String,
    pub memory: Option<MemoryConfig>,
}

impl Config {
    pub fn from_env(memory_enabled: bool) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars, memory_enabled)
    }

    /// Pure form of [`Config::from_env`], used directly by tests.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        memory_enabled: bool,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT".into(),
                value: raw,
            })?,
            None if memory_enabled => 3000,
            None => 3001,
        };

        let memory = if memory_enabled {
            let mut missing = Vec::new();
            let mut require = |name: &str| {
                get(name).unwrap_or_else(|| {
                    missing.push(name.to_string());
                    String::new()
                })
            };

            let memory = MemoryConfig {
                server_url: require("MEMORY_SERVER_URL"),
                org_id: require("ORG_ID"),
                project_id: require("PROJECT_ID"),
                user_id: require("USER_ID"),
            };

            if !missing.is_empty() {
                return Err(ConfigError::MissingVars(missing));
            }
            Some(memory)
        } else {
            None
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            aws_region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.into()),
            default_model_id: get("BEDROCK_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.into()),
            memory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_memory_variant_starts_with_defaults() {
        let config = Config::from_vars(&vars(&[]), false).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3001);
        assert_eq!(config.aws_region, DEFAULT_AWS_REGION);
        assert_eq!(config.default_model_id, DEFAULT_MODEL_ID);
        assert!(config.memory.is_none());
    }

    #[test]
    fn memory_variant_aggregates_all_missing_vars() {
        let err = Config::from_vars(&vars(&[("ORG_ID", "workshop-org")]), true).unwrap_err();
        match err {
            ConfigError::MissingVars(names) => {
                assert_eq!(names, vec!["MEMORY_SERVER_URL", "PROJECT_ID", "USER_ID"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = Config::from_vars(
            &vars(&[
                ("MEMORY_SERVER_URL", ""),
                ("ORG_ID", "workshop-org"),
                ("PROJECT_ID", "workshop-project"),
                ("USER_ID", "workshop-user"),
            ]),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVars(names) if names == ["MEMORY_SERVER_URL"]));
    }

    #[test]
    fn memory_variant_with_full_environment() {
        let config = Config::from_vars(
            &vars(&[
                ("MEMORY_SERVER_URL", "http://localhost:8080"),
                ("ORG_ID", "workshop-org"),
                ("PROJECT_ID", "workshop-project"),
                ("USER_ID", "workshop-user"),
                ("BEDROCK_MODEL_ID", "anthropic.claude-3-haiku-20240307-v1:0"),
                ("PORT", "9000"),
            ]),
            true,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.default_model_id,
            "anthropic.claude-3-haiku-20240307-v1:0"
        );
        let memory = config.memory.unwrap();
        assert_eq!(memory.server_url, "http://localhost:8080");
        assert_eq!(memory.user_id, "workshop-user");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Config::from_vars(&vars(&[("PORT", "not-a-port")]), false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == "PORT"));
    }
}
