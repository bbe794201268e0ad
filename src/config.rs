use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl GeminiConfig {
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::config(format!(
                "{} not set. Export it or add it to .env",
                self.api_key_env
            ))),
        }
    }
}

/// Which demo a model profile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Ask,
    Chat,
    Cypher,
    Agent,
}

/// Resolved generation settings for one demo.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub max_retries: u32,
    pub timeout: Option<Duration>,
}

impl ModelProfile {
    fn defaults(kind: TaskKind) -> Self {
        let (model, temperature, max_retries) = match kind {
            TaskKind::Ask => ("gemini-2.5-flash-preview-05-20", 0.0, 0),
            TaskKind::Chat => ("gemini-2.0-flash-lite", 1.0, 0),
            TaskKind::Cypher | TaskKind::Agent => ("gemini-2.5-flash-preview-05-20", 0.5, 2),
        };
        Self {
            model: model.into(),
            temperature,
            max_output_tokens: None,
            max_retries,
            timeout: None,
        }
    }
}

/// Partial `[models.<task>]` section; unset fields keep the task defaults.
#[derive(Debug, Deserialize, Default)]
pub struct ProfileOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ModelsConfig {
    pub ask: Option<ProfileOverride>,
    pub chat: Option<ProfileOverride>,
    pub cypher: Option<ProfileOverride>,
    pub agent: Option<ProfileOverride>,
}

impl ModelsConfig {
    pub fn profile(&self, kind: TaskKind) -> ModelProfile {
        let mut profile = ModelProfile::defaults(kind);
        let over = match kind {
            TaskKind::Ask => self.ask.as_ref(),
            TaskKind::Chat => self.chat.as_ref(),
            TaskKind::Cypher => self.cypher.as_ref(),
            TaskKind::Agent => self.agent.as_ref(),
        };
        if let Some(o) = over {
            if let Some(model) = &o.model {
                profile.model = model.clone();
            }
            if let Some(t) = o.temperature {
                profile.temperature = t;
            }
            if o.max_output_tokens.is_some() {
                profile.max_output_tokens = o.max_output_tokens;
            }
            if let Some(r) = o.max_retries {
                profile.max_retries = r;
            }
            if let Some(secs) = o.timeout_secs {
                profile.timeout = Some(Duration::from_secs(secs));
            }
        }
        profile
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embeddings_output")]
    pub output: PathBuf,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            output: default_embeddings_output(),
            sample_size: default_sample_size(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_embedding_property")]
    pub embedding_property: String,
    #[serde(default = "default_text_property")]
    pub text_property: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            embedding_property: default_embedding_property(),
            text_property: default_text_property(),
            k: default_k(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Neo4jConfig {
    /// Env vars tried in order for the connection URI.
    #[serde(default = "default_uri_env")]
    pub uri_env: Vec<String>,
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri_env: default_uri_env(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neo4jCredentials {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Neo4jConfig {
    pub fn uri(&self) -> Option<String> {
        self.uri_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
    }

    pub fn credentials(&self) -> Result<Neo4jCredentials> {
        let uri = self.uri().ok_or_else(|| {
            Error::config(format!(
                "Neo4j URI not set. Export one of: {}",
                self.uri_env.join(", ")
            ))
        })?;
        let username = std::env::var(&self.username_env)
            .map_err(|_| Error::config(format!("{} not set", self.username_env)))?;
        let password = std::env::var(&self.password_env)
            .map_err(|_| Error::config(format!("{} not set", self.password_env)))?;
        Ok(Neo4jCredentials {
            uri,
            username,
            password,
            database: self.database.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Number of human/ai exchanges loaded from history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_trailer_results")]
    pub trailer_results: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            trailer_results: default_trailer_results(),
        }
    }
}

// Defaults
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_embedding_model() -> String {
    "models/embedding-001".into()
}
fn default_embeddings_output() -> PathBuf {
    PathBuf::from(".").join("data").join("movie-plot-embeddings.csv")
}
fn default_sample_size() -> usize {
    10
}
fn default_index_name() -> String {
    "moviePlots".into()
}
fn default_embedding_property() -> String {
    "plotEmbedding".into()
}
fn default_text_property() -> String {
    "plot".into()
}
fn default_k() -> usize {
    4
}
fn default_uri_env() -> Vec<String> {
    vec!["NEO4J_URI".into(), "NEO4J_URL".into()]
}
fn default_username_env() -> String {
    "NEO4J_USERNAME".into()
}
fn default_password_env() -> String {
    "NEO4J_PASSWORD".into()
}
fn default_database() -> String {
    "neo4j".into()
}
fn default_max_iterations() -> u32 {
    15
}
fn default_history_window() -> usize {
    3
}
fn default_trailer_results() -> usize {
    2
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// A missing file means defaults; a malformed one is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml = r#"
[gemini]
base_url = "http://localhost:9000/v1beta"
api_key_env = "MY_KEY"

[models.chat]
model = "gemini-test"
temperature = 0.2

[models.agent]
max_retries = 5
timeout_secs = 30

[embeddings]
model = "text-embedding-004"
sample_size = 3

[vector]
index_name = "plots"
k = 6

[neo4j]
uri_env = ["GRAPH_URL"]
database = "movies"

[agent]
max_iterations = 4
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gemini.api_key_env, "MY_KEY");
        assert_eq!(config.embeddings.sample_size, 3);
        assert_eq!(config.vector.index_name, "plots");
        assert_eq!(config.vector.text_property, "plot");
        assert_eq!(config.neo4j.uri_env, vec!["GRAPH_URL".to_string()]);
        assert_eq!(config.neo4j.username_env, "NEO4J_USERNAME");
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.history_window, 3);

        let chat = config.models.profile(TaskKind::Chat);
        assert_eq!(chat.model, "gemini-test");
        assert!((chat.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(chat.max_retries, 0);

        let agent = config.models.profile(TaskKind::Agent);
        assert_eq!(agent.model, "gemini-2.5-flash-preview-05-20");
        assert_eq!(agent.max_retries, 5);
        assert_eq!(agent.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(
            config.gemini.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.embeddings.model, "models/embedding-001");
        assert_eq!(config.vector.embedding_property, "plotEmbedding");
        assert_eq!(config.agent.trailer_results, 2);
    }

    #[test]
    fn task_defaults_match_demos() {
        let models = ModelsConfig::default();
        let ask = models.profile(TaskKind::Ask);
        assert_eq!(ask.temperature, 0.0);
        assert_eq!(ask.max_retries, 0);
        assert!(ask.timeout.is_none());

        let chat = models.profile(TaskKind::Chat);
        assert_eq!(chat.model, "gemini-2.0-flash-lite");
        assert_eq!(chat.temperature, 1.0);

        let cypher = models.profile(TaskKind::Cypher);
        assert_eq!(cypher.temperature, 0.5);
        assert_eq!(cypher.max_retries, 2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.agent.max_iterations, 15);
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let gemini = GeminiConfig {
            base_url: default_gemini_base_url(),
            api_key_env: "CINEGRAPH_TEST_UNSET_KEY".into(),
        };
        assert!(matches!(gemini.api_key(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_uri_is_config_error() {
        let neo4j = Neo4jConfig {
            uri_env: vec!["CINEGRAPH_TEST_UNSET_URI".into()],
            ..Neo4jConfig::default()
        };
        assert!(neo4j.uri().is_none());
        assert!(matches!(neo4j.credentials(), Err(Error::Config(_))));
    }
}
