use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL
    ///
    /// When unset the service runs on the in-memory ledger.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Language model API key
    ///
    /// When unset the synthesizer uses the deterministic fallback ranker.
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Language model API base URL (OpenAI-compatible)
    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,

    /// Language model name
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}
