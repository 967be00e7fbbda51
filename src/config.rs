use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// LLM vendor connection settings. `api_key` is never read from the file or
/// CLI directly -- only `api_key_env` is, and the key itself is fetched from
/// that environment variable at startup so it never round-trips through
/// config.toml or process arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key_env: String,
    pub reasoning_model_id: String,
    pub standard_model_id: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub reasoning_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub standard_timeout_secs: u64,
    /// Retries for the P1 JSON repair prompt. Spec allows exactly one.
    pub max_parse_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_base: String,
    pub api_key_env: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub per_query_timeout_secs: u64,
    /// N in spec.md §5: concurrent search queries fanned out by P2.
    pub max_concurrent_queries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub per_fetch_timeout_secs: u64,
    /// K in spec.md §5: concurrent content fetches fanned out by P2c.
    pub max_concurrent_fetches: usize,
    pub max_source_bytes: usize,
    pub user_agent: String,
    /// Opt-in fallback for known-problematic TLS chains (spec.md §4.4).
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub failure_window_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub reset_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_search_attempts: u32,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub whole_pipeline_timeout_secs: u64,
    /// M in spec.md §5: concurrent LLM-as-judge calls in P2b/P5b.
    pub judge_concurrency: usize,
    /// Upper bound on P5b's downward-only adjustment (spec.md §9 open question).
    pub max_downward_adjustment: i32,
    /// Ceiling on P2b's enhancement_queries list (spec.md §9 open question).
    pub max_enhancement_queries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "fitcheck")]
#[command(version, about = "Fit-check analysis engine")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// LLM vendor API base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub llm_api_base: Option<String>,

    /// Search provider API base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub search_api_base: Option<String>,

    /// Logging level (overrides config file, e.g., "info,fitcheck=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Whole-pipeline timeout (overrides config file, e.g., "120s", "2m")
    #[arg(long, value_name = "DURATION")]
    pub pipeline_timeout: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_LLM_API_BASE / APP_SEARCH_API_BASE
    /// - APP_LOG_LEVEL
    /// - APP_PIPELINE_TIMEOUT_SECS (accepts "120s", "2m", plain seconds)
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(api_base) = std::env::var("APP_LLM_API_BASE") {
            self.llm.api_base = api_base;
            tracing::info!("Override llm.api_base from env");
        }

        if let Ok(api_base) = std::env::var("APP_SEARCH_API_BASE") {
            self.search.api_base = api_base;
            tracing::info!("Override search.api_base from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(timeout) = std::env::var("APP_PIPELINE_TIMEOUT_SECS") {
            match parse_duration_to_secs(&timeout) {
                Ok(val) => {
                    self.pipeline.whole_pipeline_timeout_secs = val;
                    tracing::info!(
                        "Override pipeline.whole_pipeline_timeout_secs from env: {}",
                        val
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_PIPELINE_TIMEOUT_SECS '{}': {} (keep {})",
                    timeout,
                    e,
                    self.pipeline.whole_pipeline_timeout_secs
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(api_base) = &args.llm_api_base {
            self.llm.api_base = api_base.clone();
            tracing::info!("Override llm.api_base from CLI");
        }

        if let Some(api_base) = &args.search_api_base {
            self.search.api_base = api_base.clone();
            tracing::info!("Override search.api_base from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(timeout) = &args.pipeline_timeout {
            match parse_duration_to_secs(timeout) {
                Ok(val) => {
                    self.pipeline.whole_pipeline_timeout_secs = val;
                    tracing::info!(
                        "Override pipeline.whole_pipeline_timeout_secs from CLI: {}",
                        val
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --pipeline-timeout '{}': {} (keep {})",
                    timeout,
                    e,
                    self.pipeline.whole_pipeline_timeout_secs
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.llm.api_base.is_empty() {
            anyhow::bail!("llm.api_base cannot be empty");
        }
        if self.pipeline.max_search_attempts == 0 {
            anyhow::bail!("pipeline.max_search_attempts must be > 0");
        }
        if self.pipeline.max_enhancement_queries == 0 || self.pipeline.max_enhancement_queries > 5
        {
            anyhow::bail!("pipeline.max_enhancement_queries must be in 1..=5");
        }
        if self.pipeline.max_downward_adjustment < 0 || self.pipeline.max_downward_adjustment > 100
        {
            anyhow::bail!("pipeline.max_downward_adjustment must be in 0..=100");
        }
        if self.search.max_concurrent_queries == 0 || self.search.max_concurrent_queries > 5 {
            anyhow::bail!("search.max_concurrent_queries must be in 1..=5");
        }
        if self.fetch.max_concurrent_fetches == 0 || self.fetch.max_concurrent_fetches > 5 {
            anyhow::bail!("fetch.max_concurrent_fetches must be in 1..=5");
        }
        if self.pipeline.judge_concurrency == 0 || self.pipeline.judge_concurrency > 4 {
            anyhow::bail!("pipeline.judge_concurrency must be in 1..=4");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            reasoning_model_id: "o1".to_string(),
            standard_model_id: "gpt-4o-mini".to_string(),
            reasoning_timeout_secs: 30,
            standard_timeout_secs: 15,
            max_parse_retries: 1,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.search.example.com".to_string(),
            api_key_env: "SEARCH_API_KEY".to_string(),
            per_query_timeout_secs: 10,
            max_concurrent_queries: 5,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_fetch_timeout_secs: 15,
            max_concurrent_fetches: 5,
            max_source_bytes: 100 * 1024,
            user_agent: "fitcheck-engine/1.0 (+content-enrichment)".to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, failure_window_secs: 60, reset_secs: 30 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_search_attempts: 2,
            whole_pipeline_timeout_secs: 120,
            judge_concurrency: 4,
            max_downward_adjustment: 30,
            max_enhancement_queries: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,fitcheck=debug".to_string(), file: Some("logs/fitcheck.log".to_string()) }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Custom serde deserializer to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_parsing_accepts_plain_and_suffixed_values() {
        assert_eq!(parse_duration_to_secs("30").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("2h").unwrap(), 7200);
        assert!(parse_duration_to_secs("banana").is_err());
    }

    #[test]
    fn rejects_enhancement_queries_ceiling_above_five() {
        let mut config = Config::default();
        config.pipeline.max_enhancement_queries = 6;
        assert!(config.validate().is_err());
    }
}
