use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{PurgeError, Result};
use crate::db::RetryPolicy;

pub const ENV_PREFIX: &str = "PURGE";

pub const DEFAULT_SANDBOX_MARKER: &str = "sandbox";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(
            self.max_retries,
            Duration::from_secs_f64(self.retry_delay_secs.max(0.0)),
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 2.0,
        }
    }
}

// The token must never reach logs.
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Pins every deletion to dry-run, even with `--live`.
    pub force_dry_run: bool,
    pub sandbox_marker: String,
    pub rate_limit_delay_secs: f64,
    pub countdown_seconds: u64,
}

impl SafetyConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_delay_secs.max(0.0))
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_seconds)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            force_dry_run: false,
            sandbox_marker: DEFAULT_SANDBOX_MARKER.to_string(),
            rate_limit_delay_secs: 1.0,
            countdown_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub pause_every_n: usize,
    pub results_dir: PathBuf,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            pause_every_n: 5,
            results_dir: PathBuf::from(crate::DEFAULT_RESULTS_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            log_to_file: true,
        }
    }
}

/// Whole-run configuration. Built once at startup and passed to every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    pub gateway: GatewayConfig,
    pub safety: SafetyConfig,
    pub deletion: DeletionConfig,
    pub logging: LoggingConfig,
}

impl PurgeConfig {
    /// Layers defaults, the optional file, `PURGE_*` variables, then the well-known variables.
    pub fn load(file: Option<&Path>, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(PurgeError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        let lookup = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| env.get(*k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        builder = builder
            .set_override_option(
                "gateway.base_url",
                lookup(&["BASE_URL", "AUDITBOARD_BASE_URL"]),
            )?
            .set_override_option(
                "gateway.api_token",
                lookup(&["API_TOKEN", "AUDITBOARD_API_TOKEN"]),
            )?
            // DRY_RUN can only pin dry-run; live mode always needs `--live`.
            .set_override_option(
                "safety.force_dry_run",
                lookup(&["DRY_RUN"]).filter(|v| parse_flag(v)).map(|_| true),
            )?
            .set_override_option("logging.level", lookup(&["LOG_LEVEL"]))?
            .set_override_option("logging.log_dir", lookup(&["LOG_DIR"]))?
            .set_override_option("deletion.results_dir", lookup(&["RESULTS_DIR"]))?;

        let config: PurgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_process_env(file: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load(file, &env)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(PurgeError::Configuration(
                "BASE_URL not configured".to_string(),
            ));
        }
        url::Url::parse(&self.gateway.base_url).map_err(|e| {
            PurgeError::Configuration(format!("invalid BASE_URL {}: {}", self.gateway.base_url, e))
        })?;
        if self.gateway.api_token.trim().is_empty() {
            return Err(PurgeError::Configuration(
                "API_TOKEN not configured".to_string(),
            ));
        }
        if self.deletion.pause_every_n == 0 {
            return Err(PurgeError::Configuration(
                "deletion.pause_every_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the base URL carries the sandbox marker.
    pub fn is_sandbox(&self) -> bool {
        is_sandbox_url(&self.gateway.base_url, &self.safety.sandbox_marker)
    }
}

pub fn is_sandbox_url(url: &str, marker: &str) -> bool {
    !marker.is_empty() && url.to_lowercase().contains(&marker.to_lowercase())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::deletion::DeletionMode;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_only_config() {
        let config = PurgeConfig::load(
            None,
            &env(&[
                ("BASE_URL", "https://acme-sandbox.example.com/api/v1"),
                ("API_TOKEN", "secret"),
            ]),
        )
        .unwrap();

        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.gateway.retry_policy().max_attempts, 4);
        assert!(!config.safety.force_dry_run);
        assert_eq!(config.deletion.pause_every_n, 5);
        assert_eq!(config.deletion.results_dir, PathBuf::from("results"));
        assert!(config.is_sandbox());
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "gateway:\n  base_url: https://file.example.com\n  api_token: from-file\n  \
             timeout_secs: 12\nsafety:\n  countdown_seconds: 0\ndeletion:\n  pause_every_n: 2\n"
        )
        .unwrap();

        let config = PurgeConfig::load(
            Some(file.path()),
            &env(&[
                ("BASE_URL", "https://env.example.com"),
                ("DRY_RUN", "false"),
                ("PURGE_DELETION__PAUSE_EVERY_N", "7"),
            ]),
        )
        .unwrap();

        assert_eq!(config.gateway.base_url, "https://env.example.com");
        assert_eq!(config.gateway.api_token, "from-file");
        assert_eq!(config.gateway.timeout_secs, 12);
        assert_eq!(config.safety.countdown_seconds, 0);
        assert_eq!(config.deletion.pause_every_n, 7);
        assert!(!config.safety.force_dry_run);
        assert!(!config.is_sandbox());
    }

    #[test]
    fn test_dry_run_variable_never_enables_live() {
        let base = [
            ("BASE_URL", "https://acme-sandbox.example.com/api/v1"),
            ("API_TOKEN", "t"),
        ];
        let load = |dry_run: &str| {
            let mut vars = env(&base);
            vars.insert("DRY_RUN".to_string(), dry_run.to_string());
            PurgeConfig::load(None, &vars).unwrap()
        };

        let off = load("false");
        assert!(!off.safety.force_dry_run);
        assert_eq!(DeletionMode::resolve(false, off.safety.force_dry_run), DeletionMode::DryRun);
        assert_eq!(DeletionMode::resolve(true, off.safety.force_dry_run), DeletionMode::Live);

        let on = load("true");
        assert!(on.safety.force_dry_run);
        assert_eq!(DeletionMode::resolve(true, on.safety.force_dry_run), DeletionMode::DryRun);
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let config = PurgeConfig::load(
            None,
            &env(&[
                ("BASE_URL", "https://x.example.com"),
                ("API_TOKEN", "t"),
                ("PURGE_GATEWAY__MAX_RETRIES", "0"),
            ]),
        )
        .unwrap();
        assert_eq!(config.gateway.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_legacy_variable_names() {
        let config = PurgeConfig::load(
            None,
            &env(&[
                ("AUDITBOARD_BASE_URL", "https://org.example.com"),
                ("AUDITBOARD_API_TOKEN", "t"),
            ]),
        )
        .unwrap();
        assert_eq!(config.gateway.base_url, "https://org.example.com");
    }

    #[test]
    fn test_missing_values_are_configuration_errors() {
        let missing_token = PurgeConfig::load(None, &env(&[("BASE_URL", "https://x.example.com")]));
        assert!(matches!(missing_token, Err(PurgeError::Configuration(_))));

        let missing_url = PurgeConfig::load(None, &env(&[("API_TOKEN", "t")]));
        assert!(matches!(missing_url, Err(PurgeError::Configuration(_))));

        let missing_file = PurgeConfig::load(
            Some(Path::new("/definitely/not/here.yaml")),
            &env(&[("BASE_URL", "https://x.example.com"), ("API_TOKEN", "t")]),
        );
        assert!(matches!(missing_file, Err(PurgeError::Configuration(_))));
    }

    #[test]
    fn test_token_is_redacted() {
        let mut config = PurgeConfig::default();
        config.gateway.api_token = "super-secret".to_string();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_sandbox_detection_is_case_insensitive() {
        assert!(is_sandbox_url("https://ACME-SANDBOX.example.com", "sandbox"));
        assert!(!is_sandbox_url("https://acme.example.com", "sandbox"));
        assert!(!is_sandbox_url("https://acme.example.com", ""));
    }
}
