//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use aligner_core::extract::LlmConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP bind address for the REST API
    pub bind_addr: String,
    /// Database path
    pub database_path: PathBuf,
    /// Log file path
    pub log_file: PathBuf,
    /// LLM endpoint; extraction falls back to patterns when unset
    pub llm: Option<LlmConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let aligner_dir = home.join(".context-aligner");

        Self {
            bind_addr: "127.0.0.1:8600".to_string(),
            database_path: aligner_dir.join("sqlite.db"),
            log_file: aligner_dir.join("server.log"),
            llm: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment or defaults
    ///
    /// Standard directory structure:
    /// ```text
    /// ~/.context-aligner/
    /// ├── sqlite.db             # Decisions, gaps, gap details
    /// └── server.log            # Logs
    /// ```
    ///
    /// Environment variables:
    /// - `ALIGNER_DIR`: base directory (default ~/.context-aligner)
    /// - `ALIGNER_BIND`: bind address (default 127.0.0.1:8600)
    /// - `ALIGNER_DB_PATH`: database path override
    /// - `ALIGNER_LLM_URL`: chat-completions endpoint; enables the LLM tier
    /// - `ALIGNER_LLM_API_KEY`: bearer token for the endpoint
    /// - `ALIGNER_LLM_MODEL`: model name (default claude-3-5-haiku-latest)
    /// - `ALIGNER_LLM_TIMEOUT_MS`: per-request timeout (default 800)
    pub fn load() -> anyhow::Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let aligner_dir = std::env::var("ALIGNER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".context-aligner"));

        std::fs::create_dir_all(&aligner_dir)?;

        let bind_addr =
            std::env::var("ALIGNER_BIND").unwrap_or_else(|_| "127.0.0.1:8600".to_string());
        let database_path = std::env::var("ALIGNER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| aligner_dir.join("sqlite.db"));

        let llm = std::env::var("ALIGNER_LLM_URL").ok().map(|endpoint| {
            let timeout_ms = std::env::var("ALIGNER_LLM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(800);
            LlmConfig {
                endpoint,
                api_key: std::env::var("ALIGNER_LLM_API_KEY").ok(),
                model: std::env::var("ALIGNER_LLM_MODEL")
                    .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
                timeout: Duration::from_millis(timeout_ms),
            }
        });

        Ok(Self {
            bind_addr,
            database_path,
            log_file: aligner_dir.join("server.log"),
            llm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.bind_addr, "127.0.0.1:8600");
        assert!(config.database_path.ends_with("sqlite.db"));
        assert!(config.log_file.ends_with("server.log"));
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_default_config_directory_structure() {
        let config = Config::default();

        let home = dirs::home_dir().unwrap();
        let aligner_dir = home.join(".context-aligner");

        assert!(config.database_path.starts_with(&aligner_dir));
        assert!(config.log_file.starts_with(&aligner_dir));
    }

    #[test]
    fn test_config_load_with_custom_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom_path = temp_dir.path().to_path_buf();

        // Save current value to restore later
        let old_val = env::var("ALIGNER_DIR").ok();
        // SAFETY: This test runs in isolation and we restore the env var afterward
        unsafe { env::set_var("ALIGNER_DIR", &custom_path) };

        let config = Config::load().unwrap();

        assert!(config.database_path.starts_with(&custom_path));
        assert!(config.log_file.starts_with(&custom_path));
        // Load creates the base directory
        assert!(custom_path.exists());

        // Cleanup
        // SAFETY: Restoring environment to previous state
        unsafe {
            if let Some(val) = old_val {
                env::set_var("ALIGNER_DIR", val);
            } else {
                env::remove_var("ALIGNER_DIR");
            }
        }
    }
}
