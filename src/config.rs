//! Optional config file loading. Search order: ./webtome.toml, then
//! $XDG_CONFIG_HOME/webtome/config.toml (or ~/.config/webtome/config.toml).

use crate::translate::Credentials;
use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between page requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Body font family for EPUB and DOCX output.
    pub font_family: Option<String>,
    pub papago_client_id: Option<String>,
    pub papago_client_secret: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepl_api_key: Option<String>,
}

/// Search order: (1) ./webtome.toml, (2) $XDG_CONFIG_HOME/webtome/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("webtome.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("webtome").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Provider credentials, environment variables taking precedence over the
/// config file.
pub fn resolve_credentials(config: Option<&Config>) -> Credentials {
    let from_env_or = |var: &str, fallback: Option<&String>| {
        std::env::var(var).ok().or_else(|| fallback.cloned())
    };
    Credentials {
        papago_client_id: from_env_or(
            "PAPAGO_CLIENT_ID",
            config.and_then(|c| c.papago_client_id.as_ref()),
        ),
        papago_client_secret: from_env_or(
            "PAPAGO_CLIENT_SECRET",
            config.and_then(|c| c.papago_client_secret.as_ref()),
        ),
        openai_api_key: from_env_or(
            "OPENAI_API_KEY",
            config.and_then(|c| c.openai_api_key.as_ref()),
        ),
        deepl_api_key: from_env_or(
            "DEEPL_API_KEY",
            config.and_then(|c| c.deepl_api_key.as_ref()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.retry_count.is_none());
        assert!(c.font_family.is_none());
        assert!(c.papago_client_id.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "out"
            user_agent = "Custom/1.0"
            request_delay_secs = 3
            timeout_secs = 60
            retry_count = 5
            font_family = "Noto Serif"
            papago_client_id = "id"
            papago_client_secret = "secret"
            openai_api_key = "sk-test"
            deepl_api_key = "dl-test"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("out")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(3));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.retry_count, Some(5));
        assert_eq!(c.font_family.as_deref(), Some("Noto Serif"));
        assert_eq!(c.papago_client_id.as_deref(), Some("id"));
        assert_eq!(c.deepl_api_key.as_deref(), Some("dl-test"));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("request_delay_secs = 1").unwrap();
        assert!(c.output_dir.is_none());
        assert_eq!(c.request_delay_secs, Some(1));
        assert!(c.timeout_secs.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
    }

    #[test]
    fn credentials_fall_back_to_config_values() {
        let config: Config = toml::from_str(
            r#"
            papago_client_id = "cfg-id"
            deepl_api_key = "cfg-deepl"
        "#,
        )
        .unwrap();
        let credentials = resolve_credentials(Some(&config));
        assert_eq!(credentials.papago_client_id.as_deref(), Some("cfg-id"));
        assert_eq!(credentials.deepl_api_key.as_deref(), Some("cfg-deepl"));
    }
}
