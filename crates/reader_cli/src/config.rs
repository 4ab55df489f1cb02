//! Environment and file configuration for the command-line client.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chat_backend_http::ReaderBackendConfig;
use serde::Deserialize;

pub const BACKEND_ENV_VAR: &str = "PAPER_CHAT_BACKEND";
pub const CONFIG_PATH_ENV_VAR: &str = "PAPER_CHAT_CONFIG_PATH";
pub const BASE_URL_ENV_VAR: &str = "PAPER_CHAT_API_BASE_URL";
pub const LOG_ENV_VAR: &str = "PAPER_CHAT_LOG";

pub const MOCK_BACKEND: &str = "mock";
pub const HTTP_BACKEND: &str = "http";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Mock,
    Http(ReaderBackendConfig),
}

/// Shape of the JSON file named by `PAPER_CHAT_CONFIG_PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|error| {
            format!("Failed to read config file '{}': {error}", path.display())
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            format!("Invalid config file '{}': {error}", path.display())
        })?;

        if config.timeout_sec == Some(0) {
            return Err(format!(
                "Invalid config file '{}': timeout_sec must be greater than 0",
                path.display()
            ));
        }
        if config
            .base_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(format!(
                "Invalid config file '{}': base_url must not be empty",
                path.display()
            ));
        }

        Ok(config)
    }
}

pub fn backend_choice_from_env() -> Result<BackendChoice, String> {
    resolve_backend_choice(
        env_string_opt(BACKEND_ENV_VAR).as_deref(),
        env_string_opt(CONFIG_PATH_ENV_VAR).as_deref(),
        env_string_opt(BASE_URL_ENV_VAR),
    )
}

pub fn resolve_backend_choice(
    backend: Option<&str>,
    config_path: Option<&str>,
    base_url_override: Option<String>,
) -> Result<BackendChoice, String> {
    match backend.unwrap_or(MOCK_BACKEND) {
        MOCK_BACKEND => Ok(BackendChoice::Mock),
        HTTP_BACKEND | chat_backend_http::READER_BACKEND_ID => {
            let Some(config_path) = config_path else {
                return Err(format!(
                    "{CONFIG_PATH_ENV_VAR} must be set when {BACKEND_ENV_VAR}={HTTP_BACKEND}"
                ));
            };
            let file = FileConfig::load(Path::new(config_path))?;
            Ok(BackendChoice::Http(http_config(file, base_url_override)?))
        }
        unknown => Err(format!(
            "Unsupported backend '{unknown}'. Available backends: {MOCK_BACKEND}, {HTTP_BACKEND}"
        )),
    }
}

fn http_config(
    file: FileConfig,
    base_url_override: Option<String>,
) -> Result<ReaderBackendConfig, String> {
    let Some(base_url) = base_url_override.or(file.base_url) else {
        return Err(format!(
            "base_url is required in the config file or {BASE_URL_ENV_VAR}"
        ));
    };

    let mut config = ReaderBackendConfig::new(base_url);
    if let Some(timeout_sec) = file.timeout_sec {
        config = config.with_timeout(Duration::from_secs(timeout_sec));
    }
    for (key, value) in file.headers {
        config = config.with_header(key, value);
    }

    Ok(config)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn mock_is_the_default_backend() {
        let _lock = env_lock();
        let _g1 = set_env_guard(BACKEND_ENV_VAR, None);
        let _g2 = set_env_guard(CONFIG_PATH_ENV_VAR, None);
        let _g3 = set_env_guard(BASE_URL_ENV_VAR, None);

        assert_eq!(backend_choice_from_env(), Ok(BackendChoice::Mock));
    }

    #[test]
    fn http_backend_reads_the_config_file() {
        let file = config_file(
            r#"{"base_url":"http://reader.local:9000/api","timeout_sec":30,"headers":{"X-Team":"papers"}}"#,
        );
        let _lock = env_lock();
        let _g1 = set_env_guard(BACKEND_ENV_VAR, Some("http"));
        let path = file.path().to_string_lossy().into_owned();
        let _g2 = set_env_guard(CONFIG_PATH_ENV_VAR, Some(&path));
        let _g3 = set_env_guard(BASE_URL_ENV_VAR, None);

        let choice = backend_choice_from_env().expect("config resolves");

        assert_eq!(
            choice,
            BackendChoice::Http(
                ReaderBackendConfig::new("http://reader.local:9000/api")
                    .with_timeout(Duration::from_secs(30))
                    .with_header("X-Team", "papers")
            )
        );
    }

    #[test]
    fn base_url_env_overrides_the_file() {
        let file = config_file(r#"{"base_url":"http://from-file"}"#);
        let path = file.path().to_string_lossy().into_owned();

        let choice = resolve_backend_choice(
            Some("http"),
            Some(&path),
            Some("http://from-env".to_string()),
        )
        .expect("config resolves");

        assert_eq!(
            choice,
            BackendChoice::Http(ReaderBackendConfig::new("http://from-env"))
        );
    }

    #[test]
    fn http_backend_requires_a_config_path() {
        let error = resolve_backend_choice(Some("http"), None, None)
            .expect_err("config path is required");

        assert!(error.contains(CONFIG_PATH_ENV_VAR));
    }

    #[test]
    fn config_file_rejects_unknown_fields_and_zero_timeout() {
        let unknown = config_file(r#"{"base_url":"http://x","model":"big"}"#);
        let error = FileConfig::load(unknown.path()).expect_err("unknown field rejected");
        assert!(error.contains("unknown field"));

        let zero = config_file(r#"{"base_url":"http://x","timeout_sec":0}"#);
        let error = FileConfig::load(zero.path()).expect_err("zero timeout rejected");
        assert!(error.contains("timeout_sec must be greater than 0"));

        let blank = config_file(r#"{"base_url":"  "}"#);
        let error = FileConfig::load(blank.path()).expect_err("blank base_url rejected");
        assert!(error.contains("base_url must not be empty"));
    }

    #[test]
    fn missing_base_url_is_reported() {
        let file = config_file(r#"{"timeout_sec":5}"#);
        let path = file.path().to_string_lossy().into_owned();

        let error = resolve_backend_choice(Some("http"), Some(&path), None)
            .expect_err("base_url is required");

        assert!(error.contains("base_url is required"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let error = resolve_backend_choice(Some("grpc"), None, None)
            .expect_err("unknown backend rejected");

        assert!(error.contains("Unsupported backend 'grpc'"));
    }
}
