//! Configuration loading for gpdload.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML file,
//! then environment variables. CLI flags are applied on top by the caller.

use gpdload_client::ClientConfig;
use gpdload_types::ConfigFile;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "gpdload.toml";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(10);

pub const ENV_HOST: &str = "APP_HOST";
pub const ENV_SUBSCRIPTION_KEY: &str = "SUBKEY";
pub const ENV_SUBSCRIPTION_KEY_ALT: &str = "API_SUBSCRIPTION_KEY";
pub const ENV_CANARY: &str = "CANARY";
pub const ENV_BASE_PATH: &str = "GPDLOAD_BASE_PATH";
pub const ENV_BROKER: &str = "GPDLOAD_BROKER";
pub const ENV_ORGANIZATION: &str = "GPDLOAD_ORGANIZATION";
pub const ENV_POLL_INTERVAL: &str = "GPDLOAD_POLL_INTERVAL";
pub const ENV_POLL_TIMEOUT: &str = "GPDLOAD_POLL_TIMEOUT";
pub const ENV_PAUSE: &str = "GPDLOAD_PAUSE";
pub const ENV_REQUEST_TIMEOUT: &str = "GPDLOAD_REQUEST_TIMEOUT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid duration for {key}: {value:?} ({source})")]
    Duration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("no service host configured (set {ENV_HOST}, `host` in the config file, or --host)")]
    MissingHost,

    #[error("no upload path configured (set base_path, or both broker and organization)")]
    MissingUploadPath,
}

/// Fully resolved harness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub host: String,
    pub base_path: Option<String>,
    pub subscription_key: Option<String>,
    pub canary: bool,
    pub broker: Option<String>,
    pub organization: Option<String>,
    pub poll_interval: Duration,
    /// `None` polls until the job completes.
    pub poll_timeout: Option<Duration>,
    /// Delay before each service call.
    pub pause: Duration,
    pub request_timeout: Option<Duration>,
}

impl HarnessConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            base_path: None,
            subscription_key: None,
            canary: false,
            broker: None,
            organization: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: None,
            pause: DEFAULT_PAUSE,
            request_timeout: None,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.host.clone(),
            subscription_key: self.subscription_key.clone(),
            canary: self.canary,
            timeout: self.request_timeout,
        }
    }

    /// Upload path relative to `host`.
    pub fn upload_path(&self) -> Result<String, ConfigError> {
        if let Some(base_path) = &self.base_path {
            return Ok(base_path.clone());
        }
        match (&self.broker, &self.organization) {
            (Some(broker), Some(org)) => Ok(gpdload_domain::upload_path(broker, org)),
            _ => Err(ConfigError::MissingUploadPath),
        }
    }
}

/// Load settings from `path` (if any) and the environment accessor `env`.
///
/// When `path` is `None`, `gpdload.toml` in the working directory is read if
/// it exists.
pub fn load<F>(path: Option<&Path>, env: F) -> Result<HarnessConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match path {
        Some(p) => read_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                read_file(default)?
            } else {
                ConfigFile::default()
            }
        }
    };
    resolve(file, env)
}

/// [`load`] against the process environment.
pub fn load_from_env(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    load(path, |key| std::env::var(key).ok())
}

pub fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// Merge a parsed file with environment overrides.
pub fn resolve<F>(mut f: ConfigFile, env: F) -> Result<HarnessConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.is_empty());

    override_with(&mut f.host, env(ENV_HOST));
    if let Some(key) = env(ENV_SUBSCRIPTION_KEY).or_else(|| env(ENV_SUBSCRIPTION_KEY_ALT)) {
        f.subscription_key = Some(key);
    }
    if let Some(canary) = env(ENV_CANARY) {
        f.canary = Some(truthy(&canary));
    }
    override_with(&mut f.base_path, env(ENV_BASE_PATH));
    override_with(&mut f.broker, env(ENV_BROKER));
    override_with(&mut f.organization, env(ENV_ORGANIZATION));
    override_with(&mut f.poll_interval, env(ENV_POLL_INTERVAL));
    override_with(&mut f.poll_timeout, env(ENV_POLL_TIMEOUT));
    override_with(&mut f.pause, env(ENV_PAUSE));
    override_with(&mut f.request_timeout, env(ENV_REQUEST_TIMEOUT));

    let host = f.host.ok_or(ConfigError::MissingHost)?;
    let mut cfg = HarnessConfig::new(host);
    cfg.base_path = f.base_path;
    cfg.subscription_key = f.subscription_key;
    cfg.canary = f.canary.unwrap_or(false);
    cfg.broker = f.broker;
    cfg.organization = f.organization;
    if let Some(v) = f.poll_interval {
        cfg.poll_interval = parse_duration("poll_interval", &v)?;
    }
    cfg.poll_timeout = f
        .poll_timeout
        .map(|v| parse_duration("poll_timeout", &v))
        .transpose()?;
    if let Some(v) = f.pause {
        cfg.pause = parse_duration("pause", &v)?;
    }
    cfg.request_timeout = f
        .request_timeout
        .map(|v| parse_duration("request_timeout", &v))
        .transpose()?;
    Ok(cfg)
}

pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::Duration {
        key,
        value: value.to_string(),
        source,
    })
}

fn override_with(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Any non-empty value enables a flag except `0` and `false`.
fn truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn host_is_required() {
        let err = resolve(ConfigFile::default(), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingHost));
    }

    #[test]
    fn defaults_apply() {
        let cfg = resolve(ConfigFile::default(), env(&[("APP_HOST", "http://h")])).unwrap();
        assert_eq!(cfg.host, "http://h");
        assert_eq!(cfg.poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.pause, Duration::from_secs(10));
        assert_eq!(cfg.poll_timeout, None);
        assert!(!cfg.canary);
        assert!(cfg.subscription_key.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigFile {
            host: Some("http://file".into()),
            subscription_key: Some("file-key".into()),
            poll_interval: Some("5s".into()),
            ..ConfigFile::default()
        };
        let cfg = resolve(
            file,
            env(&[
                ("APP_HOST", "http://env"),
                ("SUBKEY", "env-key"),
                ("GPDLOAD_POLL_INTERVAL", "250ms"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.host, "http://env");
        assert_eq!(cfg.subscription_key.as_deref(), Some("env-key"));
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn performance_key_name_is_accepted() {
        let cfg = resolve(
            ConfigFile::default(),
            env(&[("APP_HOST", "http://h"), ("API_SUBSCRIPTION_KEY", "k6-key")]),
        )
        .unwrap();
        assert_eq!(cfg.subscription_key.as_deref(), Some("k6-key"));
    }

    #[test]
    fn canary_follows_truthiness() {
        for (value, expected) in [("1", true), ("true", true), ("yes", true), ("0", false), ("false", false), ("", false)] {
            let cfg = resolve(
                ConfigFile::default(),
                env(&[("APP_HOST", "http://h"), ("CANARY", value)]),
            )
            .unwrap();
            assert_eq!(cfg.canary, expected, "CANARY={value:?}");
        }
    }

    #[test]
    fn bad_duration_names_key() {
        let err = resolve(
            ConfigFile::default(),
            env(&[("APP_HOST", "http://h"), ("GPDLOAD_POLL_TIMEOUT", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("poll_timeout"), "{err}");
    }

    #[test]
    fn upload_path_prefers_base_path() {
        let mut cfg = HarnessConfig::new("http://h");
        assert!(matches!(cfg.upload_path(), Err(ConfigError::MissingUploadPath)));

        cfg.broker = Some("B".into());
        cfg.organization = Some("O".into());
        assert_eq!(
            cfg.upload_path().unwrap(),
            "/brokers/B/organizations/O/debtpositions/file"
        );

        cfg.base_path = Some("/custom/file".into());
        assert_eq!(cfg.upload_path().unwrap(), "/custom/file");
    }

    #[test]
    fn client_config_carries_credentials() {
        let mut cfg = HarnessConfig::new("http://h");
        cfg.subscription_key = Some("k".into());
        cfg.canary = true;
        cfg.request_timeout = Some(Duration::from_secs(3));
        let client = cfg.client_config();
        assert_eq!(client.base_url, "http://h");
        assert_eq!(client.subscription_key.as_deref(), Some("k"));
        assert!(client.canary);
        assert_eq!(client.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpdload.toml");
        std::fs::write(
            &path,
            "host = \"http://toml\"\nbroker = \"77777777777\"\norganization = \"77777777777\"\npause = \"0s\"\n",
        )
        .unwrap();

        let cfg = load(Some(&path), env(&[])).unwrap();
        assert_eq!(cfg.host, "http://toml");
        assert_eq!(cfg.pause, Duration::ZERO);
        assert_eq!(
            cfg.upload_path().unwrap(),
            "/brokers/77777777777/organizations/77777777777/debtpositions/file"
        );
    }

    #[test]
    fn load_reports_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "hots = \"typo\"\n").unwrap();

        let err = load(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Some(Path::new("/no/such/gpdload.toml")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
