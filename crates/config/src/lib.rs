//! Layered configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A TOML, YAML or JSON file: the one passed explicitly, otherwise
//!    `config.toml` in the platform config directory (if it exists).
//! 3. `QUIRE_`-prefixed environment variables, with `__` separating nested
//!    keys (`QUIRE_GRAPH__LIST_TIMEOUT_SECS=10`).
//!
//! Secrets (client id, refresh token) are deliberately not part of this
//! struct; they live in the `.env` file named by [`AuthConfig::env_file`].

pub mod error;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ErrorKind, Result};

const ENV_PREFIX: &str = "QUIRE_";
const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "quire")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the raw payload cache.
    pub cache_dir: PathBuf,
    /// Default root of the Markdown output tree.
    pub output_dir: PathBuf,
    pub graph: GraphConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
    /// Deadline for listing requests (JSON).
    pub list_timeout_secs: u64,
    /// Deadline for page content downloads (HTML).
    pub content_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File holding `MICROSOFT_*` credentials. Rotated refresh tokens are
    /// written back here.
    pub env_file: PathBuf,
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = project_dirs()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".quire-cache"));
        Self {
            cache_dir,
            output_dir: PathBuf::from("wiki_cache"),
            graph: GraphConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            list_timeout_secs: 30,
            content_timeout_secs: 60,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            scopes: vec!["Notes.Read.All".to_string(), "Sites.Read.All".to_string()],
        }
    }
}

impl GraphConfig {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_secs(self.content_timeout_secs)
    }
}

impl Config {
    /// Load and validate configuration from every source.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// Build the layered provider chain without extracting it, so callers
    /// (and tests) can merge extra values on top.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path);
            },
            None => {
                if let Some(default) = project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
                    && default.is_file()
                {
                    figment = merge_file(figment, &default);
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .or_raise(|| ErrorKind::Invalid("settings do not match the expected shape".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.graph.list_timeout_secs == 0 || self.graph.content_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("request timeouts must be at least one second".to_string()));
        }
        if !(self.graph.base_url.starts_with("https://") || self.graph.base_url.starts_with("http://")) {
            exn::bail!(ErrorKind::Invalid(format!("graph.base_url is not an HTTP URL: {}", self.graph.base_url)));
        }
        if self.auth.scopes.is_empty() {
            exn::bail!(ErrorKind::Invalid("auth.scopes must not be empty".to_string()));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    debug!(path = %path.display(), "loading config file");
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn file_with(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.graph.list_timeout(), Duration::from_secs(30));
        assert_eq!(config.graph.content_timeout(), Duration::from_secs(60));
        assert_eq!(config.output_dir, PathBuf::from("wiki_cache"));
    }

    #[rstest]
    #[case(".toml", "output_dir = \"/srv/wiki\"\n[graph]\nlist_timeout_secs = 5\n")]
    #[case(".yaml", "output_dir: /srv/wiki\ngraph:\n  list_timeout_secs: 5\n")]
    #[case(".json", r#"{"output_dir": "/srv/wiki", "graph": {"list_timeout_secs": 5}}"#)]
    fn test_file_overrides_defaults(#[case] suffix: &str, #[case] contents: &str) {
        let file = file_with(suffix, contents);
        let config = Config::from_figment(Config::figment(Some(file.path())).unwrap()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/wiki"));
        assert_eq!(config.graph.list_timeout_secs, 5);
        // Untouched nested keys keep their defaults.
        assert_eq!(config.graph.content_timeout_secs, 60);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::figment(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let figment = Config::figment(None).unwrap().merge(("graph.content_timeout_secs", 0));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)));

        let figment = Config::figment(None).unwrap().merge(("graph.base_url", "ftp://example.com"));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let file = file_with(".toml", "[graph]\nlist_timeout_secs = \"soon\"\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)));
        // The parser's own report is kept underneath, naming the offending key.
        let cause = err.frame().children().first().unwrap().error().to_string();
        assert!(cause.contains("list_timeout_secs"), "{cause}");
    }
}
