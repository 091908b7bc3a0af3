use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use confik::{Configuration, EnvSource};
use serde::{Deserialize, Serialize};

use self::yaml::YamlFileSource;
use crate::inkpress::cache::CacheMode;
use crate::inkpress::template::DEFAULT_MAX_DEPTH;
use crate::inkpress::truncate::OVERSHOOT_TOLERANCE;
use crate::inkpress::view::View;

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: CacheMode,
    /// Directory holding `app.json`, the page templates and `blog/`.
    pub site_root: String,
}

impl ServerConfig {
    pub fn site_root_path(&self) -> PathBuf {
        PathBuf::from(&self.site_root)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct RenderConfig {
    /// Visible characters of each post shown in the blog stream.
    pub stream_budget: usize,
    /// Visible characters of each post embedded in the Atom feed.
    pub feed_budget: usize,
    pub overshoot_tolerance: usize,
    pub max_depth: usize,
    /// Posts per blog stream chunk.
    pub page_size: usize,
    pub feed_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct RouteConfig {
    /// Request paths that are bounced to `/` instead of being served.
    pub blocked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct SiteConfig {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub routes: RouteConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                mode: CacheMode::Production,
                site_root: ".".into(),
            },
            render: RenderConfig {
                stream_budget: 250,
                feed_budget: 4000,
                overshoot_tolerance: OVERSHOOT_TOLERANCE,
                max_depth: DEFAULT_MAX_DEPTH,
                page_size: 10,
                feed_entries: 10,
            },
            routes: RouteConfig {
                blocked: [
                    "/.git",
                    "/admin",
                    "/admin.cfg",
                    "/app.json",
                    "/header.html",
                    "/meta.html",
                    "/package.json",
                    "/post.css",
                    "/post.html",
                    "/site.css",
                    "/stream.html",
                    "/web.config",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            },
        }
    }
}

impl SiteConfig {
    /// Load configuration from `config.yml` (if present) and environment variables.
    /// Falls back to the compiled-in defaults when parsing fails.
    pub fn load() -> Self {
        let config_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.yml");
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Self {
        let mut builder = SiteConfig::builder();

        if config_path.exists() {
            builder.override_with(YamlFileSource::new(config_path));
        }

        builder.override_with(EnvSource::new());

        match builder.try_build() {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Failed to load config.yml or env overrides: {err}. Using defaults.");
                SiteConfig::default()
            }
        }
    }
}

/// Read the site's `app.json` into the view every page starts from.
pub fn load_site_view(site_root: &Path) -> Result<View> {
    let path = site_root.join("app.json");
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading site configuration at {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing site configuration at {}", path.display()))?;
    Ok(View::from_json(&json))
}

mod yaml {
    use std::error::Error;
    use std::path::PathBuf;

    use confik::Source;
    use serde::de::DeserializeOwned;

    #[derive(Debug)]
    pub struct YamlFileSource {
        path: PathBuf,
    }

    impl YamlFileSource {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl<T> Source<T> for YamlFileSource
    where
        T: DeserializeOwned + confik::ConfigurationBuilder,
    {
        fn allows_secrets(&self) -> bool {
            false
        }

        fn provide(&self) -> Result<T, Box<dyn Error + Sync + Send>> {
            let contents = std::fs::read_to_string(&self.path)?;
            let parsed = serde_yaml::from_str(&contents)?;
            Ok(parsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn yaml_file_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(
            &path,
            r#"
server:
  host: 0.0.0.0
  port: 9000
  mode: draft
  site_root: ./site
render:
  stream_budget: 120
  feed_budget: 2000
  overshoot_tolerance: 10
  max_depth: 8
  page_size: 5
  feed_entries: 20
routes:
  blocked: ["/secret.html"]
"#,
        )
        .unwrap();

        let cfg = SiteConfig::load_from(&path);
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.mode, CacheMode::Draft);
        assert_eq!(cfg.server.site_root_path(), PathBuf::from("./site"));
        assert_eq!(cfg.render.stream_budget, 120);
        assert_eq!(cfg.render.page_size, 5);
        assert_eq!(cfg.routes.blocked, vec!["/secret.html".to_string()]);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(&path, "server: [not, a, map]").unwrap();

        let cfg = SiteConfig::load_from(&path);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.render.stream_budget, 250);
        assert!(cfg.routes.blocked.iter().any(|p| p == "/app.json"));
    }

    #[test]
    fn site_view_comes_from_app_json() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("app.json"),
            r#"{ "name": "Jane Doe", "links": [{ "name": "GitHub", "symbol": "G", "url": "https://github.com" }] }"#,
        )
        .unwrap();

        let view = load_site_view(tmp.path()).unwrap();
        assert_eq!(view.text("name").as_deref(), Some("Jane Doe"));
        assert!(view.contains("links"));
    }

    #[test]
    fn missing_app_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_site_view(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("app.json"));
    }
}
