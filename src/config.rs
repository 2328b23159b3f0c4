use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::result::Result;
use crate::stream::QualityTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingMode {
    Websocket,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the streaming site, used for the stats endpoint
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Overrides the signaling endpoint derived from `site_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signaling_url: Option<String>,

    #[serde(default = "default_signaling_mode")]
    pub signaling_mode: SignalingMode,

    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    #[serde(default)]
    pub default_quality: QualityTier,

    /// Viewer counter refresh period in milliseconds
    #[serde(default = "default_refresh_period")]
    pub viewers_counter_refresh_period: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            signaling_url: None,
            signaling_mode: default_signaling_mode(),
            stun_servers: default_stun_servers(),
            default_quality: QualityTier::default(),
            viewers_counter_refresh_period: default_refresh_period(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.viewers_counter_refresh_period == 0 {
            bail!("viewers_counter_refresh_period must be positive");
        }
        self.site_url()?;
        self.signaling_url()?;
        Ok(())
    }

    /// The site URL, always ending with a slash so relative joins stay below it.
    pub fn site_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.site_url)
            .with_context(|| format!("invalid site_url {:?}", self.site_url))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// The configured signaling endpoint, or one derived from the site URL:
    /// `ws(s)://<host>/_ws/` for websocket signaling and the site itself for
    /// HTTP signaling.
    pub fn signaling_url(&self) -> Result<Url> {
        if let Some(url) = &self.signaling_url {
            return Url::parse(url).with_context(|| format!("invalid signaling_url {:?}", url));
        }
        let site = self.site_url()?;
        match self.signaling_mode {
            SignalingMode::Http => Ok(site),
            SignalingMode::Websocket => {
                let scheme = if site.scheme() == "https" { "wss" } else { "ws" };
                let host = site.host_str().context("site_url has no host")?;
                let authority = match site.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                Ok(Url::parse(&format!("{}://{}/_ws/", scheme, authority))?)
            }
        }
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.viewers_counter_refresh_period)
    }
}

/// `<config dir>/config.toml` of the platform, or `config.toml` in the
/// working directory when there is no home.
pub fn default_path() -> PathBuf {
    ProjectDirs::from("", "", "ghostream-viewer")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

pub fn load(path: &Path) -> Result<Config> {
    // create a new file if it does not exist
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        let config = toml::from_str::<Config>("")?;
        info!("Writing default config to {}", path.display());
        file.write_all(toml::to_string(&config)?.as_ref())?;
        return Ok(config);
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn default_site_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_signaling_mode() -> SignalingMode {
    SignalingMode::Websocket
}

fn default_stun_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_refresh_period() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ghostream-viewer-{}-{}",
            name,
            uuid::Uuid::new_v4().simple()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = scratch_dir("create");
        let path = dir.join("nested").join("config.toml");

        let config = load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), Config::default());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = scratch_dir("partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(
            &path,
            "site_url = \"https://live.example.org\"\nsignaling_mode = \"http\"\ndefault_quality = \"480p\"\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.signaling_mode, SignalingMode::Http);
        assert_eq!(config.default_quality, QualityTier::new("480p"));
        assert_eq!(config.stun_servers, default_stun_servers());
        assert_eq!(config.refresh_period(), Duration::from_secs(1));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn zero_refresh_period_is_rejected() {
        let dir = scratch_dir("zero");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, "viewers_counter_refresh_period = 0\n").unwrap();

        assert!(load(&path).is_err());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn derives_endpoints_from_site() {
        let mut config = Config {
            site_url: "https://live.example.org/watch".into(),
            ..Default::default()
        };
        assert_eq!(config.site_url().unwrap().as_str(), "https://live.example.org/watch/");
        assert_eq!(config.signaling_url().unwrap().as_str(), "wss://live.example.org/_ws/");

        config.site_url = "http://localhost:8080".into();
        assert_eq!(config.signaling_url().unwrap().as_str(), "ws://localhost:8080/_ws/");

        config.signaling_mode = SignalingMode::Http;
        assert_eq!(config.signaling_url().unwrap().as_str(), "http://localhost:8080/");

        config.signaling_url = Some("https://signal.example.org/app/".into());
        assert_eq!(
            config.signaling_url().unwrap().as_str(),
            "https://signal.example.org/app/"
        );
    }
}
