use serde::{Deserialize, Serialize};
use std::fs;
use url::Url;

#[derive(Deserialize, Clone)]
pub struct Config {
    /// Base URL of the progress backend that owns the actual data.
    pub backend_url: String,
    pub listen_addr: Option<String>,
    pub default_project: Option<String>,
    pub thread_count: Option<usize>,
    pub cache_size_gb: Option<u64>,
    /// Whether the change-request overlay paints over or under the
    /// activity overlays.
    #[serde(default)]
    pub requests_on_top: bool,
    /// Base-map providers in cycling order; the first one is active on
    /// page load.
    pub tile_providers: Vec<TileProvider>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct TileProvider {
    pub id: String,
    pub name: String,
    /// Upstream tile URL template; tiles reach the page through our own
    /// proxy, so this never leaves the server.
    #[serde(skip_serializing)]
    pub url: String,
    pub attribution: Option<String>,
    pub max_zoom: Option<u32>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = if std::path::Path::new("progmap.toml").exists() {
            "progmap.toml"
        } else if std::path::Path::new("progmap.example.toml").exists() {
            "progmap.example.toml"
        } else {
            return Err(anyhow::anyhow!(
                "Configuration file not found. Please create progmap.toml or provide progmap.example.toml."
            ));
        };

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Url::parse(&config.backend_url)
            .map_err(|e| anyhow::anyhow!("invalid backend_url in {}: {}", path, e))?;
        Ok(config)
    }
}
