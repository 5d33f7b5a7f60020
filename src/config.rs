use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const RECORDS_URL_ENV: &str = "AGENTMAP_RECORDS_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            longitude: 133.775,
            latitude: -25.2744,
            zoom: 12.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarkerConfig {
    pub color: String,
    pub size: f64,
    pub enable_clustering: bool,
    /// Screen pixels within which points are merged into one cluster.
    pub cluster_radius: u32,
    /// Highest zoom at which clustering still happens.
    pub cluster_max_zoom: u32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            color: "#3B82F6".to_string(),
            size: 8.0,
            enable_clustering: true,
            cluster_radius: 50,
            cluster_max_zoom: 14,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HeatmapConfig {
    pub radius: f64,
    pub opacity: f64,
    /// Zoom at which the heatmap has fully faded out. Must not exceed `max_zoom`.
    pub fade_out_zoom: f64,
    pub max_zoom: f64,
    /// Existing style layer the heatmap is inserted beneath.
    pub before_layer: Option<String>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            radius: 60.0,
            opacity: 0.6,
            fade_out_zoom: 13.0,
            max_zoom: 15.0,
            before_layer: Some("waterway-label".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub records_url: Option<String>,
    pub initial_view: ViewState,
    pub markers: MarkerConfig,
    pub heatmap: HeatmapConfig,
    /// Delay before vertex and guide-line layers are removed after a polygon closes.
    pub drawing_grace_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            records_url: None,
            initial_view: ViewState::default(),
            markers: MarkerConfig::default(),
            heatmap: HeatmapConfig::default(),
            drawing_grace_ms: 100,
        }
    }
}

impl MapConfig {
    pub fn from_ron_str(input: &str) -> Result<Self, ConfigError> {
        let mut config: MapConfig = ron::from_str(input)?;
        config.normalise();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_ron_str(&contents)
    }

    /// Applies the records URL from the environment, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(RECORDS_URL_ENV) {
            if !url.trim().is_empty() {
                self.records_url = Some(url);
            }
        }
        self
    }

    pub fn drawing_grace(&self) -> Duration {
        Duration::from_millis(self.drawing_grace_ms)
    }

    fn normalise(&mut self) {
        // heatmap must be fully transparent before the layer stops rendering
        if self.heatmap.fade_out_zoom > self.heatmap.max_zoom {
            self.heatmap.fade_out_zoom = self.heatmap.max_zoom;
        }
    }
}
