use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::LayoutParams;
use crate::render::{DEFAULT_BUFFER_PAGES, DEFAULT_CACHE_LIMIT, DEFAULT_WORKERS, SchedulerParams};
use crate::view_state::ViewState;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Viewer tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Cached pages kept beyond the visible set
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,

    /// Pages rendered ahead of and behind the viewport
    #[serde(default = "default_buffer_pages")]
    pub buffer_pages: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_page_spacing")]
    pub page_spacing: u32,

    #[serde(default = "default_top_margin")]
    pub top_margin: u32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default = "default_true")]
    pub fit_to_width: bool,

    /// Delay between jumping to a search hit and drawing its highlight
    #[serde(default = "default_highlight_delay_ms")]
    pub highlight_delay_ms: u64,

    /// How often a polling host should drain render results
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long closing a document waits for the render workers
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_cache_limit() -> usize {
    DEFAULT_CACHE_LIMIT
}

fn default_buffer_pages() -> usize {
    DEFAULT_BUFFER_PAGES
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_page_spacing() -> u32 {
    LayoutParams::DEFAULT_SPACING
}

fn default_top_margin() -> u32 {
    LayoutParams::DEFAULT_TOP_MARGIN
}

fn default_zoom_step() -> f32 {
    ViewState::DEFAULT_ZOOM_STEP
}

fn default_true() -> bool {
    true
}

fn default_highlight_delay_ms() -> u64 {
    200
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            cache_limit: default_cache_limit(),
            buffer_pages: default_buffer_pages(),
            workers: default_workers(),
            page_spacing: default_page_spacing(),
            top_margin: default_top_margin(),
            zoom_step: default_zoom_step(),
            fit_to_width: true,
            highlight_delay_ms: default_highlight_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Settings {
    /// Parse a settings file, migrating it in memory if it is older than
    /// [`CURRENT_VERSION`]
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    /// Write the settings as commented YAML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_yaml::to_string(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, format!("{SETTINGS_HEADER}{body}")).map_err(io_err)?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Copy with values the viewer cannot work with replaced by defaults
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut settings = self.clone();
        if settings.workers == 0 {
            warn!("workers must be at least 1, using 1");
            settings.workers = 1;
        }
        if !(settings.zoom_step.is_finite() && settings.zoom_step > 1.0) {
            warn!(
                "zoom_step {} must be greater than 1, using {}",
                settings.zoom_step,
                default_zoom_step()
            );
            settings.zoom_step = default_zoom_step();
        }
        if settings.poll_interval_ms == 0 {
            warn!(
                "poll_interval_ms must be at least 1, using {}",
                default_poll_interval_ms()
            );
            settings.poll_interval_ms = default_poll_interval_ms();
        }
        if settings.page_spacing == 0 {
            warn!("page_spacing must be at least 1, using 1");
            settings.page_spacing = 1;
        }
        settings
    }

    #[must_use]
    pub fn scheduler_params(&self) -> SchedulerParams {
        SchedulerParams {
            buffer_pages: self.buffer_pages,
            cache_limit: self.cache_limit,
        }
    }

    #[must_use]
    pub fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            top_margin: self.top_margin,
            spacing: self.page_spacing,
        }
    }

    #[must_use]
    pub fn highlight_delay(&self) -> Duration {
        Duration::from_millis(self.highlight_delay_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# folio settings
# ============================================================================
# cache_limit          rendered pages kept beyond the ones on screen
# buffer_pages         pages rendered ahead of and behind the viewport
# workers              render threads (at least 1)
# zoom_step            factor applied by one zoom in/out step
# highlight_delay_ms   delay before a search hit is highlighted after a jump

"#;

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

/// `<config dir>/folio/config.yaml`
#[must_use]
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the default location when `None`.
///
/// A missing file at the default location is created with defaults. Any error
/// is logged and the defaults are used instead.
#[must_use]
pub fn load_settings(path: Option<&Path>) -> Settings {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match preferred_config_path() {
            Some(path) => (path, false),
            None => {
                warn!("Could not determine config directory, using default settings");
                return Settings::default();
            }
        },
    };

    if !path.exists() {
        if explicit {
            warn!("Settings file {path:?} not found, using defaults");
            return Settings::default();
        }
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = settings.save_to(&path) {
            warn!("{e}");
        }
        return settings;
    }

    match Settings::load_from(&path) {
        Ok(settings) => settings.sanitized(),
        Err(e) => {
            warn!("{e}, using default settings");
            Settings::default()
        }
    }
}
