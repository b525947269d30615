//! Session configuration.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clipboard::CLIPBOARD_CHANNEL_NAME;
use crate::engine::EngineSettings;
use crate::error::RdviewError;
use crate::screen::PixelFormat;

/// Top-level configuration for one session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Server settings.
    pub server: ServerConfig,
    /// Desktop / display settings.
    pub display: DisplayConfig,
    /// Login credentials.
    pub credentials: CredentialsConfig,
    /// Clipboard synchronization.
    pub clipboard: ClipboardConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

/// Desktop / display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Requested desktop width.
    pub desktop_width: u16,
    /// Requested desktop height.
    pub desktop_height: u16,
    /// Requested color depth (16, 24 or 32).
    pub color_depth: u8,
    /// Enable the protocol bitmap cache.
    pub bitmap_cache: bool,
    /// Repaint cap for the presentation layer, frames per second.
    pub frame_rate_limit: u32,
}

/// Login credentials. The password never appears in debug output.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Clipboard synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Open the clipboard channel and keep both sides in sync.
    pub enabled: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
    /// Optional log file.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3389,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            desktop_width: 1280,
            desktop_height: 800,
            color_depth: 32,
            bitmap_cache: true,
            frame_rate_limit: 40,
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Validation / loading ─────────────────────────────────────────

impl SessionConfig {
    /// Check connect parameters before any engine activity.
    pub fn validate(&self) -> Result<(), RdviewError> {
        if self.server.host.trim().is_empty() {
            return Err(RdviewError::Configuration("server host must not be empty"));
        }
        if self.display.desktop_width == 0 || self.display.desktop_height == 0 {
            return Err(RdviewError::Configuration("desktop size must be non-zero"));
        }
        if PixelFormat::from_color_depth(self.display.color_depth).is_err() {
            return Err(RdviewError::Configuration(
                "color depth must be 16, 24 or 32",
            ));
        }
        Ok(())
    }

    /// The settings handed to the protocol engine.
    pub fn engine_settings(&self) -> EngineSettings {
        let mut static_channels = Vec::new();
        if self.clipboard.enabled {
            static_channels.push(CLIPBOARD_CHANNEL_NAME.to_owned());
        }
        EngineSettings {
            host: self.server.host.clone(),
            port: self.server.port,
            desktop_width: self.display.desktop_width,
            desktop_height: self.display.desktop_height,
            color_depth: self.display.color_depth,
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            static_channels,
        }
    }

    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SessionConfig {
        SessionConfig {
            server: ServerConfig {
                host: "h".into(),
                port: 3389,
            },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_needs_a_host() {
        let cfg = SessionConfig::default();
        assert!(matches!(
            cfg.validate(),
            Err(RdviewError::Configuration(_))
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zero_desktop_size_rejected() {
        let mut cfg = valid();
        cfg.display.desktop_width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn odd_color_depth_rejected() {
        let mut cfg = valid();
        cfg.display.color_depth = 15;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn clipboard_toggles_static_channel() {
        let mut cfg = valid();
        assert_eq!(cfg.engine_settings().static_channels, vec!["cliprdr"]);

        cfg.clipboard.enabled = false;
        assert!(cfg.engine_settings().static_channels.is_empty());
    }

    #[test]
    fn roundtrip_config() {
        let cfg = valid();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.host, "h");
        assert_eq!(parsed.display.frame_rate_limit, 40);
        assert!(parsed.clipboard.enabled);
    }

    #[test]
    fn debug_never_shows_password() {
        let mut cfg = valid();
        cfg.credentials.password = "hunter2".into();
        let text = format!("{cfg:?}");
        assert!(!text.contains("hunter2"));
    }
}
