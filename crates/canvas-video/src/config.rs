use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment override for the directory `~/` sources resolve against.
pub const APP_ROOT_ENV: &str = "CANVAS_VIDEO_APP_ROOT";

const DEFAULT_POSITION_POLL_MS: u64 = 1000;

/// A requested element dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Px(f32),
    Percent(f32),
    Auto,
}

impl Length {
    pub fn is_percent(&self) -> bool {
        matches!(self, Length::Percent(_))
    }

    pub fn as_px(&self) -> Option<f32> {
        match self {
            Length::Px(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromStr for Length {
    type Err = String;

    /// Accepts `auto`, `50%`, `300px` and bare numbers (pixels).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Length::Auto);
        }
        if let Some(pct) = s.strip_suffix('%') {
            return pct
                .trim()
                .parse()
                .map(Length::Percent)
                .map_err(|e| format!("invalid percentage {s:?}: {e}"));
        }
        let px = s.strip_suffix("px").unwrap_or(s);
        px.trim()
            .parse()
            .map(Length::Px)
            .map_err(|e| format!("invalid length {s:?}: {e}"))
    }
}

/// How the element gets its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// Explicit width/height drive the native container.
    Custom,
    /// A parent layout container owns sizing.
    #[default]
    Container,
}

/// Host-facing element attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub src: Option<String>,
    pub autoplay: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub controls: bool,
    pub muted: bool,
    pub width: Length,
    pub height: Length,
    pub mode: SizingMode,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            src: None,
            autoplay: false,
            looping: false,
            controls: false,
            muted: false,
            width: Length::Auto,
            height: Length::Auto,
            mode: SizingMode::Container,
        }
    }
}

impl VideoConfig {
    /// Defaults for an element created for drawing into a canvas: custom
    /// sizing at 300x150.
    pub fn custom() -> Self {
        Self {
            width: Length::Px(300.0),
            height: Length::Px(150.0),
            mode: SizingMode::Custom,
            ..Self::default()
        }
    }
}

/// Persisted player tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub version: u32,
    /// Cadence of `timeupdate` polling while playing.
    #[serde(default = "default_position_poll_ms")]
    pub position_poll_ms: u64,
    /// Optional independent redraw cadence while playing.
    #[serde(default)]
    pub frame_poll_ms: Option<u64>,
    #[serde(default)]
    pub app_root: Option<PathBuf>,
}

fn default_position_poll_ms() -> u64 {
    DEFAULT_POSITION_POLL_MS
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            position_poll_ms: DEFAULT_POSITION_POLL_MS,
            frame_poll_ms: None,
            app_root: None,
        }
    }
}

impl PlayerSettings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("canvas-video").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or malformed files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to save settings to {}: {e}", path.display());
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Directory `~/` sources resolve against: explicit setting, then
    /// `CANVAS_VIDEO_APP_ROOT`, then the executable's directory, then the CWD.
    pub fn resolve_app_root(&self) -> PathBuf {
        if let Some(root) = &self.app_root {
            return root.clone();
        }
        if let Some(root) = std::env::var_os(APP_ROOT_ENV) {
            return PathBuf::from(root);
        }
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                return dir.to_path_buf();
            }
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let s = PlayerSettings::default();
        assert_eq!(s.version, 1);
        assert_eq!(s.position_poll_ms, 1000);
        assert!(s.frame_poll_ms.is_none());
        assert!(s.app_root.is_none());
    }

    #[test]
    fn settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PlayerSettings {
            position_poll_ms: 250,
            frame_poll_ms: Some(16),
            app_root: Some(PathBuf::from("/opt/app")),
            ..PlayerSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(PlayerSettings::load_from(&path), settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"version": 1}"#).unwrap();
        let s = PlayerSettings::load_from(&path);
        assert_eq!(s.position_poll_ms, 1000);
        assert!(s.frame_poll_ms.is_none());
    }

    #[test]
    fn malformed_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PlayerSettings::load_from(&path), PlayerSettings::default());
        assert_eq!(
            PlayerSettings::load_from(&dir.path().join("absent.json")),
            PlayerSettings::default()
        );
    }

    #[test]
    fn explicit_app_root_wins() {
        let s = PlayerSettings {
            app_root: Some(PathBuf::from("/srv/app")),
            ..PlayerSettings::default()
        };
        assert_eq!(s.resolve_app_root(), PathBuf::from("/srv/app"));
    }

    #[test]
    fn length_parsing() {
        assert_eq!("auto".parse::<Length>(), Ok(Length::Auto));
        assert_eq!("50%".parse::<Length>(), Ok(Length::Percent(50.0)));
        assert_eq!("300px".parse::<Length>(), Ok(Length::Px(300.0)));
        assert_eq!(" 120 ".parse::<Length>(), Ok(Length::Px(120.0)));
        assert!("wide".parse::<Length>().is_err());
        assert!("%".parse::<Length>().is_err());
    }

    #[test]
    fn custom_config_is_300_by_150() {
        let c = VideoConfig::custom();
        assert_eq!(c.mode, SizingMode::Custom);
        assert_eq!(c.width, Length::Px(300.0));
        assert_eq!(c.height, Length::Px(150.0));
    }

    #[test]
    fn config_reads_loop_attribute() {
        let c: VideoConfig =
            serde_json::from_str(r#"{"src": "~/a.mp4", "loop": true, "width": {"percent": 100.0}}"#)
                .unwrap();
        assert!(c.looping);
        assert_eq!(c.src.as_deref(), Some("~/a.mp4"));
        assert!(c.width.is_percent());
        assert_eq!(c.height, Length::Auto);
    }
}
