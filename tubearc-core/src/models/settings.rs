use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted user settings. Keys this version does not know about are kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub download_path: PathBuf,
    #[serde(default)]
    pub cached_tool_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub last_update_check: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Settings {
    pub fn with_download_path(download_path: impl AsRef<Path>) -> Self {
        Self {
            download_path: absolutize(download_path.as_ref()),
            cached_tool_versions: BTreeMap::new(),
            last_update_check: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn set_download_path(&mut self, path: impl AsRef<Path>) {
        self.download_path = absolutize(path.as_ref());
    }

    /// Re-establishes the absolute-path invariant after deserialization.
    pub fn normalize(&mut self) {
        if !self.download_path.is_absolute() {
            self.download_path = absolutize(&self.download_path);
        }
    }

    pub fn record_update_check(
        &mut self,
        at: DateTime<Utc>,
        versions: impl IntoIterator<Item = (String, String)>,
    ) {
        self.cached_tool_versions.extend(versions);
        self.last_update_check = Some(at);
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minimal_file_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"download_path": "/srv/media"}"#).unwrap();
        assert_eq!(s.download_path, PathBuf::from("/srv/media"));
        assert!(s.cached_tool_versions.is_empty());
        assert!(s.last_update_check.is_none());
        assert!(s.extra.is_empty());
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"{"download_path": "/srv/media", "theme": "dark", "window": {"w": 600}}"#;
        let s: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(s.extra.get("theme").and_then(|v| v.as_str()), Some("dark"));

        let written = serde_json::to_value(&s).unwrap();
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["window"]["w"], 600);
        assert_eq!(written["download_path"], "/srv/media");
    }

    #[test]
    fn relative_download_path_is_absolutized() {
        let mut s = Settings::with_download_path("/srv/media");
        s.set_download_path("relative/dir");
        assert!(s.download_path.is_absolute());
        assert!(s.download_path.ends_with("relative/dir"));
    }

    #[test]
    fn normalize_fixes_relative_path_from_file() {
        let mut s: Settings = serde_json::from_str(r#"{"download_path": "media"}"#).unwrap();
        s.normalize();
        assert!(s.download_path.is_absolute());
    }

    #[test]
    fn record_update_check_merges_versions() {
        let mut s = Settings::with_download_path("/srv/media");
        s.cached_tool_versions
            .insert("ffmpeg".into(), "7.1".into());
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        s.record_update_check(at, [("yt-dlp".to_string(), "2026.09.01".to_string())]);

        assert_eq!(s.last_update_check, Some(at));
        assert_eq!(s.cached_tool_versions.len(), 2);
        assert_eq!(s.cached_tool_versions["yt-dlp"], "2026.09.01");
    }
}
