use std::path::PathBuf;
use std::time::Duration;

use tubearc_core::fs_paths::{AppPaths, DesktopPaths};

use crate::core::tools::{bin_name, Packaging, ToolDescriptor, ToolKind};

pub const APP_NAME: &str = "tubearc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const GITHUB_REPO: &str = "SilentPSLLC/NinjaVideoDownloader";
const UPDATE_FILE_NAME: &str = "tubearc.py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// TikTok and Instagram in addition to YouTube.
    pub extended_platforms: bool,
    /// Video-only / audio-only / both modes next to the combined download.
    pub separate_streams: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            extended_platforms: true,
            separate_streams: true,
        }
    }
}

/// Everything the core needs to know about its environment. Built once at
/// startup and handed to each component by reference.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub app_version: String,
    pub data_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub settings_path: PathBuf,
    pub staging_dir: PathBuf,
    pub default_download_dir: PathBuf,
    pub tools: Vec<ToolDescriptor>,
    pub release_api_url: String,
    pub update_file_url: String,
    pub update_file_name: String,
    pub update_check_interval: chrono::Duration,
    pub download_timeout: Duration,
    pub tool_fetch_timeout: Duration,
    pub api_timeout: Duration,
    pub features: Features,
}

impl Configuration {
    pub fn desktop() -> Self {
        Self::from_paths(&DesktopPaths)
    }

    pub fn from_paths(paths: &dyn AppPaths) -> Self {
        let bin_dir = paths.bin_dir();
        let tools = default_tools(&bin_dir);
        Self {
            app_version: APP_VERSION.to_string(),
            data_dir: paths.data_dir(),
            staging_dir: paths.data_dir().join("staged"),
            settings_path: paths.settings_file(),
            default_download_dir: paths.downloads_dir(),
            bin_dir,
            tools,
            release_api_url: format!("https://api.github.com/repos/{}/releases/latest", GITHUB_REPO),
            update_file_url: format!(
                "https://raw.githubusercontent.com/{}/main/{}",
                GITHUB_REPO, UPDATE_FILE_NAME
            ),
            update_file_name: UPDATE_FILE_NAME.to_string(),
            update_check_interval: chrono::Duration::hours(24),
            download_timeout: Duration::from_secs(600),
            tool_fetch_timeout: Duration::from_secs(300),
            api_timeout: Duration::from_secs(10),
            features: Features::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn tool(&self, kind: ToolKind) -> Option<&ToolDescriptor> {
        crate::core::tools::find_tool(&self.tools, kind)
    }
}

fn default_tools(bin_dir: &std::path::Path) -> Vec<ToolDescriptor> {
    let mut tools = vec![ToolDescriptor {
        kind: ToolKind::Downloader,
        name: "yt-dlp".into(),
        local_path: bin_dir.join(bin_name("yt-dlp")),
        remote_urls: ytdlp_download_urls(),
        packaging: Packaging::Binary,
        required_for_download: true,
        required_for_combined_mode: true,
        self_update_flag: Some("-U".into()),
        version_flag: Some("--version".into()),
    }];

    if cfg!(target_os = "windows") {
        tools.push(ToolDescriptor {
            kind: ToolKind::ArchiveUtility,
            name: "7zr".into(),
            local_path: bin_dir.join(bin_name("7zr")),
            remote_urls: vec!["https://7-zip.org/a/7zr.exe".into()],
            packaging: Packaging::Binary,
            required_for_download: false,
            required_for_combined_mode: false,
            self_update_flag: None,
            version_flag: None,
        });
    }

    let (remote_urls, packaging) = ffmpeg_download_urls();
    tools.push(ToolDescriptor {
        kind: ToolKind::MediaProcessor,
        name: "ffmpeg".into(),
        local_path: bin_dir.join(bin_name("ffmpeg")),
        remote_urls,
        packaging,
        required_for_download: false,
        required_for_combined_mode: true,
        self_update_flag: None,
        version_flag: Some("-version".into()),
    });

    tools
}

fn ytdlp_download_urls() -> Vec<String> {
    let asset = if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else if cfg!(target_arch = "aarch64") {
        "yt-dlp_linux_aarch64"
    } else {
        "yt-dlp_linux"
    };
    vec![
        format!("https://github.com/yt-dlp/yt-dlp/releases/latest/download/{}", asset),
        format!(
            "https://github.com/yt-dlp/yt-dlp-nightly-builds/releases/latest/download/{}",
            asset
        ),
    ]
}

fn ffmpeg_download_urls() -> (Vec<String>, Packaging) {
    if cfg!(target_os = "windows") {
        (
            vec![
                "https://www.gyan.dev/ffmpeg/builds/ffmpeg-git-full.7z".into(),
                "https://github.com/GyanD/codexffmpeg/releases/download/7.1/ffmpeg-7.1-full_build.7z"
                    .into(),
            ],
            Packaging::SevenZip {
                members: vec![bin_name("ffmpeg"), bin_name("ffprobe")],
            },
        )
    } else if cfg!(target_os = "macos") {
        let url = if cfg!(target_arch = "aarch64") {
            "https://www.osxexperts.net/ffmpeg80arm.zip"
        } else {
            "https://www.osxexperts.net/ffmpeg80intel.zip"
        };
        (
            vec![url.into()],
            Packaging::Zip {
                members: vec!["ffmpeg".into()],
            },
        )
    } else if cfg!(target_arch = "aarch64") {
        (
            vec![
                "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-linuxarm64-gpl.tar.xz".into(),
                "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-arm64-static.tar.xz".into(),
            ],
            Packaging::TarXz {
                members: vec!["ffmpeg".into(), "ffprobe".into()],
            },
        )
    } else {
        (
            vec![
                "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-linux64-gpl.tar.xz".into(),
                "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz".into(),
            ],
            Packaging::TarXz {
                members: vec!["ffmpeg".into(), "ffprobe".into()],
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubearc_core::fs_paths::RootedPaths;

    #[test]
    fn tools_live_in_bin_dir() {
        let config = Configuration::from_paths(&RootedPaths::new("/opt/tubearc"));
        assert_eq!(config.bin_dir, PathBuf::from("/opt/tubearc/bin"));
        for tool in &config.tools {
            assert!(tool.local_path.starts_with(&config.bin_dir), "{}", tool.name);
            assert!(!tool.remote_urls.is_empty(), "{} has no mirrors", tool.name);
        }
    }

    #[test]
    fn downloader_always_required_and_self_updating() {
        let config = Configuration::from_paths(&RootedPaths::new("/opt/tubearc"));
        let ytdlp = config.tool(ToolKind::Downloader).unwrap();
        assert!(ytdlp.required_for_download);
        assert_eq!(ytdlp.self_update_flag.as_deref(), Some("-U"));
        assert!(ytdlp.remote_urls.len() >= 2);
    }

    #[test]
    fn archive_utility_present_when_ffmpeg_is_7z() {
        let config = Configuration::from_paths(&RootedPaths::new("/opt/tubearc"));
        let ffmpeg = config.tool(ToolKind::MediaProcessor).unwrap();
        if ffmpeg.packaging.needs_archive_utility() {
            assert!(config.tool(ToolKind::ArchiveUtility).is_some());
        }
    }

    #[test]
    fn update_check_is_daily() {
        let config = Configuration::from_paths(&RootedPaths::new("/opt/tubearc"));
        assert_eq!(config.update_check_interval, chrono::Duration::hours(24));
        assert!(config.release_api_url.ends_with("/releases/latest"));
    }
}
