use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::download::DownloadMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Downloader,
    ArchiveUtility,
    MediaProcessor,
}

/// How a tool's artifact is shipped by its mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packaging {
    Binary,
    /// Unpacked by the provisioned archive utility.
    SevenZip { members: Vec<String> },
    Zip { members: Vec<String> },
    TarXz { members: Vec<String> },
}

impl Packaging {
    /// File names to pull out of the archive; the first is the tool itself.
    pub fn members(&self) -> &[String] {
        match self {
            Packaging::Binary => &[],
            Packaging::SevenZip { members }
            | Packaging::Zip { members }
            | Packaging::TarXz { members } => members,
        }
    }

    pub fn needs_archive_utility(&self) -> bool {
        matches!(self, Packaging::SevenZip { .. })
    }

    pub fn download_suffix(&self) -> &'static str {
        match self {
            Packaging::Binary => "download",
            Packaging::SevenZip { .. } => "7z",
            Packaging::Zip { .. } => "zip",
            Packaging::TarXz { .. } => "tar.xz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub name: String,
    pub local_path: PathBuf,
    /// Primary source first, then fallbacks in the order they are tried.
    pub remote_urls: Vec<String>,
    pub packaging: Packaging,
    pub required_for_download: bool,
    pub required_for_combined_mode: bool,
    pub self_update_flag: Option<String>,
    pub version_flag: Option<String>,
}

impl ToolDescriptor {
    pub fn is_present(&self) -> bool {
        self.local_path.is_file()
    }

    pub fn bin_dir(&self) -> &Path {
        self.local_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn required_for(&self, mode: DownloadMode) -> bool {
        self.required_for_download
            || (self.required_for_combined_mode && mode == DownloadMode::Combined)
    }
}

pub fn find_tool(tools: &[ToolDescriptor], kind: ToolKind) -> Option<&ToolDescriptor> {
    tools.iter().find(|t| t.kind == kind)
}

pub fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg() -> ToolDescriptor {
        ToolDescriptor {
            kind: ToolKind::MediaProcessor,
            name: "ffmpeg".into(),
            local_path: PathBuf::from("/opt/bin/ffmpeg"),
            remote_urls: vec![],
            packaging: Packaging::TarXz {
                members: vec!["ffmpeg".into(), "ffprobe".into()],
            },
            required_for_download: false,
            required_for_combined_mode: true,
            self_update_flag: None,
            version_flag: Some("-version".into()),
        }
    }

    #[test]
    fn media_processor_only_required_when_combining() {
        let tool = ffmpeg();
        assert!(tool.required_for(DownloadMode::Combined));
        assert!(!tool.required_for(DownloadMode::AudioOnly));
        assert!(!tool.required_for(DownloadMode::Both));
    }

    #[test]
    fn members_and_suffixes() {
        let tool = ffmpeg();
        assert_eq!(tool.packaging.members()[0], "ffmpeg");
        assert_eq!(tool.packaging.download_suffix(), "tar.xz");
        assert!(!tool.packaging.needs_archive_utility());
        assert!(Packaging::Binary.members().is_empty());
        assert_eq!(tool.bin_dir(), Path::new("/opt/bin"));
    }
}
