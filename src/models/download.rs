use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tubearc_core::platforms::Platform;

use crate::core::error::InvalidRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    #[default]
    Best,
    Worst,
    AudioOnly,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::Worst => "worst",
            Quality::AudioOnly => "audio-only",
        }
    }
}

impl FromStr for Quality {
    type Err = InvalidRequest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "worst" => Ok(Quality::Worst),
            "audio-only" | "audio only" | "audio_only" => Ok(Quality::AudioOnly),
            _ => Err(InvalidRequest::UnknownQuality(s.to_string())),
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// One merged mp4 with video and audio.
    Combined,
    VideoOnly,
    AudioOnly,
    /// Separate video and audio files, nothing merged.
    Both,
}

impl DownloadMode {
    /// `combined` wins over the separate-stream checkboxes.
    pub fn from_flags(combined: bool, video_only: bool, audio_only: bool) -> Option<Self> {
        match (combined, video_only, audio_only) {
            (true, _, _) => Some(DownloadMode::Combined),
            (false, true, true) => Some(DownloadMode::Both),
            (false, true, false) => Some(DownloadMode::VideoOnly),
            (false, false, true) => Some(DownloadMode::AudioOnly),
            (false, false, false) => None,
        }
    }
}

/// Raw form input as a shell collects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSelection {
    pub url: String,
    pub output_dir: PathBuf,
    pub quality: Quality,
    pub combined: bool,
    pub video_only: bool,
    pub audio_only: bool,
    pub want_metadata: bool,
    pub want_subtitles: bool,
}

impl DownloadSelection {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            quality: Quality::Best,
            combined: true,
            video_only: false,
            audio_only: false,
            want_metadata: false,
            want_subtitles: false,
        }
    }

    pub fn mode(&self) -> Option<DownloadMode> {
        DownloadMode::from_flags(self.combined, self.video_only, self.audio_only)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub platform: Platform,
    pub output_dir: PathBuf,
    pub quality: Quality,
    pub mode: DownloadMode,
    pub want_metadata: bool,
    pub want_subtitles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    VideoUnavailable,
    Private,
    AgeRestricted,
    NotFound,
    TimedOut,
    Cancelled,
    UnknownFailure,
}

impl ErrorCategory {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCategory::VideoUnavailable => "This video is unavailable or has been removed",
            ErrorCategory::Private => "This video is private",
            ErrorCategory::AgeRestricted => "This video is age-restricted and requires sign-in",
            ErrorCategory::NotFound => "Video not found (404 error)",
            ErrorCategory::TimedOut => "Download timed out",
            ErrorCategory::Cancelled => "Download cancelled",
            ErrorCategory::UnknownFailure => "Download failed",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub error_category: Option<ErrorCategory>,
    pub raw_log_excerpt: String,
    pub log_path: PathBuf,
    pub produced_files: Vec<PathBuf>,
}

impl DownloadOutcome {
    /// Status line for the shell: success, or the category message with the
    /// tail of the log for unclassified failures.
    pub fn summary(&self) -> String {
        match self.error_category {
            None if self.succeeded => "Download completed successfully!".to_string(),
            Some(ErrorCategory::UnknownFailure) | None => {
                let excerpt = self.raw_log_excerpt.trim();
                if excerpt.is_empty() {
                    ErrorCategory::UnknownFailure.message().to_string()
                } else {
                    format!("{}: {}", ErrorCategory::UnknownFailure.message(), excerpt)
                }
            }
            Some(category) => category.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_wins_over_checkboxes() {
        assert_eq!(
            DownloadMode::from_flags(true, true, true),
            Some(DownloadMode::Combined)
        );
        assert_eq!(
            DownloadMode::from_flags(false, true, true),
            Some(DownloadMode::Both)
        );
        assert_eq!(
            DownloadMode::from_flags(false, false, true),
            Some(DownloadMode::AudioOnly)
        );
        assert_eq!(DownloadMode::from_flags(false, false, false), None);
    }

    #[test]
    fn quality_parsing() {
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!(" Worst ".parse::<Quality>().unwrap(), Quality::Worst);
        assert_eq!("audio only".parse::<Quality>().unwrap(), Quality::AudioOnly);
        assert_eq!("AUDIO-ONLY".parse::<Quality>().unwrap(), Quality::AudioOnly);
        assert_eq!(
            "1080p".parse::<Quality>(),
            Err(InvalidRequest::UnknownQuality("1080p".into()))
        );
    }

    #[test]
    fn summary_prefers_category_message() {
        let outcome = DownloadOutcome {
            exit_code: Some(1),
            succeeded: false,
            error_category: Some(ErrorCategory::Private),
            raw_log_excerpt: "ERROR: Private video".into(),
            log_path: PathBuf::from("/tmp/x.log"),
            produced_files: vec![],
        };
        assert_eq!(outcome.summary(), "This video is private");

        let unknown = DownloadOutcome {
            error_category: Some(ErrorCategory::UnknownFailure),
            raw_log_excerpt: "ERROR: boom\n".into(),
            ..outcome
        };
        assert_eq!(unknown.summary(), "Download failed: ERROR: boom");
    }
}
