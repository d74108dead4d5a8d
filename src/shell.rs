use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tubearc_core::core::events::{
    EventEmitter, StatusTone, StatusUpdate, ToolState, ToolStateChanged,
};

use crate::core::archiver::Archiver;
use crate::core::configuration::Configuration;
use crate::core::http_client::HttpFetcher;
use crate::models::download::{DownloadSelection, Quality};
use crate::storage::config::ConfigStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YouTube, TikTok or Instagram link
    pub url: Option<String>,

    /// Save directory (defaults to the last one used)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// best, worst or audio-only; YouTube only
    #[arg(short, long, default_value = "best")]
    pub quality: Quality,

    /// Download the video stream only, no merging
    #[arg(long)]
    pub video: bool,

    /// Download the audio stream only, converted to mp3
    #[arg(long)]
    pub audio: bool,

    /// Also save description and thumbnail
    #[arg(long)]
    pub metadata: bool,

    /// Also save subtitles as srt
    #[arg(long)]
    pub subtitles: bool,

    /// Check for a new release even if one ran today
    #[arg(long)]
    pub check_updates: bool,

    /// Download a newer release, if any, for manual install
    #[arg(long)]
    pub stage_update: bool,

    /// Provision tools and exit
    #[arg(long)]
    pub setup_only: bool,

    /// Give up on a download after this many seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,
}

impl Cli {
    pub fn selection(&self, url: &str, default_dir: PathBuf) -> DownloadSelection {
        DownloadSelection {
            url: url.to_string(),
            output_dir: self.dir.clone().unwrap_or(default_dir),
            quality: self.quality,
            combined: !(self.video || self.audio),
            video_only: self.video,
            audio_only: self.audio,
            want_metadata: self.metadata,
            want_subtitles: self.subtitles,
        }
    }
}

/// Prints events to the terminal in place of a window's status label.
#[derive(Debug, Default)]
pub struct ConsoleEmitter {
    colored: bool,
}

impl ConsoleEmitter {
    pub fn new() -> Self {
        Self {
            colored: std::io::stdout().is_terminal(),
        }
    }

    /// Wraps `text` in the ANSI colour matching a status or platform colour name.
    pub fn paint(&self, color: &str, text: &str) -> String {
        if !self.colored {
            return text.to_string();
        }
        let code = match color {
            "gray" => "90",
            "blue" => "34",
            "green" => "32",
            "orange" => "33",
            "red" => "31",
            "purple" => "35",
            _ => return text.to_string(),
        };
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

fn tone_marker(tone: StatusTone) -> &'static str {
    match tone {
        StatusTone::Info => "   ",
        StatusTone::Busy => "...",
        StatusTone::Success => " ok",
        StatusTone::Warning => " !!",
        StatusTone::Error => "ERR",
    }
}

pub fn describe_tool_state(state: &ToolState) -> String {
    match state {
        ToolState::Missing => "missing".into(),
        ToolState::Downloading { mirror, of } => format!("downloading (source {}/{})", mirror, of),
        ToolState::Downloaded => "downloaded".into(),
        ToolState::DownloadFailed { mirror, reason } => {
            format!("source {} failed: {}", mirror, reason)
        }
        ToolState::Extracting => "extracting".into(),
        ToolState::Extracted => "extracted".into(),
        ToolState::ExtractFailed { reason } => format!("extraction failed: {}", reason),
        ToolState::Ready => "ready".into(),
    }
}

impl EventEmitter for ConsoleEmitter {
    fn emit_status(&self, status: &StatusUpdate) {
        let marker = self.paint(status.tone.color(), tone_marker(status.tone));
        let line = format!("[{}] {}", marker, status.message);
        if status.tone == StatusTone::Error {
            eprintln!("\n{}", line);
        } else {
            println!("\n{}", line);
        }
    }

    fn emit_tool_state(&self, change: &ToolStateChanged) {
        println!("  {}: {}", change.tool, describe_tool_state(&change.state));
    }

    fn emit_progress(&self, percent: f64) {
        print!("\r  {:5.1}%", percent);
        let _ = std::io::stdout().flush();
    }
}

/// Returns the process exit code.
pub async fn run(cli: Cli) -> u8 {
    let config = Configuration::desktop().with_download_timeout(Duration::from_secs(cli.timeout));
    let fetcher = match HttpFetcher::new(&config) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create HTTP client: {}", e);
            return 1;
        }
    };
    let store = ConfigStore::from_config(&config);
    let emitter = Arc::new(ConsoleEmitter::new());
    let mut archiver = Archiver::new(config, store, Arc::new(fetcher), emitter.clone());

    let report = archiver
        .startup(cli.check_updates || cli.stage_update)
        .await;

    if cli.stage_update {
        match report.refresh.available() {
            Some(info) => {
                if !info.release_notes.is_empty() {
                    println!("Release notes:\n{}", info.release_notes);
                }
                if archiver.stage_update(info).await.is_err() {
                    return 1;
                }
            }
            None => println!("No newer release available"),
        }
    }

    if !report.provisioning.is_ready() {
        return 1;
    }
    if cli.setup_only {
        return 0;
    }

    let Some(url) = cli.url.as_deref() else {
        if cli.stage_update || cli.check_updates {
            return 0;
        }
        eprintln!("No URL given; run with --help for usage");
        return 1;
    };

    let platform = archiver.classify(url);
    println!("{}", emitter.paint(platform.color(), platform.label()));

    let selection = cli.selection(url, archiver.settings().download_path.clone());

    let (progress_tx, mut progress_rx) = mpsc::channel::<f64>(32);
    let progress_emitter = emitter.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(pct) = progress_rx.recv().await {
            progress_emitter.emit_progress(pct);
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = archiver.submit(&selection, progress_tx, Some(&cancel)).await;
    let _ = progress_task.await;

    match result {
        Ok(outcome) if outcome.succeeded => {
            for file in &outcome.produced_files {
                println!("  {}", file.display());
            }
            0
        }
        Ok(outcome) => {
            eprintln!("  log: {}", outcome.log_path.display());
            1
        }
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_selection() {
        let cli = Cli::parse_from(["tubearc", "https://youtu.be/abc", "--audio", "-q", "worst"]);
        let sel = cli.selection("https://youtu.be/abc", PathBuf::from("/media"));
        assert!(!sel.combined);
        assert!(sel.audio_only);
        assert!(!sel.video_only);
        assert_eq!(sel.quality, Quality::Worst);
        assert_eq!(sel.output_dir, PathBuf::from("/media"));
        assert_eq!(cli.timeout, 600);
    }

    #[test]
    fn defaults_are_combined_best() {
        let cli = Cli::parse_from(["tubearc", "--dir", "/tmp/out", "https://youtu.be/abc"]);
        let sel = cli.selection("https://youtu.be/abc", PathBuf::from("/media"));
        assert!(sel.combined);
        assert_eq!(sel.quality, Quality::Best);
        assert_eq!(sel.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn bad_quality_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["tubearc", "-q", "8k"]).is_err());
    }

    #[test]
    fn tool_states_read_naturally() {
        assert_eq!(
            describe_tool_state(&ToolState::Downloading { mirror: 2, of: 3 }),
            "downloading (source 2/3)"
        );
        assert_eq!(describe_tool_state(&ToolState::Ready), "ready");
    }

    #[test]
    fn colours_follow_tone_and_platform() {
        let console = ConsoleEmitter { colored: true };
        assert_eq!(
            console.paint(StatusTone::Success.color(), " ok"),
            "\x1b[32m ok\x1b[0m"
        );
        assert_eq!(
            console.paint(StatusTone::Error.color(), "ERR"),
            "\x1b[31mERR\x1b[0m"
        );
        let tiktok = tubearc_core::platforms::classify("https://www.tiktok.com/@u/video/1");
        assert_eq!(
            console.paint(tiktok.color(), tiktok.label()),
            "\x1b[35mTikTok detected\x1b[0m"
        );

        let plain = ConsoleEmitter::default();
        assert_eq!(plain.paint(StatusTone::Warning.color(), " !!"), " !!");
    }
}
