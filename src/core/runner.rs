use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::{CoreError, Result};
use crate::models::download::{DownloadCommand, DownloadOutcome, ErrorCategory};

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.?\d*)%").unwrap());

const LINE_CHANNEL_CAPACITY: usize = 256;
const TAIL_LINES: usize = 200;
const EXCERPT_CHARS: usize = 300;
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "m4a", "mp3"];

/// Checked in order; the first substring found wins.
const FAILURE_PATTERNS: &[(&str, ErrorCategory)] = &[
    ("Sign in to confirm your age", ErrorCategory::AgeRestricted),
    ("Private video", ErrorCategory::Private),
    ("HTTP Error 404", ErrorCategory::NotFound),
    ("This video is unavailable", ErrorCategory::VideoUnavailable),
    ("Video unavailable", ErrorCategory::VideoUnavailable),
];

pub fn classify_failure(output: &str) -> ErrorCategory {
    FAILURE_PATTERNS
        .iter()
        .find(|(needle, _)| output.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::UnknownFailure)
}

pub fn parse_progress_line(line: &str) -> Option<f64> {
    if !line.contains('%') || !line.contains("ETA") {
        return None;
    }
    PERCENT_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Files the downloader reports writing, in the order it reports them.
pub fn parse_produced_file(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    if let Some((_, rest)) = line.split_once("Destination: ") {
        return Some(PathBuf::from(rest.trim()));
    }
    if let Some((_, rest)) = line.split_once("Merging formats into ") {
        return Some(PathBuf::from(rest.trim().trim_matches('"')));
    }
    if let Some(rest) = line.strip_suffix(" has already been downloaded") {
        let path = rest
            .strip_prefix("[download] ")
            .unwrap_or(rest)
            .trim();
        return Some(PathBuf::from(path));
    }
    None
}

fn excerpt(tail: &VecDeque<String>) -> String {
    let joined = tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
    let start = joined
        .char_indices()
        .rev()
        .nth(EXCERPT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    joined[start..].to_string()
}

fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

fn spawn_log_writer(log_path: PathBuf, mut rx: mpsc::Receiver<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let file = match tokio::fs::File::create(&log_path).await {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!("Could not create log file {}: {}", log_path.display(), e);
                None
            }
        };
        let mut writer = file.map(tokio::io::BufWriter::new);

        while let Some(line) = rx.recv().await {
            if let Some(w) = writer.as_mut() {
                let written = async {
                    w.write_all(line.as_bytes()).await?;
                    w.write_all(b"\n").await
                }
                .await;
                if let Err(e) = written {
                    tracing::warn!("Log write to {} failed: {}", log_path.display(), e);
                    writer = None;
                }
            }
        }

        if let Some(mut w) = writer {
            let _ = w.flush().await;
        }
    })
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

enum Ending {
    Exited(Option<i32>, bool),
    Stopped(ErrorCategory),
}

/// Runs downloader processes one at a time on behalf of the archiver.
#[derive(Debug, Clone)]
pub struct DownloadRunner {
    bin_dir: PathBuf,
}

impl DownloadRunner {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }

    pub async fn run(
        &self,
        command: &DownloadCommand,
        progress: mpsc::Sender<f64>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<DownloadOutcome> {
        tokio::fs::create_dir_all(&command.output_dir).await?;

        tracing::info!(
            "[runner] starting {} {}",
            command.program.display(),
            command.args.join(" ")
        );

        let mut child = crate::core::process::command(&command.program, &self.bin_dir)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CoreError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let (line_tx, mut line_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let (log_tx, log_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let log_writer = spawn_log_writer(command.log_path.clone(), log_rx);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut reported: Vec<PathBuf> = Vec::new();
        let mut stopped: Option<ErrorCategory> = None;

        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    tracing::debug!("[yt-dlp] {}", line);

                    if let Some(pct) = parse_progress_line(&line) {
                        let _ = progress.try_send(pct);
                    }
                    if let Some(path) = parse_produced_file(&line) {
                        if !reported.contains(&path) {
                            reported.push(path);
                        }
                    }
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                    let _ = log_tx.send(line).await;
                }
                _ = &mut deadline => {
                    stopped = Some(ErrorCategory::TimedOut);
                    break;
                }
                _ = wait_cancelled(cancel) => {
                    stopped = Some(ErrorCategory::Cancelled);
                    break;
                }
            }
        }

        let ending = match stopped {
            Some(category) => Ending::Stopped(category),
            None => tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    Ending::Exited(status.code(), status.success())
                }
                _ = &mut deadline => Ending::Stopped(ErrorCategory::TimedOut),
                _ = wait_cancelled(cancel) => Ending::Stopped(ErrorCategory::Cancelled),
            },
        };

        if let Ending::Stopped(category) = &ending {
            tracing::warn!("[runner] {}: killing {}", category.message(), command.program.display());
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill downloader: {}", e);
            }
            // Grandchildren may still hold the pipes open.
            for reader in &readers {
                reader.abort();
            }
        }

        drop(log_tx);
        let _ = log_writer.await;

        let raw_log_excerpt = excerpt(&tail);
        let outcome = match ending {
            Ending::Stopped(category) => DownloadOutcome {
                exit_code: None,
                succeeded: false,
                error_category: Some(category),
                raw_log_excerpt,
                log_path: command.log_path.clone(),
                produced_files: Vec::new(),
            },
            Ending::Exited(code, true) => {
                let _ = progress.send_timeout(100.0, Duration::from_secs(1)).await;
                let produced_files = touch_produced_files(&command.output_dir, &reported).await;
                tracing::info!("[runner] finished, {} file(s)", produced_files.len());
                DownloadOutcome {
                    exit_code: code,
                    succeeded: true,
                    error_category: None,
                    raw_log_excerpt,
                    log_path: command.log_path.clone(),
                    produced_files,
                }
            }
            Ending::Exited(code, false) => {
                let joined = tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
                let category = classify_failure(&joined);
                tracing::warn!("[runner] exited with {:?}: {}", code, category.message());
                DownloadOutcome {
                    exit_code: code,
                    succeeded: false,
                    error_category: Some(category),
                    raw_log_excerpt,
                    log_path: command.log_path.clone(),
                    produced_files: Vec::new(),
                }
            }
        };

        Ok(outcome)
    }
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sets mtime to now so downloads sort as new, not by upload date.
/// Failures are logged and otherwise ignored.
async fn touch_produced_files(output_dir: &Path, reported: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = reported
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { output_dir.join(p) })
        .filter(|p| p.is_file() && is_media_file(p))
        .collect();

    if files.is_empty() {
        if let Ok(mut entries) = tokio::fs::read_dir(output_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_file() && is_media_file(&path) {
                    files.push(path);
                }
            }
        }
    }

    let now = filetime::FileTime::now();
    for path in &files {
        if let Err(e) = filetime::set_file_mtime(path, now) {
            tracing::warn!("Could not update timestamp of {}: {}", path.display(), e);
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_needs_percent_and_eta() {
        assert_eq!(
            parse_progress_line("[download]  42.7% of 10.00MiB at 1.00MiB/s ETA 00:05"),
            Some(42.7)
        );
        assert_eq!(
            parse_progress_line("[download] 100% of 10.00MiB in 00:10"),
            None
        );
        assert_eq!(parse_progress_line("[download] 5% ETA 01:00"), Some(5.0));
        assert_eq!(parse_progress_line("ETA unknown"), None);
    }

    #[test]
    fn failure_table_is_ordered() {
        assert_eq!(
            classify_failure("ERROR: [youtube] x: Sign in to confirm your age. Private video"),
            ErrorCategory::AgeRestricted
        );
        assert_eq!(
            classify_failure("ERROR: [youtube] x: Private video. Sign in if you've been granted access"),
            ErrorCategory::Private
        );
        assert_eq!(
            classify_failure("ERROR: unable to download: HTTP Error 404: Not Found"),
            ErrorCategory::NotFound
        );
        assert_eq!(
            classify_failure("ERROR: [youtube] x: Video unavailable"),
            ErrorCategory::VideoUnavailable
        );
        assert_eq!(classify_failure("segmentation fault"), ErrorCategory::UnknownFailure);
    }

    #[test]
    fn produced_file_lines() {
        assert_eq!(
            parse_produced_file("[download] Destination: /out/My Clip.f137.mp4"),
            Some(PathBuf::from("/out/My Clip.f137.mp4"))
        );
        assert_eq!(
            parse_produced_file("[Merger] Merging formats into \"/out/My Clip.mp4\""),
            Some(PathBuf::from("/out/My Clip.mp4"))
        );
        assert_eq!(
            parse_produced_file("[download] /out/My Clip.mp4 has already been downloaded"),
            Some(PathBuf::from("/out/My Clip.mp4"))
        );
        assert_eq!(parse_produced_file("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn excerpt_keeps_the_last_characters() {
        let mut tail = VecDeque::new();
        tail.push_back("é".repeat(400));
        tail.push_back("ERROR: boom".to_string());
        let ex = excerpt(&tail);
        assert_eq!(ex.chars().count(), EXCERPT_CHARS);
        assert!(ex.ends_with("\nERROR: boom"));

        let short: VecDeque<String> = VecDeque::from(vec!["only line".to_string()]);
        assert_eq!(excerpt(&short), "only line");
    }

    #[tokio::test]
    async fn touch_falls_back_to_media_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        let notes = dir.path().join("clip.description");
        std::fs::write(&clip, b"video").unwrap();
        std::fs::write(&notes, b"text").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&clip, old).unwrap();

        let touched = touch_produced_files(dir.path(), &[dir.path().join("gone.mp4")]).await;

        assert_eq!(touched, vec![clip.clone()]);
        let mtime = filetime::FileTime::from_last_modification_time(&std::fs::metadata(&clip).unwrap());
        assert!(mtime > old);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let command = DownloadCommand {
            program: dir.path().join("does-not-exist"),
            args: vec![],
            output_dir: dir.path().join("out"),
            log_path: dir.path().join("out/x.log"),
        };
        let (tx, _rx) = mpsc::channel(4);
        let err = DownloadRunner::new(dir.path())
            .run(&command, tx, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Spawn { .. }), "{err}");
    }
}
