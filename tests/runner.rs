#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tubearc_lib::core::runner::DownloadRunner;
use tubearc_lib::models::download::{DownloadCommand, ErrorCategory};

fn fake_downloader(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn command(program: PathBuf, out: &Path) -> DownloadCommand {
    DownloadCommand {
        program,
        args: vec!["https://youtu.be/abc123".into()],
        output_dir: out.to_path_buf(),
        log_path: out.join("abc123.log"),
    }
}

async fn drain(mut rx: mpsc::Receiver<f64>) -> Vec<f64> {
    let mut seen = Vec::new();
    while let Some(p) = rx.recv().await {
        seen.push(p);
    }
    seen
}

#[tokio::test]
async fn age_restricted_failure_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_downloader(
        dir.path(),
        "echo '[youtube] abc123: Downloading webpage'\n\
         echo 'ERROR: [youtube] abc123: Sign in to confirm your age. This video may be inappropriate for some users.' >&2\n\
         exit 1\n",
    );
    let out = dir.path().join("out");
    let (tx, rx) = mpsc::channel(16);

    let outcome = DownloadRunner::new(dir.path())
        .run(&command(program, &out), tx, Duration::from_secs(10), None)
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.error_category, Some(ErrorCategory::AgeRestricted));
    assert!(outcome.raw_log_excerpt.contains("Sign in to confirm your age"));
    assert!(drain(rx).await.is_empty());
}

#[tokio::test]
async fn every_line_reaches_the_log_and_progress_streams() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_downloader(
        dir.path(),
        "out=$(dirname \"$0\")/out\n\
         echo \"[download] Destination: $out/clip.mp4\"\n\
         i=1\n\
         while [ $i -le 50 ]; do echo \"[download]  $i.0% of 5.00MiB at 1.00MiB/s ETA 00:0$((i % 10))\"; i=$((i + 1)); done\n\
         echo 'WARNING: something on stderr' >&2\n\
         printf data > \"$out/clip.mp4\"\n",
    );
    let out = dir.path().join("out");
    let (tx, rx) = mpsc::channel(256);

    let outcome = DownloadRunner::new(dir.path())
        .run(&command(program, &out), tx, Duration::from_secs(10), None)
        .await
        .unwrap();

    assert!(outcome.succeeded, "{:?}", outcome);
    assert_eq!(outcome.produced_files, vec![out.join("clip.mp4")]);

    let log = std::fs::read_to_string(&outcome.log_path).unwrap();
    assert_eq!(log.lines().count(), 52);
    assert!(log.contains("WARNING: something on stderr"));

    let progress = drain(rx).await;
    assert_eq!(progress.first(), Some(&1.0));
    assert_eq!(progress.last(), Some(&100.0));
    assert_eq!(progress.len(), 51);
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_downloader(dir.path(), "echo started\nexec sleep 30\n");
    let out = dir.path().join("out");
    let (tx, _rx) = mpsc::channel(4);

    let started = Instant::now();
    let outcome = DownloadRunner::new(dir.path())
        .run(&command(program, &out), tx, Duration::from_millis(500), None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!outcome.succeeded);
    assert_eq!(outcome.exit_code, None);
    assert_eq!(outcome.error_category, Some(ErrorCategory::TimedOut));
    assert!(std::fs::read_to_string(&outcome.log_path)
        .unwrap()
        .contains("started"));
}

#[tokio::test]
async fn unknown_failure_keeps_a_short_excerpt() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_downloader(
        dir.path(),
        "i=0\nwhile [ $i -lt 100 ]; do echo \"noise line $i\"; i=$((i + 1)); done\necho 'ERROR: unexpected'\nexit 2\n",
    );
    let out = dir.path().join("out");
    let (tx, _rx) = mpsc::channel(4);

    let outcome = DownloadRunner::new(dir.path())
        .run(&command(program, &out), tx, Duration::from_secs(10), None)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, Some(2));
    assert_eq!(outcome.error_category, Some(ErrorCategory::UnknownFailure));
    assert_eq!(outcome.raw_log_excerpt.chars().count(), 300);
    assert!(outcome.raw_log_excerpt.ends_with("ERROR: unexpected"));
}
