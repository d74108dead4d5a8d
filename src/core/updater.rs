use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tubearc_core::models::settings::Settings;

use crate::core::configuration::{Configuration, APP_NAME};
use crate::core::error::{CoreError, Result};
use crate::core::filename::sanitize_path_component;
use crate::core::http_client::Fetcher;
use crate::core::tools::{ToolDescriptor, ToolKind};

const SELF_UPDATE_TIMEOUT: Duration = Duration::from_secs(30);
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// `true` only when `latest` is strictly greater than `current`, comparing
/// dot-separated integers. A leading `v` is ignored; anything unparsable
/// compares as not newer.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(l), Some(c)) => l > c,
        _ => false,
    }
}

fn parse_version(v: &str) -> Option<Vec<u64>> {
    v.trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

pub fn is_check_due(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: chrono::Duration,
) -> bool {
    match last {
        None => true,
        Some(last) => now.signed_duration_since(last) > interval,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub current: String,
    pub latest: String,
    pub release_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    Skipped,
    UpToDate { latest: String },
    Available(UpdateInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateResult {
    Updated,
    AlreadyCurrent,
    Unknown(String),
}

/// What a background refresh found; applied to `Settings` by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateRefresh {
    pub checked_at: Option<DateTime<Utc>>,
    pub release: Option<UpdateCheck>,
    pub downloader: Option<SelfUpdateResult>,
    pub versions: BTreeMap<String, String>,
}

impl UpdateRefresh {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(at) = self.checked_at {
            settings.record_update_check(at, self.versions.clone());
        }
    }

    pub fn available(&self) -> Option<&UpdateInfo> {
        match &self.release {
            Some(UpdateCheck::Available(info)) => Some(info),
            _ => None,
        }
    }
}

pub struct Updater {
    current_version: String,
    release_api_url: String,
    update_file_url: String,
    update_file_name: String,
    staging_dir: PathBuf,
    interval: chrono::Duration,
    tools: Vec<ToolDescriptor>,
    fetcher: Arc<dyn Fetcher>,
}

impl Updater {
    pub fn new(config: &Configuration, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            current_version: config.app_version.clone(),
            release_api_url: config.release_api_url.clone(),
            update_file_url: config.update_file_url.clone(),
            update_file_name: config.update_file_name.clone(),
            staging_dir: config.staging_dir.clone(),
            interval: config.update_check_interval,
            tools: config.tools.clone(),
            fetcher,
        }
    }

    pub async fn check_for_updates(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<UpdateCheck> {
        if !force && !is_check_due(settings.last_update_check, now, self.interval) {
            tracing::debug!("[updater] last check {:?} is recent, skipping", settings.last_update_check);
            return Ok(UpdateCheck::Skipped);
        }

        tracing::info!("Checking for updates... current version {}", self.current_version);
        let release = self
            .fetcher
            .fetch_json(&self.release_api_url)
            .await
            .map_err(|e| CoreError::Http(e.to_string()))?;

        let latest = release
            .get("tag_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::Http("release response has no tag_name".into()))?
            .trim_start_matches('v')
            .to_string();
        let release_notes = release
            .get("body")
            .and_then(|v| v.as_str())
            .unwrap_or("No release notes available.")
            .to_string();

        if is_newer(&latest, &self.current_version) {
            tracing::info!("Update available: {} -> {}", self.current_version, latest);
            Ok(UpdateCheck::Available(UpdateInfo {
                current: self.current_version.clone(),
                latest,
                release_notes,
            }))
        } else {
            tracing::info!("{} is up to date ({})", APP_NAME, self.current_version);
            Ok(UpdateCheck::UpToDate { latest })
        }
    }

    /// Downloads the new release next to the data directory for a manual
    /// swap-in. Nothing currently installed is replaced.
    pub async fn stage_update(&self, info: &UpdateInfo) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let mut name = sanitize_path_component(&self.update_file_name);
        if name.is_empty() {
            name = format!("{}-{}", APP_NAME, info.latest);
        }
        let dest = self.staging_dir.join(&name);
        let partial = self.staging_dir.join(format!(".{}.part", name));

        let written = match self.fetcher.fetch_to_file(&self.update_file_url, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(CoreError::Http(e.to_string()));
            }
        };

        let on_disk = tokio::fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 || on_disk == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(CoreError::ToolFetchFailed {
                tool: self.update_file_name.clone(),
                attempts: 1,
                last_error: "downloaded file is 0 bytes".into(),
            });
        }
        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::info!("Staged {} {} at {}", APP_NAME, info.latest, dest.display());
        Ok(dest)
    }

    pub async fn self_update_downloader(&self, tool: &ToolDescriptor) -> SelfUpdateResult {
        let Some(flag) = tool.self_update_flag.as_deref() else {
            return SelfUpdateResult::Unknown(format!("{} cannot update itself", tool.name));
        };

        let output = crate::core::process::command(&tool.local_path, tool.bin_dir())
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(SELF_UPDATE_TIMEOUT, output).await {
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let result = interpret_self_update(&stdout, &String::from_utf8_lossy(&out.stderr));
                tracing::info!("[updater] {} self-update: {:?}", tool.name, result);
                result
            }
            Ok(Err(e)) => SelfUpdateResult::Unknown(e.to_string()),
            Err(_) => SelfUpdateResult::Unknown(format!(
                "{} -U timed out after {}s",
                tool.name,
                SELF_UPDATE_TIMEOUT.as_secs()
            )),
        }
    }

    /// Release check, downloader self-update and version probes. Each part is
    /// best-effort; failures are logged and leave their field empty.
    pub async fn refresh(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
        force: bool,
    ) -> UpdateRefresh {
        if !force && !is_check_due(settings.last_update_check, now, self.interval) {
            return UpdateRefresh {
                release: Some(UpdateCheck::Skipped),
                ..UpdateRefresh::default()
            };
        }

        let mut refresh = UpdateRefresh {
            checked_at: Some(now),
            ..UpdateRefresh::default()
        };

        match self.check_for_updates(settings, now, true).await {
            Ok(check) => {
                if let UpdateCheck::UpToDate { latest }
                | UpdateCheck::Available(UpdateInfo { latest, .. }) = &check
                {
                    refresh.versions.insert(APP_NAME.to_string(), latest.clone());
                }
                refresh.release = Some(check);
            }
            Err(e) => tracing::warn!("Update check failed: {}", e),
        }

        if let Some(downloader) = self
            .tools
            .iter()
            .find(|t| t.kind == ToolKind::Downloader && t.is_present())
        {
            refresh.downloader = Some(self.self_update_downloader(downloader).await);
        }

        for tool in self.tools.iter().filter(|t| t.is_present()) {
            if let Some(version) = check_version(tool).await {
                refresh.versions.insert(tool.name.clone(), version);
            }
        }

        refresh
    }
}

fn interpret_self_update(stdout: &str, stderr: &str) -> SelfUpdateResult {
    if stdout.contains("Updated") || stdout.contains("updated") {
        SelfUpdateResult::Updated
    } else if stdout.to_lowercase().contains("up to date") {
        SelfUpdateResult::AlreadyCurrent
    } else {
        let detail = if stdout.trim().is_empty() { stderr } else { stdout };
        SelfUpdateResult::Unknown(detail.trim().to_string())
    }
}

/// `ffmpeg version 7.1-full_build ...` → `7.1-full_build`; anything else is
/// the first line as printed.
fn parse_version_output(tool: &ToolDescriptor, stdout: &str) -> Option<String> {
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    if tool.kind == ToolKind::MediaProcessor {
        return first.split_whitespace().nth(2).map(str::to_string);
    }
    Some(first.to_string())
}

pub async fn check_version(tool: &ToolDescriptor) -> Option<String> {
    let flag = tool.version_flag.as_deref()?;
    let output = crate::core::process::command(&tool.local_path, tool.bin_dir())
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    match tokio::time::timeout(VERSION_PROBE_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            parse_version_output(tool, &String::from_utf8_lossy(&out.stdout))
        }
        Ok(Ok(out)) => {
            tracing::debug!("{} {} exited with {}", tool.name, flag, out.status);
            None
        }
        Ok(Err(e)) => {
            tracing::debug!("Could not run {} {}: {}", tool.name, flag, e);
            None
        }
        Err(_) => {
            tracing::warn!("{} {} timed out", tool.name, flag);
            None
        }
    }
}
