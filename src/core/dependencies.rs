use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tubearc_core::core::events::{
    EventEmitter, StatusTone, StatusUpdate, ToolState, ToolStateChanged,
};

use crate::core::configuration::Configuration;
use crate::core::error::{CoreError, Result};
use crate::core::http_client::Fetcher;
use crate::core::tools::{Packaging, ToolDescriptor, ToolKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub fetched: Vec<String>,
    pub already_present: Vec<String>,
}

pub struct ToolProvisioner {
    tools: Vec<ToolDescriptor>,
    bin_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    emitter: Arc<dyn EventEmitter>,
    states: Mutex<HashMap<ToolKind, ToolState>>,
}

impl ToolProvisioner {
    pub fn new(
        config: &Configuration,
        fetcher: Arc<dyn Fetcher>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            tools: config.tools.clone(),
            bin_dir: config.bin_dir.clone(),
            fetcher,
            emitter,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state_of(&self, kind: ToolKind) -> ToolState {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.get(&kind).cloned())
            .unwrap_or(ToolState::Missing)
    }

    pub fn all_ready(&self) -> bool {
        self.tools.iter().all(|t| self.state_of(t.kind).is_ready())
    }

    fn set_state(&self, tool: &ToolDescriptor, state: ToolState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(tool.kind, state.clone());
        }
        self.emitter.emit_tool_state(&ToolStateChanged {
            tool: tool.name.clone(),
            state,
        });
    }

    fn status(&self, message: impl Into<String>, tone: StatusTone) {
        self.emitter.emit_status(&StatusUpdate::new(message, tone));
    }

    /// Makes sure every configured tool exists locally. Tools already on disk
    /// are marked ready without touching the network.
    pub async fn ensure_ready(&self) -> Result<ProvisionSummary> {
        let _timer_start = std::time::Instant::now();
        tokio::fs::create_dir_all(&self.bin_dir).await?;

        let mut summary = ProvisionSummary::default();
        for tool in provisioning_order(&self.tools) {
            if tool.is_present() {
                self.set_state(tool, ToolState::Ready);
                summary.already_present.push(tool.name.clone());
                continue;
            }

            self.set_state(tool, ToolState::Missing);
            if let Err(e) = self.provision(tool).await {
                tracing::error!("Provisioning {} failed: {}", tool.name, e);
                self.status("Setup failed", StatusTone::Error);
                return Err(e);
            }
            summary.fetched.push(tool.name.clone());
        }

        tracing::debug!("[perf] ensure_ready took {:?}", _timer_start.elapsed());
        Ok(summary)
    }

    async fn provision(&self, tool: &ToolDescriptor) -> Result<()> {
        let archive_utility = if tool.packaging.needs_archive_utility() {
            match self.tools.iter().find(|t| t.kind == ToolKind::ArchiveUtility) {
                Some(util) if util.is_present() => Some(util.local_path.clone()),
                _ => {
                    self.set_state(
                        tool,
                        ToolState::ExtractFailed {
                            reason: "archive utility missing".into(),
                        },
                    );
                    return Err(CoreError::ArchiveUtilityMissing {
                        tool: tool.name.clone(),
                    });
                }
            }
        } else {
            None
        };

        let artifact = self.fetch_from_mirrors(tool).await?;

        match &tool.packaging {
            Packaging::Binary => {
                tokio::fs::rename(&artifact, &tool.local_path).await?;
            }
            packaging => {
                self.set_state(tool, ToolState::Extracting);
                self.status(format!("Extracting {}...", tool.name), StatusTone::Busy);
                let extracted = match packaging {
                    Packaging::SevenZip { .. } => {
                        let util = archive_utility.as_deref().unwrap_or(Path::new(""));
                        extract_with_utility(util, &artifact, &self.bin_dir, tool).await
                    }
                    Packaging::Zip { .. } => extract_zip(&artifact, &self.bin_dir, tool).await,
                    Packaging::TarXz { .. } => extract_tar_xz(&artifact, &self.bin_dir, tool).await,
                    Packaging::Binary => Ok(()),
                };

                let _ = tokio::fs::remove_file(&artifact).await;
                remove_leftover_dirs(&self.bin_dir, &tool.name).await;

                if let Err(e) = extracted.and_then(|_| {
                    if tool.is_present() {
                        Ok(())
                    } else {
                        Err(anyhow!(
                            "could not find {} in extracted archive",
                            tool.local_path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .unwrap_or(&tool.name)
                        ))
                    }
                }) {
                    self.set_state(
                        tool,
                        ToolState::ExtractFailed {
                            reason: e.to_string(),
                        },
                    );
                    return Err(CoreError::ArchiveExtractFailed {
                        tool: tool.name.clone(),
                        reason: e.to_string(),
                    });
                }
                self.set_state(tool, ToolState::Extracted);
            }
        }

        make_runnable(tool).await;
        tracing::info!("{} installed to {}", tool.name, tool.local_path.display());
        self.set_state(tool, ToolState::Ready);
        Ok(())
    }

    async fn fetch_from_mirrors(&self, tool: &ToolDescriptor) -> Result<PathBuf> {
        let dest = self.bin_dir.join(format!(
            ".{}.{}",
            tool.name,
            tool.packaging.download_suffix()
        ));

        // An archive left behind by an interrupted extraction is reused.
        if tool.packaging != Packaging::Binary && file_len(&dest).await > 0 {
            tracing::info!("Reusing downloaded archive {}", dest.display());
            self.set_state(tool, ToolState::Downloaded);
            return Ok(dest);
        }

        let total = tool.remote_urls.len();
        let mut last_error = String::from("no download sources configured");

        for (i, url) in tool.remote_urls.iter().enumerate() {
            let mirror = i + 1;
            self.set_state(tool, ToolState::Downloading { mirror, of: total });
            let message = if total > 1 {
                format!("Downloading {} ({}/{})...", tool.name, mirror, total)
            } else {
                format!("Downloading {}...", tool.name)
            };
            self.status(message, StatusTone::Busy);

            let reason = match self.fetcher.fetch_to_file(url, &dest).await {
                Ok(_) if file_len(&dest).await > 0 => {
                    self.set_state(tool, ToolState::Downloaded);
                    return Ok(dest);
                }
                Ok(_) => "downloaded file is 0 bytes".to_string(),
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                "[provision] {} mirror {}/{} failed: {}",
                tool.name,
                mirror,
                total,
                reason
            );
            let _ = tokio::fs::remove_file(&dest).await;
            self.set_state(
                tool,
                ToolState::DownloadFailed {
                    mirror,
                    reason: reason.clone(),
                },
            );
            last_error = reason;
        }

        Err(CoreError::ToolFetchFailed {
            tool: tool.name.clone(),
            attempts: total,
            last_error,
        })
    }
}

/// Archive utilities first so archive-packaged tools can be unpacked.
fn provisioning_order(tools: &[ToolDescriptor]) -> Vec<&ToolDescriptor> {
    let mut ordered: Vec<&ToolDescriptor> = tools.iter().collect();
    ordered.sort_by_key(|t| t.kind != ToolKind::ArchiveUtility);
    ordered
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn make_runnable(tool: &ToolDescriptor) {
    let companions: Vec<PathBuf> = tool
        .packaging
        .members()
        .iter()
        .map(|m| tool.bin_dir().join(m))
        .filter(|p| p.exists())
        .collect();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        let _ = tokio::fs::set_permissions(&tool.local_path, perms.clone()).await;
        for path in &companions {
            let _ = tokio::fs::set_permissions(path, perms.clone()).await;
        }
    }

    #[cfg(target_os = "macos")]
    {
        for path in std::iter::once(&tool.local_path).chain(companions.iter()) {
            let _ = tokio::process::Command::new("xattr")
                .args(["-d", "com.apple.quarantine"])
                .arg(path)
                .output()
                .await;
        }
    }

    #[cfg(not(unix))]
    let _ = companions;
}

async fn extract_with_utility(
    utility: &Path,
    archive_path: &Path,
    bin_dir: &Path,
    tool: &ToolDescriptor,
) -> anyhow::Result<()> {
    tracing::info!("Running {} on {}", utility.display(), archive_path.display());
    let output = crate::core::process::command(utility, bin_dir)
        .arg("x")
        .arg(archive_path)
        .arg(format!("-o{}", bin_dir.display()))
        .arg("-y")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow!("Failed to run archive utility: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "archive utility exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    let bin_dir = bin_dir.to_path_buf();
    let members = tool.packaging.members().to_vec();
    tokio::task::spawn_blocking(move || {
        for member in &members {
            let dest = bin_dir.join(member);
            if let Some(found) = find_file_named(&bin_dir, member, &dest) {
                tracing::debug!("Moving {} to {}", found.display(), dest.display());
                std::fs::rename(&found, &dest)?;
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Spawn blocking failed: {}", e))??;

    Ok(())
}

/// Depth-first search below `root`, skipping `exclude` itself.
fn find_file_named(root: &Path, name: &str, exclude: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else if path != exclude && path.file_name().and_then(|n| n.to_str()) == Some(name) {
            return Some(path);
        }
    }
    dirs.into_iter()
        .find_map(|dir| find_file_named(&dir, name, exclude))
}

async fn extract_zip(
    archive_path: &Path,
    bin_dir: &Path,
    tool: &ToolDescriptor,
) -> anyhow::Result<()> {
    let archive_path = archive_path.to_path_buf();
    let bin_dir = bin_dir.to_path_buf();
    let members = tool.packaging.members().to_vec();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path)
            .map_err(|e| anyhow!("Failed to open archive: {}", e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| anyhow!("Failed to open zip: {}", e))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| anyhow!("Failed to read zip entry: {}", e))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let file_name = name.rsplit('/').next().unwrap_or("");
            if let Some(target) = members.iter().find(|m| m.as_str() == file_name) {
                let dest = bin_dir.join(target);
                let mut out = std::fs::File::create(&dest)?;
                std::io::copy(&mut entry, &mut out)?;
            }
        }

        Ok::<(), anyhow::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Spawn blocking failed: {}", e))??;

    Ok(())
}

async fn extract_tar_xz(
    archive_path: &Path,
    bin_dir: &Path,
    tool: &ToolDescriptor,
) -> anyhow::Result<()> {
    let archive_path = archive_path.to_path_buf();
    let bin_dir = bin_dir.to_path_buf();
    let members = tool.packaging.members().to_vec();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path)
            .map_err(|e| anyhow!("Failed to open archive: {}", e))?;
        let decompressor = xz2::read::XzDecoder::new(file);
        let mut archive = tar::Archive::new(decompressor);

        for entry_result in archive
            .entries()
            .map_err(|e| anyhow!("Failed to read tar entries: {}", e))?
        {
            let mut entry =
                entry_result.map_err(|e| anyhow!("Failed to read tar entry: {}", e))?;
            let path = entry
                .path()
                .map_err(|e| anyhow!("Failed to read entry path: {}", e))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();
            if let Some(target) = members.iter().find(|m| **m == file_name) {
                let dest = bin_dir.join(target);
                let mut out = std::fs::File::create(&dest)?;
                std::io::copy(&mut entry, &mut out)?;
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Spawn blocking failed: {}", e))??;
    Ok(())
}

async fn remove_leftover_dirs(bin_dir: &Path, tool_name: &str) {
    let Ok(mut entries) = tokio::fs::read_dir(bin_dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_leftover = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(tool_name));
        if is_leftover {
            tracing::debug!("Removing extracted folder {}", path.display());
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                tracing::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
