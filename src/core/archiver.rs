use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tubearc_core::core::events::{EventEmitter, StatusTone, StatusUpdate};
use tubearc_core::models::settings::Settings;
use tubearc_core::platforms::{classify, Platform};

use crate::core::configuration::{Configuration, APP_NAME};
use crate::core::dependencies::{ProvisionSummary, ToolProvisioner};
use crate::core::error::{CoreError, InvalidRequest, Result};
use crate::core::http_client::Fetcher;
use crate::core::runner::DownloadRunner;
use crate::core::updater::{UpdateInfo, UpdateRefresh, Updater};
use crate::core::ytdlp;
use crate::models::download::{DownloadCommand, DownloadOutcome, DownloadSelection};
use crate::storage::config::ConfigStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisioningStatus {
    Pending,
    Ready(ProvisionSummary),
    Failed(String),
}

impl ProvisioningStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProvisioningStatus::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    pub provisioning: ProvisioningStatus,
    pub refresh: UpdateRefresh,
}

/// Releases the one-download gate when the run ends, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wires provisioning, update checks, command building and the runner
/// together for a front end. Owns the settings; only `&mut self` methods
/// change or persist them.
pub struct Archiver {
    config: Configuration,
    store: ConfigStore,
    settings: Settings,
    provisioner: ToolProvisioner,
    updater: Updater,
    runner: DownloadRunner,
    emitter: Arc<dyn EventEmitter>,
    provisioning: ProvisioningStatus,
    busy: Arc<AtomicBool>,
}

impl Archiver {
    pub fn new(
        config: Configuration,
        store: ConfigStore,
        fetcher: Arc<dyn Fetcher>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let settings = store.load();
        let provisioner = ToolProvisioner::new(&config, fetcher.clone(), emitter.clone());
        let updater = Updater::new(&config, fetcher);
        let runner = DownloadRunner::new(&config.bin_dir);
        Self {
            config,
            store,
            settings,
            provisioner,
            updater,
            runner,
            emitter,
            provisioning: ProvisioningStatus::Pending,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    fn status(&self, message: impl Into<String>, tone: StatusTone) {
        self.emitter.emit_status(&StatusUpdate::new(message, tone));
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provisioning(&self) -> &ProvisioningStatus {
        &self.provisioning
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn classify(&self, url: &str) -> Platform {
        classify(url)
    }

    /// Provisioning and the update refresh run side by side; their results
    /// are applied here, on the caller's task.
    pub async fn startup(&mut self, force_update_check: bool) -> StartupReport {
        self.status("Checking for updates...", StatusTone::Busy);

        let now = Utc::now();
        let (provisioned, refresh) = tokio::join!(
            self.provisioner.ensure_ready(),
            self.updater.refresh(&self.settings, now, force_update_check),
        );

        if refresh.checked_at.is_some() {
            refresh.apply(&mut self.settings);
            if let Err(e) = self.store.save(&self.settings) {
                tracing::warn!("Failed to update version cache: {}", e);
            }
        }

        self.provisioning = match provisioned {
            Ok(summary) => {
                tracing::info!(
                    "Tools ready ({} fetched, {} already present)",
                    summary.fetched.len(),
                    summary.already_present.len()
                );
                ProvisioningStatus::Ready(summary)
            }
            Err(e) => {
                self.status(format!("Error: {}", e), StatusTone::Error);
                ProvisioningStatus::Failed(e.to_string())
            }
        };

        if let Some(info) = refresh.available() {
            self.status(
                format!(
                    "{} v{} is available (current v{})",
                    APP_NAME, info.latest, info.current
                ),
                StatusTone::Warning,
            );
        } else if self.provisioning.is_ready() {
            self.status("Ready", StatusTone::Success);
        }

        StartupReport {
            provisioning: self.provisioning.clone(),
            refresh,
        }
    }

    pub async fn stage_update(&self, info: &UpdateInfo) -> Result<std::path::PathBuf> {
        self.status(format!("Downloading {} update...", APP_NAME), StatusTone::Busy);
        let staged = self.updater.stage_update(info).await;
        match &staged {
            Ok(path) => self.status(
                format!("Update saved to {}", path.display()),
                StatusTone::Success,
            ),
            Err(e) => self.status(format!("Update failed: {}", e), StatusTone::Error),
        }
        staged
    }

    pub fn set_download_dir(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.settings.set_download_path(dir);
        self.store.save(&self.settings)
    }

    /// Validates, builds and runs one download. The chosen directory becomes
    /// the new default.
    pub async fn submit(
        &mut self,
        selection: &DownloadSelection,
        progress: mpsc::Sender<f64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<DownloadOutcome> {
        if !self.provisioning.is_ready() {
            return Err(self.reject(InvalidRequest::ToolsNotReady));
        }
        if self.is_busy() {
            return Err(self.reject(InvalidRequest::Busy));
        }

        let command = ytdlp::validate_and_build(selection, &self.config.tools, &self.config.features)
            .map_err(|e| self.reject(e))?;

        if let Err(e) = self.set_download_dir(&command.output_dir) {
            tracing::warn!("Failed to save config: {}", e);
        }

        self.run_command(&command, &selection.url, progress, cancel).await
    }

    /// Runs an already built command behind the provisioning and
    /// one-at-a-time gates.
    pub async fn run_command(
        &self,
        command: &DownloadCommand,
        url: &str,
        progress: mpsc::Sender<f64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<DownloadOutcome> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return Err(self.reject(InvalidRequest::Busy));
        };
        if !self.provisioning.is_ready() {
            return Err(self.reject(InvalidRequest::ToolsNotReady));
        }

        let platform = classify(url);
        let source = if platform == Platform::Unknown {
            "URL".to_string()
        } else {
            platform.display_name().to_string()
        };
        self.status(format!("Downloading from {}...", source), StatusTone::Busy);

        let outcome = match self
            .runner
            .run(command, progress, self.config.download_timeout, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.status(format!("Error: {}", e), StatusTone::Error);
                return Err(e);
            }
        };

        let tone = if outcome.succeeded {
            StatusTone::Success
        } else {
            StatusTone::Error
        };
        self.status(outcome.summary(), tone);
        Ok(outcome)
    }

    fn reject(&self, reason: InvalidRequest) -> CoreError {
        self.status(reason.to_string(), StatusTone::Error);
        CoreError::InvalidRequest(reason)
    }
}
