use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "TUBEARC_DATA_DIR";

pub trait AppPaths: Send + Sync {
    fn downloads_dir(&self) -> PathBuf;
    fn data_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> PathBuf {
        self.data_dir().join("bin")
    }
    fn settings_file(&self) -> PathBuf {
        self.data_dir().join("config.json")
    }
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn downloads_dir(&self) -> PathBuf {
        dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("TubeArcDownloads")
    }

    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("tubearc"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Fixed-root layout, used for portable installs and tests.
pub struct RootedPaths {
    root: PathBuf,
}

impl RootedPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AppPaths for RootedPaths {
    fn downloads_dir(&self) -> PathBuf {
        self.root.join("TubeArcDownloads")
    }

    fn data_dir(&self) -> PathBuf {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout() {
        let paths = RootedPaths::new("/opt/tubearc");
        assert_eq!(paths.bin_dir(), PathBuf::from("/opt/tubearc/bin"));
        assert_eq!(paths.settings_file(), PathBuf::from("/opt/tubearc/config.json"));
        assert_eq!(
            paths.downloads_dir(),
            PathBuf::from("/opt/tubearc/TubeArcDownloads")
        );
    }
}
