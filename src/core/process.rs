use std::ffi::OsStr;
use std::path::Path;

fn enhanced_path(bin_dir: &Path) -> String {
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    if current.is_empty() {
        return bin_dir.display().to_string();
    }
    format!("{}{}{}", bin_dir.display(), sep, current)
}

/// Builds a child command that sees the managed bin directory first on PATH
/// and never opens a console window on Windows.
pub fn command<S: AsRef<OsStr>>(program: S, bin_dir: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    cmd.env("PATH", enhanced_path(bin_dir));
    // yt-dlp is a frozen Python app; force UTF-8 so titles survive the pipe.
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd.kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_dir_comes_first() {
        let path = enhanced_path(Path::new("/opt/tubearc/bin"));
        assert!(path.starts_with("/opt/tubearc/bin"));
    }
}
