//! Run sessions: one artifact directory per scenario run.
//!
//! Sessions live under the configured base directory and are removed on drop
//! unless kept. A session holds the run report and a small metadata file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config;
use crate::runner::RunSummary;

const METADATA_FILE: &str = ".session.json";
const REPORT_FILE: &str = "report.json";

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
    /// Keep the directory after the session is dropped
    pub keep: bool,
}

impl Session {
    /// Session named after the scenario, under the configured base directory
    pub fn for_scenario(scenario: &str) -> Self {
        Self::in_base(config::session_base_dir(), scenario)
    }

    pub fn in_base(base: impl AsRef<Path>, scenario: &str) -> Self {
        let id = format!(
            "{}_{}_{}",
            sanitize_name(scenario),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            std::process::id()
        );
        Self {
            dir: base.as_ref().join(&id),
            id,
            keep: false,
        }
    }

    /// Use a caller-chosen directory, kept by default
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string());
        Self { id, dir, keep: true }
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Create the directory and write session metadata
    pub fn init(&self, scenario: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        let metadata = serde_json::json!({
            "id": self.id,
            "scenario": scenario,
            "host": host,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        fs::write(self.dir.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    pub fn write_report(&self, summary: &RunSummary) -> io::Result<PathBuf> {
        let path = self.report_path();
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Remove session directories under `base` older than `max_age`
pub fn cleanup_old_sessions(base: &Path, max_age: std::time::Duration) -> io::Result<usize> {
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);
        if expired && fs::remove_dir_all(&path).is_ok() {
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ExecutionMode;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_session_written_and_removed() {
        let base = TempDir::new().unwrap();
        let dir;
        {
            let session = Session::in_base(base.path(), "check out/cart");
            assert!(session.id.starts_with("check_out_cart_"));
            session.init("check out/cart").unwrap();
            let summary = RunSummary::from_results("check out/cart", ExecutionMode::Plain, 0, vec![]);
            let report = session.write_report(&summary).unwrap();
            assert!(report.exists());
            assert!(session.dir.join(METADATA_FILE).exists());
            dir = session.dir.clone();
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_kept_session_survives_drop() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("out");
        {
            let session = Session::in_dir(&dir);
            session.init("demo").unwrap();
        }
        assert!(dir.join(METADATA_FILE).exists());
    }

    #[test]
    fn test_cleanup_old_sessions() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("old")).unwrap();
        assert_eq!(cleanup_old_sessions(base.path(), Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(cleanup_old_sessions(&base.path().join("absent"), Duration::ZERO).unwrap(), 0);
    }
}
