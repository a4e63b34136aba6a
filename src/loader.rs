//! Scenario file loading.
//!
//! A scenario is a text file with one instruction per line. A line holding
//! only `##other.txt` is replaced by the steps of that file, resolved against
//! the directory of the including file. Each file is expanded at most once per
//! load, which also breaks include cycles.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::instruction::{Instruction, parse_line};

static INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^##(\S+\.txt)$").unwrap());

/// Result type for scenario loading
pub type LoaderResult<T> = Result<T, LoaderError>;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cannot read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load a scenario file with its includes expanded in place
pub fn load_scenario(path: impl AsRef<Path>) -> LoaderResult<Vec<Instruction>> {
    let path = path.as_ref();
    let canonical = fs::canonicalize(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut visited = HashSet::new();
    let mut steps = Vec::new();
    expand(&canonical, &mut visited, &mut steps)?;
    debug!(path = %path.display(), steps = steps.len(), "scenario loaded");
    Ok(steps)
}

/// Parse scenario text that has no include context
pub fn parse_scenario_text(text: &str) -> Vec<Instruction> {
    text.lines().filter_map(parse_line).collect()
}

/// Scenario name used as the plan key
pub fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "scenario".to_string())
}

fn expand(path: &Path, visited: &mut HashSet<PathBuf>, steps: &mut Vec<Instruction>) -> LoaderResult<()> {
    visited.insert(path.to_path_buf());

    let text = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for line in text.lines() {
        let line = line.trim();
        let Some(caps) = INCLUDE.captures(line) else {
            steps.extend(parse_line(line));
            continue;
        };

        let target = base.join(&caps[1]);
        let included = match fs::canonicalize(&target) {
            Ok(included) => included,
            Err(e) => {
                warn!(include = %target.display(), from = %path.display(), error = %e, "included scenario not found, skipping");
                continue;
            }
        };
        if visited.contains(&included) {
            warn!(include = %included.display(), from = %path.display(), "scenario already included, skipping to break the cycle");
            continue;
        }

        if let Err(e) = expand(&included, visited, steps) {
            warn!(include = %included.display(), error = %e, "included scenario unreadable, skipping");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BrowserId, Expectation};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_include_expands_in_place() {
        let dir = TempDir::new().unwrap();
        write(&dir, "login.txt", "click Sign in >>> Welcome\n");
        let main = write(&dir, "main.txt", "go to https://app.test\n##login.txt\n\n*2 open inbox\n");

        let steps = load_scenario(&main).unwrap();
        let keys: Vec<_> = steps.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["go to https://app.test", "click Sign in", "*2 open inbox"]);
        assert_eq!(steps[2].browser, BrowserId::Secondary);
        assert_eq!(steps[1].expectation, Expectation::Verify("Welcome".to_string()));
    }

    #[test]
    fn test_self_include_terminates() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "loop.txt", "first step\n##loop.txt\nsecond step\n");
        let steps = load_scenario(&main).unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_missing_include_is_skipped() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.txt", "##nowhere.txt\nlast step\n");
        let steps = load_scenario(&main).unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_missing_top_level_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(load_scenario(dir.path().join("absent.txt")).is_err());
    }

    #[test]
    fn test_include_requires_whole_line() {
        let steps = parse_scenario_text("see ##other.txt for details");
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_scenario_name() {
        assert_eq!(scenario_name(Path::new("/x/checkout.txt")), "checkout");
    }
}
