use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::types::ExecutionPlan;
use super::{PlanError, PlanResult};

/// Suffix of every plan document
pub const PLAN_EXTENSION: &str = "plan.json";

/// One JSON document per scenario under a base directory
#[derive(Debug, Clone)]
pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for a scenario; a pure function of its identifier
    pub fn path_for(&self, scenario: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_name(scenario), PLAN_EXTENSION))
    }

    /// Load the plan of a scenario, `None` when nothing has been learned yet
    pub fn load(&self, scenario: &str) -> PlanResult<Option<ExecutionPlan>> {
        let path = self.path_for(scenario);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PlanError::Io { path, source }),
        };
        let plan = serde_json::from_str(&raw).map_err(|source| PlanError::Corrupt {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "plan loaded");
        Ok(Some(plan))
    }

    pub fn save(&self, plan: &ExecutionPlan) -> PlanResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| PlanError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(&plan.scenario);
        let body = serde_json::to_string_pretty(plan)?;
        fs::write(&path, body).map_err(|source| PlanError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), steps = plan.steps.len(), "plan saved");
        Ok(())
    }

    /// Remove a scenario's plan. Returns whether a document existed.
    pub fn delete(&self, scenario: &str) -> PlanResult<bool> {
        let path = self.path_for(scenario);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PlanError::Io { path, source }),
        }
    }

    /// Scenario identifiers of every stored plan
    pub fn list(&self) -> PlanResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| PlanError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut scenarios = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_plan_file(&path) {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_str::<ExecutionPlan>(&raw).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(plan) => scenarios.push(plan.scenario),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable plan"),
            }
        }
        scenarios.sort();
        Ok(scenarios)
    }
}

fn is_plan_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(&format!(".{}", PLAN_EXTENSION)))
        .unwrap_or(false)
}

/// Escape a scenario identifier for use in filenames.
///
/// Alphanumerics, `-` and `.` are kept; every other byte becomes `_XX`, so
/// distinct identifiers never share a document.
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("_{:02X}", byte)),
        }
    }
    out
}
