use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instruction::{BrowserId, SpecialCommand};
use crate::resolve::ElementTarget;
use crate::verify::VerificationSpec;

/// A recorded, replayable browser primitive.
///
/// Clicks and fills keep an anchor (role + visible text) rather than the
/// snapshot reference they were executed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlanAction {
    Click {
        element: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, rename = "textContent", skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
    },
    Fill {
        element: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, rename = "textContent", skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
        /// Literal text to type
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// Memory key whose value is typed instead of a literal
        #[serde(default, rename = "memoryKey", skip_serializing_if = "Option::is_none")]
        memory_key: Option<String>,
    },
    Navigate {
        url: String,
    },
    /// Store a value. A literal is stored as recorded; a page-derived value
    /// is re-extracted from the page on every run.
    StoreMemory {
        key: String,
        /// What to extract, in words
        hint: String,
        /// Capture regex learned from the page the value was first seen on
        #[serde(default, rename = "extractionRegex", skip_serializing_if = "Option::is_none")]
        extraction_regex: Option<String>,
        /// Value that did not come from the page
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    ReadMemory {
        key: String,
    },
}

impl PlanAction {
    /// Element anchor for clicks and fills
    pub fn target(&self) -> Option<ElementTarget<'_>> {
        match self {
            PlanAction::Click {
                element,
                role,
                text_content,
            }
            | PlanAction::Fill {
                element,
                role,
                text_content,
                ..
            } => Some(ElementTarget {
                description: element,
                role: role.as_deref(),
                text: text_content.as_deref(),
            }),
            _ => None,
        }
    }

    /// Short label used in action trails
    pub fn label(&self) -> String {
        match self {
            PlanAction::Click { element, .. } => format!("click {}", element),
            PlanAction::Fill { element, .. } => format!("fill {}", element),
            PlanAction::Navigate { url } => format!("navigate {}", url),
            PlanAction::StoreMemory { key, .. } => format!("store {}", key),
            PlanAction::ReadMemory { key } => format!("read {}", key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Action,
    SpecialCommand,
}

/// The learned execution of one instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Exact instruction key, routing prefix included
    pub original_instruction: String,
    pub kind: StepKind,
    #[serde(default)]
    pub actions: Vec<PlanAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_command: Option<SpecialCommand>,
    /// `None` means the step auto-passes
    #[serde(default)]
    pub verification: Option<VerificationSpec>,
    pub delay_ms: u64,
    pub browser: BrowserId,
    /// Set by the first successful learning pass
    #[serde(default)]
    pub last_learned: Option<DateTime<Utc>>,
    /// Number of replay failures that forced a re-learn
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl PlanStep {
    /// Whether the step has been learned successfully and can be replayed
    pub fn is_replayable(&self) -> bool {
        self.last_learned.is_some()
    }
}

/// All learned steps of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub scenario: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn new(scenario: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            scenario: scenario.into(),
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        }
    }

    /// Look up a step by exact instruction key
    pub fn find_step(&self, key: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.original_instruction == key)
    }

    /// Replace the step with the same key, or append it
    pub fn upsert(&mut self, step: PlanStep) {
        match self
            .steps
            .iter_mut()
            .find(|existing| existing.original_instruction == step.original_instruction)
        {
            Some(existing) => *existing = step,
            None => self.steps.push(step),
        }
        self.updated_at = Utc::now();
    }
}
