//! Oracle-proposed actions and their conversion into plan actions.

use serde::Deserialize;
use serde_json::Value;

use crate::memory::value_text;
use crate::plan::PlanAction;
use crate::resolve::capture_anchor;
use crate::runner::extract::learn_extraction_regex;

/// Top-level shape of an action proposal
#[derive(Debug, Deserialize)]
pub struct ActionList {
    #[serde(default)]
    pub actions: Vec<Value>,
}

impl ActionList {
    /// Decode every entry, failing on the first one that is not understood
    pub fn into_actions(self) -> Result<Vec<ProposedAction>, String> {
        self.actions
            .into_iter()
            .map(|raw| {
                serde_json::from_value::<ProposedAction>(raw.clone())
                    .map_err(|e| format!("unsupported action {}: {}", raw, e))
            })
            .collect()
    }
}

/// One action as proposed by the oracle, still carrying a live snapshot ref
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProposedAction {
    Click {
        #[serde(default)]
        element: String,
        #[serde(rename = "ref")]
        reference: String,
    },
    #[serde(alias = "type", alias = "input")]
    Fill {
        #[serde(default)]
        element: String,
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default, rename = "memoryKey")]
        memory_key: Option<String>,
    },
    #[serde(alias = "goto")]
    Navigate { url: String },
    #[serde(alias = "store-memory", alias = "store_memory")]
    Store {
        #[serde(alias = "memoryKey")]
        key: String,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        element: Option<String>,
    },
    #[serde(alias = "read-memory", alias = "read_memory")]
    Read {
        #[serde(alias = "memoryKey")]
        key: String,
    },
}

impl ProposedAction {
    pub fn label(&self) -> String {
        match self {
            ProposedAction::Click { element, .. } => format!("click {}", element),
            ProposedAction::Fill { element, .. } => format!("fill {}", element),
            ProposedAction::Navigate { url } => format!("navigate {}", url),
            ProposedAction::Store { key, .. } => format!("store {}", key),
            ProposedAction::Read { key } => format!("read {}", key),
        }
    }

    /// Whether executing the action needs the current page snapshot
    pub fn needs_snapshot(&self) -> bool {
        matches!(
            self,
            ProposedAction::Click { .. } | ProposedAction::Fill { .. } | ProposedAction::Store { .. }
        )
    }

    /// Whether the action may change the page
    pub fn touches_page(&self) -> bool {
        matches!(
            self,
            ProposedAction::Click { .. } | ProposedAction::Fill { .. } | ProposedAction::Navigate { .. }
        )
    }
}

/// Convert an executed action into its replayable form.
///
/// `snapshot` is the page as it was right before the action ran. Refs are
/// replaced by anchors. A stored value found on that page becomes an
/// extraction hint; any other value is kept as a literal.
pub fn enrich(action: &ProposedAction, snapshot: &str) -> PlanAction {
    match action {
        ProposedAction::Click { element, reference } => {
            let anchor = capture_anchor(snapshot, reference).unwrap_or_default();
            PlanAction::Click {
                element: element.clone(),
                role: anchor.role,
                text_content: anchor.text,
            }
        }
        ProposedAction::Fill {
            element,
            reference,
            value,
            memory_key,
        } => {
            let anchor = capture_anchor(snapshot, reference).unwrap_or_default();
            PlanAction::Fill {
                element: element.clone(),
                role: anchor.role,
                text_content: anchor.text,
                value: match memory_key {
                    Some(_) => None,
                    None => value.as_ref().map(value_text),
                },
                memory_key: memory_key.clone(),
            }
        }
        ProposedAction::Navigate { url } => PlanAction::Navigate { url: url.clone() },
        ProposedAction::Store {
            key,
            value,
            element,
        } => {
            let text = value_text(value);
            let from_page = !text.trim().is_empty() && snapshot.contains(text.trim());
            PlanAction::StoreMemory {
                key: key.clone(),
                hint: element.clone().unwrap_or_else(|| key.clone()),
                extraction_regex: if from_page {
                    learn_extraction_regex(snapshot, &text)
                } else {
                    None
                },
                value: (!from_page).then(|| value.clone()),
            }
        }
        ProposedAction::Read { key } => PlanAction::ReadMemory { key: key.clone() },
    }
}
