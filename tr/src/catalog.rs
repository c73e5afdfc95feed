//! Task catalog
//!
//! The fixed enumeration of task kinds and the control tokens that resolve
//! them. Built once from configuration and shared read-only by every session.

use std::collections::HashSet;

use eyre::{Result, eyre};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One task kind as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskKindConfig {
    /// Kind name, e.g. `FIREWALL_CONFIG`
    pub kind: String,

    /// Control token; defaults to `<KIND>_CONTROL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,

    /// Trivially resolved busywork
    #[serde(default)]
    pub filler: bool,

    /// Needs a helper holding the control token
    #[serde(default)]
    pub multiplayer: bool,
}

impl TaskKindConfig {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            control: None,
            filler: false,
            multiplayer: false,
        }
    }

    fn filler(mut self) -> Self {
        self.filler = true;
        self
    }

    fn multiplayer(mut self) -> Self {
        self.multiplayer = true;
        self
    }
}

/// Built-in task kinds used when the config names none
pub fn default_task_kinds() -> Vec<TaskKindConfig> {
    vec![
        TaskKindConfig::new("FIREWALL_CONFIG"),
        TaskKindConfig::new("PASSWORD_CRACK"),
        TaskKindConfig::new("PACKET_SNIFF"),
        TaskKindConfig::new("DECRYPT_FILE"),
        TaskKindConfig::new("PORT_SCAN"),
        TaskKindConfig::new("PURGE_LOGS"),
        TaskKindConfig::new("PATCH_KERNEL").multiplayer(),
        TaskKindConfig::new("TRACE_ROUTE").multiplayer(),
        TaskKindConfig::new("REBOOT_SERVER").filler(),
        TaskKindConfig::new("CLEAR_CACHE").filler(),
    ]
}

/// A resolved task kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskKind {
    pub name: String,
    pub control: String,
    pub filler: bool,
    pub multiplayer: bool,
}

/// Read-only catalog of task kinds
#[derive(Debug, Clone)]
pub struct Catalog {
    kinds: Vec<TaskKind>,
}

impl Catalog {
    /// Resolve config entries into a catalog
    ///
    /// Fails on an empty list, blank names, or a kind name or control token
    /// used twice: each token must map to exactly one kind.
    pub fn new(entries: &[TaskKindConfig]) -> Result<Self> {
        debug!(count = entries.len(), "Catalog::new: called");
        if entries.is_empty() {
            return Err(eyre!("Catalog has no task kinds"));
        }

        let mut names = HashSet::new();
        let mut controls = HashSet::new();
        let mut kinds = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = entry.kind.trim();
            if name.is_empty() {
                return Err(eyre!("Task kind with an empty name"));
            }
            let control = match &entry.control {
                Some(control) if !control.trim().is_empty() => control.trim().to_string(),
                _ => format!("{}_CONTROL", name),
            };

            if !names.insert(name.to_string()) {
                return Err(eyre!("Duplicate task kind: {}", name));
            }
            if !controls.insert(control.clone()) {
                return Err(eyre!("Duplicate control token: {}", control));
            }

            kinds.push(TaskKind {
                name: name.to_string(),
                control,
                filler: entry.filler,
                multiplayer: entry.multiplayer,
            });
        }

        Ok(Self { kinds })
    }

    /// Catalog built from the default task kinds
    pub fn builtin() -> Self {
        let kinds = default_task_kinds()
            .into_iter()
            .map(|entry| TaskKind {
                control: format!("{}_CONTROL", entry.kind),
                name: entry.kind,
                filler: entry.filler,
                multiplayer: entry.multiplayer,
            })
            .collect();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[TaskKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The control-token universe, in catalog order
    pub fn controls(&self) -> Vec<String> {
        self.kinds.iter().map(|k| k.control.clone()).collect()
    }

    /// Look up a kind by name
    pub fn get(&self, name: &str) -> Option<&TaskKind> {
        self.kinds.iter().find(|k| k.name == name)
    }

    /// Look up the kind a control token resolves
    pub fn by_control(&self, control: &str) -> Option<&TaskKind> {
        self.kinds.iter().find(|k| k.control == control)
    }

    /// Pick a kind uniformly at random
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &TaskKind {
        &self.kinds[rng.random_range(0..self.kinds.len())]
    }
}
