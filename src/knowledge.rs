// CYBERTWIN KNOWLEDGE CACHE
// BEST KNOWN CONFIGURATION PER WORKLOAD LABEL, LEARNED ACROSS EPISODES AND RUNS.
//
// ON DISK: ONE JSON OBJECT { "<label>": { "configuration": [..], "cost": f }, .. }
// WRITTEN TO A SIBLING TEMP FILE AND RENAMED OVER THE TARGET, SO A READER NEVER SEES
// A HALF-WRITTEN DOCUMENT. AN ENTRY IS ONLY REPLACED BY A STRICTLY CHEAPER ONE.
//
// A MISSING OR CORRUPT FILE IS NOT AN ERROR: THE CACHE STARTS EMPTY AND SAYS SO.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::WorkloadLabel;
use crate::model::Configuration;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("knowledge json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub configuration: Configuration,
    pub cost: f64,
}

pub struct KnowledgeCache {
    path: PathBuf,
    entries: BTreeMap<WorkloadLabel, KnowledgeEntry>,
}

impl KnowledgeCache {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let mut cache = Self { path: path.as_ref().to_path_buf(), entries: BTreeMap::new() };
        cache.merge_from_disk();
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, label: WorkloadLabel) -> Option<&KnowledgeEntry> {
        self.entries.get(&label)
    }

    pub fn entries(&self) -> impl Iterator<Item = (WorkloadLabel, &KnowledgeEntry)> {
        self.entries.iter().map(|(l, e)| (*l, e))
    }

    // CONFIGURATIONS LEARNED FOR EVERY LABEL EXCEPT `label`, CHEAPEST FIRST
    pub fn others(&self, label: WorkloadLabel) -> Vec<Configuration> {
        let mut others: Vec<&KnowledgeEntry> = self.entries.iter()
            .filter(|(l, _)| **l != label)
            .map(|(_, e)| e)
            .collect();
        others.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        others.into_iter().map(|e| e.configuration.clone()).collect()
    }

    // MERGE FILE ENTRIES INTO MEMORY, LOWER COST WINS PER LABEL. RETURNS ENTRIES TAKEN.
    pub fn merge_from_disk(&mut self) -> usize {
        let loaded = match load(&self.path) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                info!("KNOWLEDGE {} NOT FOUND, STARTING EMPTY", self.path.display());
                return 0;
            }
            Err(e) => {
                warn!("KNOWLEDGE {} UNREADABLE ({}), STARTING EMPTY", self.path.display(), e);
                return 0;
            }
        };

        let mut taken = 0;
        for (label, entry) in loaded {
            if self.insert_if_better(label, entry) {
                taken += 1;
            }
        }
        info!("KNOWLEDGE {} LOADED: {} ENTRIES", self.path.display(), self.entries.len());
        taken
    }

    fn insert_if_better(&mut self, label: WorkloadLabel, entry: KnowledgeEntry) -> bool {
        if !entry.cost.is_finite() {
            return false;
        }
        match self.entries.get(&label) {
            Some(old) if entry.cost >= old.cost => false,
            _ => {
                self.entries.insert(label, entry);
                true
            }
        }
    }

    // Ok(true) WHEN THE ENTRY WAS STRICTLY IMPROVED AND PERSISTED.
    // ON A PERSIST FAILURE THE IN-MEMORY UPDATE STANDS AND THE ERROR IS RETURNED.
    pub fn record(
        &mut self,
        label: WorkloadLabel,
        configuration: Configuration,
        cost: f64,
    ) -> Result<bool, KnowledgeError> {
        if !self.insert_if_better(label, KnowledgeEntry { configuration, cost }) {
            debug!("KNOWLEDGE {} KEPT (cost {:.1} not better)", label, cost);
            return Ok(false);
        }
        self.persist()?;
        info!("KNOWLEDGE {} <- cost {:.1}", label, cost);
        Ok(true)
    }

    pub fn persist(&self) -> Result<(), KnowledgeError> {
        let doc: BTreeMap<&str, &KnowledgeEntry> = self.entries.iter()
            .map(|(l, e)| (l.as_str(), e))
            .collect();
        let json = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// Ok(None): NO FILE. UNKNOWN LABELS AND MALFORMED ENTRIES ARE SKIPPED INDIVIDUALLY.
fn load(path: &Path) -> Result<Option<Vec<(WorkloadLabel, KnowledgeEntry)>>, KnowledgeError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)?;

    let mut out = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let label = match key.parse::<WorkloadLabel>() {
            Ok(label) => label,
            Err(e) => {
                warn!("KNOWLEDGE SKIP: {}", e);
                continue;
            }
        };
        match serde_json::from_value::<KnowledgeEntry>(value) {
            Ok(entry) => out.push((label, entry)),
            Err(e) => warn!("KNOWLEDGE SKIP {}: {}", key, e),
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(a: i32, b: i32) -> Configuration {
        Configuration::new(vec![a, b])
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KnowledgeCache::open(dir.path().join("none.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(KnowledgeCache::open(&path).is_empty());
    }

    #[test]
    fn record_only_on_strict_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = KnowledgeCache::open(dir.path().join("k.json"));
        let label = WorkloadLabel::AxisAHeavy;

        assert!(cache.record(label, cfg(45, 20), 100.0).unwrap());
        assert!(!cache.record(label, cfg(30, 30), 100.0).unwrap());
        assert!(!cache.record(label, cfg(30, 30), 150.0).unwrap());
        assert_eq!(cache.lookup(label).unwrap().configuration, cfg(45, 20));

        assert!(cache.record(label, cfg(50, 15), 80.0).unwrap());
        assert_eq!(cache.lookup(label).unwrap(), &KnowledgeEntry { configuration: cfg(50, 15), cost: 80.0 });
    }

    #[test]
    fn non_finite_cost_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = KnowledgeCache::open(dir.path().join("k.json"));
        assert!(!cache.record(WorkloadLabel::Saturated, cfg(30, 30), f64::NAN).unwrap());
        assert!(cache.lookup(WorkloadLabel::Saturated).is_none());
    }

    #[test]
    fn persisted_document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("k.json");
        {
            let mut cache = KnowledgeCache::open(&path);
            cache.record(WorkloadLabel::AxisBFlow, cfg(20, 55), 12.5).unwrap();
            cache.record(WorkloadLabel::LightBalanced, cfg(15, 15), 3.0).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["AxisB-Flow"]["configuration"], serde_json::json!([20, 55]));
        assert_eq!(doc["AxisB-Flow"]["cost"], serde_json::json!(12.5));

        let reopened = KnowledgeCache::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.lookup(WorkloadLabel::LightBalanced).unwrap().configuration, cfg(15, 15));
    }

    #[test]
    fn merge_keeps_lower_cost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        std::fs::write(&path, r#"{
            "Saturated": {"configuration": [60, 60], "cost": 10.0},
            "AxisA-Heavy": {"configuration": [50, 20], "cost": 90.0},
            "Rush-Hour": {"configuration": [1, 1], "cost": 0.0},
            "AxisB-Heavy": {"configuration": "bad"}
        }"#).unwrap();

        let mut cache = KnowledgeCache::open(dir.path().join("other.json"));
        cache.record(WorkloadLabel::AxisAHeavy, cfg(45, 25), 40.0).unwrap();
        cache.record(WorkloadLabel::Saturated, cfg(40, 40), 20.0).unwrap();

        cache.path = path;
        assert_eq!(cache.merge_from_disk(), 1);
        assert_eq!(cache.lookup(WorkloadLabel::Saturated).unwrap().cost, 10.0);
        assert_eq!(cache.lookup(WorkloadLabel::AxisAHeavy).unwrap().cost, 40.0);
        assert!(cache.lookup(WorkloadLabel::AxisBHeavy).is_none());
    }

    #[test]
    fn others_excludes_label_and_sorts_by_cost() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = KnowledgeCache::open(dir.path().join("k.json"));
        cache.record(WorkloadLabel::AxisAHeavy, cfg(50, 20), 30.0).unwrap();
        cache.record(WorkloadLabel::AxisBHeavy, cfg(20, 50), 10.0).unwrap();
        cache.record(WorkloadLabel::Saturated, cfg(60, 60), 20.0).unwrap();
        assert_eq!(
            cache.others(WorkloadLabel::AxisAHeavy),
            vec![cfg(20, 50), cfg(60, 60)]
        );
    }
}
