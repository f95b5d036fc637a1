//! Reference knowledge: syndromes, treatment guidelines and symptom matching.
//!
//! Catalogs are kept as JSON documents in a knowledge directory
//! (`syndromes.json`, `treatment_guidelines.json`). The symptom index is
//! always derived from the syndrome records, never stored, so it cannot drift
//! from them.

mod defaults;

pub use defaults::{default_guidelines, default_syndromes};

use crate::models::{SyndromeMatch, SyndromeRecord, TreatmentGuideline};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const SYNDROMES_FILE: &str = "syndromes.json";
const GUIDELINES_FILE: &str = "treatment_guidelines.json";

/// Failure to persist a catalog.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Symptom → ids of the syndromes listing it.
#[derive(Debug, Clone, Default)]
pub struct SymptomIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SymptomIndex {
    pub fn build(syndromes: &BTreeMap<String, SyndromeRecord>) -> Self {
        let mut index = Self::default();
        for (id, record) in syndromes {
            index.insert(id, record);
        }
        index
    }

    fn insert(&mut self, id: &str, record: &SyndromeRecord) {
        for symptom in &record.symptoms {
            self.entries
                .entry(symptom.clone())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn remove(&mut self, id: &str, record: &SyndromeRecord) {
        for symptom in &record.symptoms {
            if let Some(ids) = self.entries.get_mut(symptom) {
                ids.remove(id);
                if ids.is_empty() {
                    self.entries.remove(symptom);
                }
            }
        }
    }

    /// Syndrome ids listing `symptom`.
    pub fn lookup(&self, symptom: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(symptom)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when every symptom of every record maps back to its id.
    pub fn covers(&self, syndromes: &BTreeMap<String, SyndromeRecord>) -> bool {
        syndromes.iter().all(|(id, record)| {
            record
                .symptoms
                .iter()
                .all(|s| self.lookup(s).map(|ids| ids.contains(id)).unwrap_or(false))
        })
    }
}

/// Syndrome and guideline store with symptom-based search.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    dir: Option<PathBuf>,
    syndromes: BTreeMap<String, SyndromeRecord>,
    index: SymptomIndex,
    guidelines: BTreeMap<String, TreatmentGuideline>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl KnowledgeBase {
    /// Knowledge base holding the built-in data, never written to disk.
    pub fn in_memory() -> Self {
        Self::from_catalogs(None, default_syndromes(), default_guidelines())
    }

    /// Knowledge base backed by `dir`.
    ///
    /// Missing catalogs are created from the built-in data. Unreadable or
    /// malformed catalogs are logged and replaced by the built-in data in memory.
    pub fn open(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(
                "Cannot create knowledge directory {} ({}), using built-in data",
                dir.display(),
                e
            );
            return Self::in_memory();
        }

        let syndromes = load_catalog(&dir.join(SYNDROMES_FILE), default_syndromes);
        let guidelines = load_catalog(&dir.join(GUIDELINES_FILE), default_guidelines);

        let kb = Self::from_catalogs(Some(dir.to_path_buf()), syndromes, guidelines);
        debug_assert!(kb.index.covers(&kb.syndromes));
        info!(
            "Knowledge base loaded: {} syndromes, {} guidelines, {} indexed symptoms",
            kb.syndromes.len(),
            kb.guidelines.len(),
            kb.index.len()
        );
        kb
    }

    fn from_catalogs(
        dir: Option<PathBuf>,
        mut syndromes: BTreeMap<String, SyndromeRecord>,
        mut guidelines: BTreeMap<String, TreatmentGuideline>,
    ) -> Self {
        for (id, record) in syndromes.iter_mut() {
            record.id = id.clone();
        }
        for (id, guideline) in guidelines.iter_mut() {
            guideline.condition_id = id.clone();
        }

        let index = SymptomIndex::build(&syndromes);
        Self {
            dir,
            syndromes,
            index,
            guidelines,
        }
    }

    /// Backing directory, `None` for an in-memory knowledge base.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn get_syndrome(&self, id: &str) -> Option<&SyndromeRecord> {
        self.syndromes.get(id)
    }

    pub fn get_guideline(&self, condition_id: &str) -> Option<&TreatmentGuideline> {
        self.guidelines.get(condition_id)
    }

    pub fn syndrome_ids(&self) -> impl Iterator<Item = &str> {
        self.syndromes.keys().map(String::as_str)
    }

    pub fn guideline_ids(&self) -> impl Iterator<Item = &str> {
        self.guidelines.keys().map(String::as_str)
    }

    pub fn index(&self) -> &SymptomIndex {
        &self.index
    }

    /// Rank syndromes sharing at least one symptom with `symptoms`.
    ///
    /// Sorted by match percentage, highest first; equal percentages are
    /// ordered by syndrome id.
    pub fn search_syndromes(&self, symptoms: &BTreeSet<String>) -> Vec<SyndromeMatch> {
        let candidates: BTreeSet<&String> = symptoms
            .iter()
            .filter_map(|s| self.index.lookup(s))
            .flatten()
            .collect();

        let mut matches: Vec<SyndromeMatch> = candidates
            .into_iter()
            .filter_map(|id| {
                let record = self.syndromes.get(id)?;
                let matched_count = record.symptoms.intersection(symptoms).count();
                let total_count = record.symptoms.len();
                if matched_count == 0 || total_count == 0 {
                    return None;
                }
                Some(SyndromeMatch {
                    id: id.clone(),
                    record: record.clone(),
                    matched_count,
                    total_count,
                    match_percentage: matched_count as f64 / total_count as f64 * 100.0,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.match_percentage
                .partial_cmp(&a.match_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!(
            "Symptom search over {} symptoms matched {} syndromes",
            symptoms.len(),
            matches.len()
        );
        matches
    }

    /// Add or replace a syndrome.
    ///
    /// The catalog is persisted first; the record and its index entries only
    /// become visible once that succeeds.
    pub fn add_syndrome(&mut self, id: &str, mut record: SyndromeRecord) -> Result<(), KnowledgeError> {
        record.id = id.to_string();

        let mut updated = self.syndromes.clone();
        let previous = updated.insert(id.to_string(), record.clone());
        self.persist(SYNDROMES_FILE, &updated)?;

        if let Some(previous) = previous {
            self.index.remove(id, &previous);
        }
        self.index.insert(id, &record);
        self.syndromes = updated;

        info!("Added syndrome {} ({} symptoms)", id, record.symptoms.len());
        Ok(())
    }

    /// Add or replace a treatment guideline.
    pub fn add_guideline(
        &mut self,
        condition_id: &str,
        mut guideline: TreatmentGuideline,
    ) -> Result<(), KnowledgeError> {
        guideline.condition_id = condition_id.to_string();

        let mut updated = self.guidelines.clone();
        updated.insert(condition_id.to_string(), guideline);
        self.persist(GUIDELINES_FILE, &updated)?;
        self.guidelines = updated;

        info!("Added treatment guideline {}", condition_id);
        Ok(())
    }

    fn persist<T: Serialize>(&self, file: &str, catalog: &T) -> Result<(), KnowledgeError> {
        match &self.dir {
            Some(dir) => write_catalog(&dir.join(file), catalog),
            None => Ok(()),
        }
    }
}

fn load_catalog<T, F>(path: &Path, defaults: F) -> T
where
    T: DeserializeOwned + Serialize,
    F: Fn() -> T,
{
    if !path.exists() {
        let catalog = defaults();
        match write_catalog(path, &catalog) {
            Ok(()) => info!("Created default catalog at {}", path.display()),
            Err(e) => warn!("{}", e),
        }
        return catalog;
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<T>(&content).map_err(|e| e.to_string()));

    match parsed {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(
                "Failed to load {} ({}), falling back to built-in data",
                path.display(),
                e
            );
            defaults()
        }
    }
}

fn write_catalog<T: Serialize + ?Sized>(path: &Path, catalog: &T) -> Result<(), KnowledgeError> {
    let content = serde_json::to_string_pretty(catalog)?;
    std::fs::write(path, content).map_err(|source| KnowledgeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use tempfile::TempDir;

    fn symptoms(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn record(name: &str, items: &[&str]) -> SyndromeRecord {
        SyndromeRecord {
            id: String::new(),
            name: name.to_string(),
            description: String::new(),
            symptoms: symptoms(items),
            genes: vec![],
            inheritance: String::new(),
            prevalence: String::new(),
            references: vec![],
        }
    }

    #[test]
    fn test_van_der_woude_match() {
        let kb = KnowledgeBase::in_memory();
        let results = kb.search_syndromes(&symptoms(&["cleft_lip", "cleft_palate", "lower_lip_pits"]));

        let top = &results[0];
        assert_eq!(top.id, "van_der_woude_syndrome");
        assert_eq!(top.matched_count, 3);
        assert_eq!(top.total_count, 4);
        assert_eq!(top.match_percentage, 75.0);
        assert_eq!(top.confidence(), Confidence::High);
    }

    #[test]
    fn test_search_sorted_and_overlapping() {
        let kb = KnowledgeBase::in_memory();
        let input = symptoms(&["cleft_palate", "myopia", "retinal_detachment", "unrelated"]);
        let results = kb.search_syndromes(&input);

        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].match_percentage >= pair[1].match_percentage);
        }
        for m in &results {
            assert!(m.record.symptoms.intersection(&input).count() > 0);
        }
        assert_eq!(results[0].id, "stickler_syndrome");
    }

    #[test]
    fn test_ties_ordered_by_id() {
        let kb = KnowledgeBase::in_memory();
        // Treacher Collins and Stickler both list five symptoms including cleft_palate.
        let results = kb.search_syndromes(&symptoms(&["cleft_palate"]));
        assert_eq!(results[0].id, "van_der_woude_syndrome");
        assert_eq!(results[1].id, "stickler_syndrome");
        assert_eq!(results[2].id, "treacher_collins_syndrome");
    }

    #[test]
    fn test_no_overlap_yields_nothing() {
        let kb = KnowledgeBase::in_memory();
        assert!(kb.search_syndromes(&symptoms(&["fever"])).is_empty());
        assert!(kb.search_syndromes(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_unknown_ids_are_absent() {
        let kb = KnowledgeBase::in_memory();
        assert!(kb.get_syndrome("nope").is_none());
        assert!(kb.get_guideline("nope").is_none());
        assert!(kb.get_guideline("van_der_woude_syndrome").is_some());
    }

    #[test]
    fn test_add_syndrome_updates_index() {
        let mut kb = KnowledgeBase::in_memory();
        kb.add_syndrome("pierre_robin", record("Pierre Robin sequence", &["micrognathia", "glossoptosis"]))
            .unwrap();

        assert!(kb.index().covers(&kb.syndromes));
        assert!(kb.index().lookup("glossoptosis").unwrap().contains("pierre_robin"));
        assert_eq!(kb.get_syndrome("pierre_robin").unwrap().id, "pierre_robin");

        // Replacing drops stale symptom links.
        kb.add_syndrome("pierre_robin", record("Pierre Robin sequence", &["micrognathia"]))
            .unwrap();
        assert!(kb.index().lookup("glossoptosis").is_none());
        assert!(kb.index().covers(&kb.syndromes));
    }

    #[test]
    fn test_open_creates_default_catalogs() {
        let dir = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(dir.path());

        assert!(dir.path().join(SYNDROMES_FILE).exists());
        assert!(dir.path().join(GUIDELINES_FILE).exists());
        assert_eq!(kb.syndrome_ids().count(), 3);
        assert!(kb.index().covers(&kb.syndromes));
    }

    #[test]
    fn test_malformed_catalog_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SYNDROMES_FILE), "{ not json").unwrap();

        let kb = KnowledgeBase::open(dir.path());
        assert!(kb.get_syndrome("van_der_woude_syndrome").is_some());
        // The broken file is left for inspection.
        let content = std::fs::read_to_string(dir.path().join(SYNDROMES_FILE)).unwrap();
        assert_eq!(content, "{ not json");
    }

    #[test]
    fn test_additions_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut kb = KnowledgeBase::open(dir.path());
            kb.add_syndrome("custom", record("Custom syndrome", &["cleft_lip", "hypertelorism"]))
                .unwrap();
            kb.add_guideline(
                "custom",
                TreatmentGuideline {
                    condition_id: String::new(),
                    title: "Custom guideline".to_string(),
                    timeline: vec![],
                    follow_up: vec![],
                    references: vec![],
                },
            )
            .unwrap();
        }

        let kb = KnowledgeBase::open(dir.path());
        assert_eq!(kb.get_syndrome("custom").unwrap().name, "Custom syndrome");
        assert_eq!(kb.get_guideline("custom").unwrap().condition_id, "custom");
        assert!(kb.index().lookup("hypertelorism").unwrap().contains("custom"));
    }

    #[test]
    fn test_failed_persist_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let mut kb = KnowledgeBase::open(dir.path());
        // Make the catalog path unwritable by turning it into a directory.
        std::fs::remove_file(dir.path().join(SYNDROMES_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(SYNDROMES_FILE)).unwrap();

        let result = kb.add_syndrome("ghost", record("Ghost", &["phantom_symptom"]));
        assert!(result.is_err());
        assert!(kb.get_syndrome("ghost").is_none());
        assert!(kb.index().lookup("phantom_symptom").is_none());
    }
}
