//! Feature aliases, detection and query expansion

use std::collections::{HashMap, HashSet};

/// Collapse whitespace runs, trim and lowercase
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Human-readable phrase for a feature key (`amar_putusan` -> `amar putusan`)
pub fn feature_phrase(feature: &str) -> String {
    feature.replace('_', " ")
}

/// Normalized alias text -> canonical feature key.
///
/// The first key registering an alias keeps it. Every key maps to itself
/// under normalization unless an earlier key already claimed that alias.
#[derive(Debug, Clone, Default)]
pub struct FeatureAliasMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl FeatureAliasMap {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::default();
        for key in keys {
            let key = key.as_ref();
            let normalized = normalize_text(key);
            if normalized.is_empty() {
                continue;
            }
            map.insert(normalized, key);
            map.insert(normalize_text(&feature_phrase(key)), key);
            map.insert(normalize_text(&key.to_uppercase()), key);
        }
        map
    }

    fn insert(&mut self, alias: String, key: &str) {
        if alias.is_empty() || self.index.contains_key(&alias) {
            return;
        }
        self.index.insert(alias.clone(), self.entries.len());
        self.entries.push((alias, key.to_string()));
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.index.get(alias).map(|&i| self.entries[i].1.as_str())
    }

    /// Canonical key for a raw feature name, or the name itself when unknown
    pub fn canonical(&self, raw: &str) -> String {
        self.get(&normalize_text(raw))
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical features whose alias occurs in any query.
    ///
    /// Ordered by query, then alias registration order; no duplicates.
    pub fn detect(&self, queries: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut detected = Vec::new();
        for query in queries {
            let normalized = normalize_text(query);
            if normalized.is_empty() {
                continue;
            }
            for (alias, key) in &self.entries {
                if normalized.contains(alias.as_str()) {
                    let canonical = self.canonical(key);
                    if seen.insert(canonical.clone()) {
                        detected.push(canonical);
                    }
                }
            }
        }
        detected
    }
}

/// Candidate search texts for the legal store.
///
/// Each trimmed query, then the query joined with every feature phrase it
/// does not already mention, then each feature phrase on its own. Duplicates
/// are dropped; if nothing survives the non-empty raw queries are used.
pub fn expand_queries(queries: &[String], features: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut texts = Vec::new();
    let mut push = |text: String, texts: &mut Vec<String>| {
        if !text.is_empty() && seen.insert(text.clone()) {
            texts.push(text);
        }
    };

    for query in queries {
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        push(query.to_string(), &mut texts);
        let lowered = query.to_lowercase();
        for feature in features.iter().filter(|f| !f.is_empty()) {
            let phrase = feature_phrase(feature);
            if lowered.contains(&phrase.to_lowercase()) {
                continue;
            }
            push(format!("{} {}", query, phrase).trim().to_string(), &mut texts);
        }
    }

    for feature in features.iter().filter(|f| !f.is_empty()) {
        push(feature_phrase(feature), &mut texts);
    }

    if texts.is_empty() {
        texts = queries.iter().filter(|q| !q.is_empty()).cloned().collect();
    }
    texts
}
