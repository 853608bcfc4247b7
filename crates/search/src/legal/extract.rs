//! Feature extraction from legal point payloads and context assembly

use super::features::{normalize_text, FeatureAliasMap};
use lexforge_common::config::LegalConfig;
use lexforge_common::models::{Context, Metadata, PointId, SourceDescriptor};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub const LEGAL_SOURCE_TYPE: &str = "legal_feature";
const DISPLAY_PREFIX: &str = "Legal DB";
const FALLBACK_FEATURE: &str = "legal";

/// Payload field names the extractor reads
#[derive(Debug, Clone)]
pub struct PayloadFields {
    pub content: String,
    pub feature: String,
    pub case_number: String,
    pub file_name: String,
    pub document_id: String,
}

impl From<&LegalConfig> for PayloadFields {
    fn from(config: &LegalConfig) -> Self {
        Self {
            content: config.fallback_content_field.clone(),
            feature: config.fallback_feature_field.clone(),
            case_number: config.case_number_field.clone(),
            file_name: config.file_name_field.clone(),
            document_id: config.document_id_field.clone(),
        }
    }
}

impl Default for PayloadFields {
    fn default() -> Self {
        Self::from(&LegalConfig::default())
    }
}

/// Trimmed text of a payload value; `None` for null, false, zero, empty
/// containers and blank strings
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::Bool(true) => "True".to_string(),
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                return None;
            }
            n.to_string()
        }
        Value::String(s) => s.trim().to_string(),
        Value::Array(a) if a.is_empty() => return None,
        Value::Object(o) if o.is_empty() => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn field_text(payload: &Metadata, field: &str) -> Option<String> {
    payload.get(field).and_then(value_text)
}

/// `(canonical feature, content)` pairs found in one payload.
///
/// Requested features are matched against payload keys by normalized name,
/// also trying the underscore and space spellings. When nothing matches, the
/// generic content field is used under the point's own column name.
pub fn extract_features(
    payload: &Metadata,
    requested: &[String],
    aliases: &FeatureAliasMap,
    fields: &PayloadFields,
) -> Vec<(String, String)> {
    let key_map: HashMap<String, &str> = payload
        .keys()
        .map(|key| (normalize_text(key), key.as_str()))
        .collect();

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for feature in requested {
        let Some(key) = lookup_key(&key_map, feature) else {
            continue;
        };
        let Some(content) = payload.get(key).and_then(value_text) else {
            continue;
        };
        let canonical = aliases.canonical(feature);
        if seen.insert(canonical.clone()) {
            items.push((canonical, content));
        }
    }

    if items.is_empty() {
        if let Some(content) = field_text(payload, &fields.content) {
            let raw = field_text(payload, &fields.feature).unwrap_or_else(|| FALLBACK_FEATURE.to_string());
            items.push((aliases.canonical(&raw), content));
        }
    }
    items
}

fn lookup_key<'p>(key_map: &HashMap<String, &'p str>, feature: &str) -> Option<&'p str> {
    let mut found = key_map.get(&normalize_text(feature)).copied();
    if found.is_none() && feature.contains(' ') {
        found = key_map.get(&normalize_text(&feature.replace(' ', "_"))).copied();
    }
    if found.is_none() && feature.contains('_') {
        found = key_map.get(&normalize_text(&feature.replace('_', " "))).copied();
    }
    found
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// `Legal DB • <Feature>` followed by the case number, else the file name
pub fn display_name(feature: &str, case_number: Option<&str>, file_name: Option<&str>) -> String {
    let mut name = format!("{} • {}", DISPLAY_PREFIX, title_case(&feature.replace('_', " ")));
    if let Some(suffix) = case_number.or(file_name) {
        name.push_str(" • ");
        name.push_str(suffix);
    }
    name
}

/// One extracted feature of one point, ready to become a [`Context`]
pub struct FeatureHit<'a> {
    pub collection: &'a str,
    pub point_id: &'a PointId,
    pub payload: &'a Metadata,
    pub feature: &'a str,
    pub content: &'a str,
    pub score: f32,
}

impl FeatureHit<'_> {
    pub fn into_context(self, fields: &PayloadFields) -> Context {
        let case_number = field_text(self.payload, &fields.case_number);
        let file_name = field_text(self.payload, &fields.file_name);
        let document_id = field_text(self.payload, &fields.document_id);
        let name = display_name(self.feature, case_number.as_deref(), file_name.as_deref());

        let raw = |field: &str| self.payload.get(field).cloned().unwrap_or(Value::Null);
        let source_label = case_number
            .clone()
            .or_else(|| file_name.clone())
            .unwrap_or_else(|| self.feature.to_string());

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), Value::from(source_label));
        metadata.insert("collection_name".into(), Value::from(self.collection));
        metadata.insert("feature".into(), Value::from(self.feature));
        metadata.insert("file_name".into(), raw(&fields.file_name));
        metadata.insert("nomor_putusan".into(), raw(&fields.case_number));
        metadata.insert("document_id".into(), raw(&fields.document_id));
        metadata.insert("score".into(), Value::from(self.score));
        metadata.insert("name".into(), Value::from(name.clone()));

        let document_id = document_id.unwrap_or_else(|| self.point_id.to_string());
        let source = SourceDescriptor::new(
            LEGAL_SOURCE_TYPE,
            format!("{}:{}:{}", self.collection, document_id, self.feature),
            name,
        )
        .with_extra("collection", self.collection)
        .with_extra("feature", self.feature);

        Context {
            source,
            document: vec![Some(self.content.to_string())],
            metadata: vec![metadata],
            distances: Some(vec![self.score]),
        }
    }
}
