//! Declarative keyword table turning patient text into retrieval signals.

use serde::{Deserialize, Serialize};

use crate::material::MaterialType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Condition,
    Medication,
    Procedure,
    Symptom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRule {
    pub kind: SignalKind,
    pub keywords: Vec<String>,
}

/// Ordered rules; a keyword may appear under several kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordTable {
    pub rules: Vec<KeywordRule>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let rule = |kind, words: &[&str]| KeywordRule { kind, keywords: words.iter().map(|w| (*w).to_string()).collect() };
        Self {
            rules: vec![
                rule(SignalKind::Condition, &[
                    "diabetes", "hypertension", "surgery", "operation", "procedure",
                    "diagnosis", "condition", "disease", "disorder", "syndrome",
                ]),
                rule(SignalKind::Medication, &[
                    "medication", "drug", "prescription", "pill", "tablet",
                    "capsule", "dosage", "mg", "ml", "treatment",
                ]),
                rule(SignalKind::Procedure, &[
                    "surgery", "operation", "procedure", "treatment", "therapy",
                    "intervention", "examination", "test", "scan", "biopsy",
                ]),
                rule(SignalKind::Symptom, &[
                    "pain", "fever", "nausea", "swelling", "dizziness", "fatigue", "shortness of breath",
                ]),
            ],
        }
    }
}

impl KeywordTable {
    /// Match every rule against the concatenated, normalized texts. A keyword
    /// matches only as a whole word or whole phrase.
    pub fn extract<'a, I>(&self, texts: I) -> PatientSignals
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut haystack = String::from(" ");
        for text in texts {
            haystack.push_str(&normalize(text));
            haystack.push(' ');
        }
        let mut signals = PatientSignals::default();
        for rule in &self.rules {
            for keyword in &rule.keywords {
                let needle = normalize(keyword);
                if needle.is_empty() {
                    continue;
                }
                if haystack.contains(&format!(" {needle} ")) {
                    signals.push(rule.kind, keyword);
                }
            }
        }
        tracing::info!(
            conditions = signals.conditions.len(),
            medications = signals.medications.len(),
            procedures = signals.procedures.len(),
            symptoms = signals.symptoms.len(),
            "extracted patient signals"
        );
        signals
    }
}

/// Lowercase, non-alphanumerics to spaces, runs of whitespace collapsed.
fn normalize(text: &str) -> String {
    let mut mapped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            mapped.extend(c.to_lowercase());
        } else {
            mapped.push(' ');
        }
    }
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientSignals {
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
}

impl PatientSignals {
    fn push(&mut self, kind: SignalKind, keyword: &str) {
        let list = match kind {
            SignalKind::Condition => &mut self.conditions,
            SignalKind::Medication => &mut self.medications,
            SignalKind::Procedure => &mut self.procedures,
            SignalKind::Symptom => &mut self.symptoms,
        };
        if !list.iter().any(|k| k == keyword) {
            list.push(keyword.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.medications.is_empty() && self.procedures.is_empty() && self.symptoms.is_empty()
    }

    /// Conditions, procedures, then medications; the material id when none.
    pub fn query_text(&self, material: MaterialType) -> String {
        let parts: Vec<&str> = self
            .conditions
            .iter()
            .chain(&self.procedures)
            .chain(&self.medications)
            .map(String::as_str)
            .collect();
        if parts.is_empty() { material.as_str().to_string() } else { parts.join(" ") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_whole_words_only() {
        let table = KeywordTable::default();
        let signals = table.extract(["Latest labs: HbA1c high, Diabetes type 2. Metformin 500 mg tablet."]);
        assert_eq!(signals.conditions, vec!["diabetes".to_string()]);
        assert!(signals.medications.contains(&"mg".to_string()));
        assert!(signals.medications.contains(&"tablet".to_string()));
        assert!(!signals.procedures.contains(&"test".to_string()), "'latest' must not match 'test'");
    }

    #[test]
    fn phrases_match_across_punctuation_and_lines() {
        let table = KeywordTable::default();
        let signals = table.extract(["Reports shortness", "of-breath at night"]);
        assert_eq!(signals.symptoms, vec!["shortness of breath".to_string()]);
    }

    #[test]
    fn non_ascii_capitals_match() {
        let table = KeywordTable {
            rules: vec![KeywordRule { kind: SignalKind::Symptom, keywords: vec!["Ödem".to_string(), "ÉRYTHÈME".to_string()] }],
        };
        let signals = table.extract(["Starkes ÖDEM am linken Bein, érythème seit gestern."]);
        assert_eq!(signals.symptoms, vec!["Ödem".to_string(), "ÉRYTHÈME".to_string()]);
    }

    #[test]
    fn shared_keyword_lands_in_every_kind() {
        let signals = KeywordTable::default().extract(["Scheduled surgery next week."]);
        assert!(signals.conditions.contains(&"surgery".to_string()));
        assert!(signals.procedures.contains(&"surgery".to_string()));
    }

    #[test]
    fn query_text_order_and_material_fallback() {
        let signals = PatientSignals {
            conditions: vec!["hypertension".into()],
            medications: vec!["pill".into()],
            procedures: vec!["biopsy".into()],
            symptoms: vec!["pain".into()],
        };
        assert_eq!(signals.query_text(MaterialType::DietPlan), "hypertension biopsy pill");
        assert_eq!(PatientSignals::default().query_text(MaterialType::DietPlan), "diet_plan");
    }
}
