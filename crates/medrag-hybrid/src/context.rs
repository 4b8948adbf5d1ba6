use std::fmt::Write;

use medrag_core::material::MaterialType;
use medrag_core::signals::PatientSignals;
use medrag_core::types::RetrievalResult;

const NONE_RECORDED: &str = "none recorded";

fn list(values: &[String]) -> String {
    if values.is_empty() { NONE_RECORDED.to_string() } else { values.join(", ") }
}

/// Patient block followed by the education type line.
pub fn minimal_context(signals: &PatientSignals, material: MaterialType) -> String {
    let mut out = String::from("Patient Information:\n");
    for (label, values) in [
        ("Conditions", &signals.conditions),
        ("Medications", &signals.medications),
        ("Procedures", &signals.procedures),
        ("Symptoms", &signals.symptoms),
    ] {
        let _ = writeln!(out, "- {label}: {}", list(values));
    }
    let _ = write!(out, "Education Type: {material}");
    out
}

/// Deterministic generation context: the minimal context, then every
/// retrieved chunk numbered from 1, each preceded by a blank line.
pub fn assemble(signals: &PatientSignals, material: MaterialType, retrieved: &[RetrievalResult]) -> String {
    let mut out = minimal_context(signals, material);
    out.push_str("\nRelevant Medical Guidelines:");
    for (i, result) in retrieved.iter().enumerate() {
        let _ = write!(out, "\n\n{}. {}", i + 1, result.chunk.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrag_core::types::{Chunk, ChunkSource, Meta, RetrieverOrigin};

    fn retrieved(text: &str) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                text: text.to_string(),
                category: "c".into(),
                subcategory: "s".into(),
                source: ChunkSource::KnowledgeBase,
                sequence_index: 0,
                session: None,
                meta: Meta::new(),
            },
            score: 1.0,
            retriever_origin: RetrieverOrigin::Dense,
        }
    }

    #[test]
    fn exact_layout() {
        let signals = PatientSignals {
            conditions: vec!["diabetes".into(), "hypertension".into()],
            medications: vec![],
            procedures: vec!["surgery".into()],
            symptoms: vec!["pain".into()],
        };
        let text = assemble(&signals, MaterialType::MedicationGuide, &[retrieved("Take with food."), retrieved("Finish the course.")]);
        let expected = "Patient Information:\n\
                        - Conditions: diabetes, hypertension\n\
                        - Medications: none recorded\n\
                        - Procedures: surgery\n\
                        - Symptoms: pain\n\
                        Education Type: medication_guide\n\
                        Relevant Medical Guidelines:\n\
                        \n\
                        1. Take with food.\n\
                        \n\
                        2. Finish the course.";
        assert_eq!(text, expected);
    }

    #[test]
    fn minimal_context_has_no_guideline_section() {
        let text = minimal_context(&PatientSignals::default(), MaterialType::DietPlan);
        assert!(text.ends_with("Education Type: diet_plan"));
        assert!(!text.contains("Relevant Medical Guidelines"));
        assert_eq!(text.matches(NONE_RECORDED).count(), 4);
    }
}
