//! Requested education material types and the static category fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    PostOperative,
    MedicationGuide,
    DietPlan,
}

impl MaterialType {
    pub const ALL: [MaterialType; 3] = [MaterialType::PostOperative, MaterialType::MedicationGuide, MaterialType::DietPlan];

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialType::PostOperative => "post_operative",
            MaterialType::MedicationGuide => "medication_guide",
            MaterialType::DietPlan => "diet_plan",
        }
    }

    /// Lenient parse for collaborator input: unknown ids fall back to
    /// `default` with a warning.
    pub fn parse_or_default(s: &str, default: MaterialType) -> MaterialType {
        s.parse().unwrap_or_else(|e: Error| {
            tracing::warn!(error = %e, fallback = %default, "unknown material type");
            default
        })
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        MaterialType::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| Error::UnknownMaterialType(s.to_string()))
    }
}

/// Material type id → knowledge categories served when every retriever
/// comes back empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FallbackTable {
    pub materials: BTreeMap<String, Vec<String>>,
}

impl Default for FallbackTable {
    fn default() -> Self {
        let entry = |m: MaterialType, cats: &[&str]| -> (String, Vec<String>) {
            (m.as_str().to_string(), cats.iter().map(|c| (*c).to_string()).collect())
        };
        Self {
            materials: BTreeMap::from([
                entry(MaterialType::PostOperative, &["post_operative_care", "warning_signs"]),
                entry(MaterialType::MedicationGuide, &["medication_guidance", "warning_signs"]),
                entry(MaterialType::DietPlan, &["diet_and_nutrition", "warning_signs"]),
            ]),
        }
    }
}

impl FallbackTable {
    pub fn categories_for(&self, material: MaterialType) -> &[String] {
        self.materials.get(material.as_str()).map_or(&[], Vec::as_slice)
    }
}
