//! Curated knowledge base: categories → sections → short guidance items.
//!
//! The built-in set is compiled in from `knowledge/default.toml`. A directory
//! laid out as `<root>/<category>/<subcategory>.txt` can replace it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chunker::Chunker;
use crate::error::{Error, Result};

const BUILTIN: &str = include_str!("../knowledge/default.toml");

/// Separators for knowledge text: no raw-character fallback, items are short.
pub const KNOWLEDGE_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    pub version: String,
    #[serde(default)]
    pub categories: Vec<KnowledgeCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeCategory {
    pub name: String,
    #[serde(default)]
    pub sections: Vec<KnowledgeSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeSection {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// A chunked piece of a section, before it receives a corpus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgePassage {
    pub category: String,
    pub subcategory: String,
    pub text: String,
}

impl KnowledgeBase {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::InvalidConfig(format!("knowledge base: {e}")))
    }

    /// Load `<root>/<category>/<subcategory>.txt`, one item per non-empty line.
    /// Files are visited in sorted order so the corpus is reproducible.
    pub fn from_dir(root: &Path, version: &str) -> Result<Self> {
        let mut kb = Self { version: version.to_string(), categories: Vec::new() };
        let entries = walkdir::WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"));
        for entry in entries {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let Some((category, subcategory)) = category_from_path(relative) else { continue };
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(_) => String::from_utf8_lossy(&std::fs::read(path)?).to_string(),
            };
            let items = content.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect();
            kb.add_custom(&category, &subcategory, items);
        }
        if kb.categories.is_empty() {
            return Err(Error::IndexBuild(format!("no knowledge files under {}", root.display())));
        }
        tracing::info!(root = %root.display(), categories = kb.categories.len(), "loaded knowledge base from directory");
        Ok(kb)
    }

    /// Insert or replace a section.
    pub fn add_custom(&mut self, category: &str, subcategory: &str, items: Vec<String>) {
        let cat = match self.categories.iter().position(|c| c.name == category) {
            Some(i) => &mut self.categories[i],
            None => {
                self.categories.push(KnowledgeCategory { name: category.to_string(), sections: Vec::new() });
                let last = self.categories.len() - 1;
                &mut self.categories[last]
            }
        };
        let count = items.len();
        match cat.sections.iter_mut().find(|s| s.name == subcategory) {
            Some(section) => section.items = items,
            None => cat.sections.push(KnowledgeSection { name: subcategory.to_string(), items }),
        }
        tracing::debug!(category, subcategory, items = count, "added custom knowledge");
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    /// Chunk every section in declaration order.
    pub fn passages(&self, chunker: &Chunker) -> Vec<KnowledgePassage> {
        let mut out = Vec::new();
        for category in &self.categories {
            for section in &category.sections {
                let text = section.items.join("\n");
                for piece in chunker.split(&text) {
                    out.push(KnowledgePassage {
                        category: category.name.clone(),
                        subcategory: section.name.clone(),
                        text: piece,
                    });
                }
            }
        }
        out
    }
}

fn category_from_path(relative: &Path) -> Option<(String, String)> {
    let components: Vec<_> = relative.components().collect();
    if components.len() != 2 {
        return None;
    }
    let category = components[0].as_os_str().to_string_lossy().to_string();
    let subcategory = Path::new(components[1].as_os_str()).file_stem()?.to_string_lossy().to_string();
    Some((category, subcategory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_the_four_topics() {
        let kb = KnowledgeBase::builtin().expect("builtin parses");
        let names: Vec<&str> = kb.category_names().collect();
        assert_eq!(names, vec!["post_operative_care", "medication_guidance", "diet_and_nutrition", "warning_signs"]);
        assert!(kb.categories.iter().all(|c| !c.sections.is_empty()));
    }

    #[test]
    fn passages_respect_chunk_size() {
        let kb = KnowledgeBase::builtin().expect("builtin");
        let chunker = Chunker::new(300, 30).expect("chunker").with_separators(KNOWLEDGE_SEPARATORS);
        let passages = kb.passages(&chunker);
        assert!(passages.len() > kb.categories.len());
        assert!(passages.iter().all(|p| p.text.chars().count() <= 300));
    }

    #[test]
    fn add_custom_replaces_existing_section() {
        let mut kb = KnowledgeBase { version: "t".into(), categories: vec![] };
        kb.add_custom("a", "x", vec!["one".into()]);
        kb.add_custom("a", "x", vec!["two".into()]);
        kb.add_custom("a", "y", vec!["three".into()]);
        assert_eq!(kb.categories.len(), 1);
        assert_eq!(kb.categories[0].sections.len(), 2);
        assert_eq!(kb.categories[0].sections[0].items, vec!["two".to_string()]);
    }

    #[test]
    fn from_dir_reads_category_tree() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let cat = tmp.path().join("diet_and_nutrition");
        std::fs::create_dir_all(&cat).expect("mkdir");
        std::fs::write(cat.join("hydration.txt"), "Drink water.\n\nAvoid soda.\n").expect("write");
        std::fs::write(tmp.path().join("stray.txt"), "ignored").expect("write");

        let kb = KnowledgeBase::from_dir(tmp.path(), "dir-1").expect("load");
        assert_eq!(kb.version, "dir-1");
        assert_eq!(kb.categories.len(), 1);
        assert_eq!(kb.categories[0].name, "diet_and_nutrition");
        assert_eq!(kb.categories[0].sections[0].name, "hydration");
        assert_eq!(kb.categories[0].sections[0].items, vec!["Drink water.".to_string(), "Avoid soda.".to_string()]);
    }

    #[test]
    fn from_empty_dir_is_a_build_error() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        assert!(matches!(KnowledgeBase::from_dir(tmp.path(), "v"), Err(Error::IndexBuild(_))));
    }
}
