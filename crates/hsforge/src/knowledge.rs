//! Domain documents handed to the generation service.
//!
//! [`Knowledge`] is loaded once from a directory of Markdown files and then
//! only read. The orchestration loop receives it through
//! [`RunContext`](crate::orchestrator::RunContext).

use std::{fs, io, path::Path};

use log::{debug, info};

use crate::generation::TaskKind;

/// Stems never loaded as documents.
const SKIPPED: &[&str] = &["README", "CHANGELOG"];

/// Documents relevant to each kind of task, in prompt order.
const LAYERS: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::Create,
        &[
            "GDL_quick_reference",
            "GDL_parameters",
            "GDL_control_flow",
            "GDL_2d_commands",
            "GDL_functions",
        ],
    ),
    (TaskKind::Modify, &["GDL_parameters", "GDL_control_flow"]),
    (TaskKind::Repair, &["GDL_common_errors", "GDL_control_flow"]),
];

/// One Markdown document, named by its file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A read-only set of documents, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Knowledge {
    documents: Vec<Document>,
}

impl Knowledge {
    pub fn new(mut documents: Vec<Document>) -> Self {
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Self { documents }
    }

    /// Load every `*.md` file directly inside `dir`.
    ///
    /// A missing directory yields an empty set.
    pub fn load(dir: &Path) -> io::Result<Self> {
        if !dir.is_dir() {
            debug!(dir:? = dir; "Knowledge directory missing");
            return Ok(Self::default());
        }

        let mut documents = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if SKIPPED.contains(&stem) {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            documents.push(Document::new(stem, text.trim_start_matches('\u{feff}')));
        }

        info!(dir:? = dir, documents = documents.len(); "Loaded knowledge");
        Ok(Self::new(documents))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, name: &str) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents for `kind`, falling back to every document when none of
    /// the listed ones exist.
    pub fn select(&self, kind: TaskKind) -> Vec<&Document> {
        let names = LAYERS
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(&[][..], |(_, names)| names);
        let selected: Vec<&Document> = names.iter().filter_map(|name| self.get(name)).collect();
        if selected.is_empty() {
            self.documents.iter().collect()
        } else {
            selected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge() -> Knowledge {
        Knowledge::new(vec![
            Document::new("GDL_control_flow", "IF ... ENDIF"),
            Document::new("GDL_common_errors", "Missing DEL"),
            Document::new("GDL_parameters", "Length A"),
        ])
    }

    #[test]
    fn test_select_follows_layers() {
        let knowledge = knowledge();

        let names: Vec<&str> = knowledge
            .select(TaskKind::Repair)
            .into_iter()
            .map(Document::name)
            .collect();
        assert_eq!(names, ["GDL_common_errors", "GDL_control_flow"]);

        let names: Vec<&str> = knowledge
            .select(TaskKind::Modify)
            .into_iter()
            .map(Document::name)
            .collect();
        assert_eq!(names, ["GDL_parameters", "GDL_control_flow"]);
    }

    #[test]
    fn test_select_falls_back_to_all() {
        let knowledge = Knowledge::new(vec![Document::new("stairs", "RISER")]);
        assert_eq!(knowledge.select(TaskKind::Create).len(), 1);
        assert!(Knowledge::default().select(TaskKind::Create).is_empty());
    }

    #[test]
    fn test_load_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("GDL_parameters.md"), "\u{feff}# Parameters\n").unwrap();
        fs::write(dir.path().join("README.md"), "skip").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let knowledge = Knowledge::load(dir.path()).unwrap();

        assert_eq!(knowledge.documents().len(), 1);
        assert_eq!(
            knowledge.get("GDL_parameters").map(Document::text),
            Some("# Parameters\n")
        );
        assert!(Knowledge::load(&dir.path().join("missing")).unwrap().is_empty());
    }
}
