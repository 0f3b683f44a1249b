use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoomError;

/// Structured creative brief with optional free-form notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brief {
    pub title: String,
    pub domain: String,
    pub voice: String,
    pub register: String,
    pub length_hint: Option<String>,

    // Selection guidance
    pub lean_into: Vec<String>,
    pub avoid: Vec<String>,

    pub notes: String,

    /// Few-shot examples for texture
    pub fewshot_examples: String,
    pub section_intent: String,
    pub rough_draft: Option<String>,
}

impl Brief {
    pub fn from_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: notes.into(),
            ..Self::default()
        }
    }

    /// Free-text guidance recorded on the loom: notes, else title, else empty.
    pub fn summary(&self) -> &str {
        if !self.notes.is_empty() {
            &self.notes
        } else {
            &self.title
        }
    }
}

/// Load a brief. `.toml` files populate structured fields; any other file becomes `notes`.
pub fn load_brief(path: impl AsRef<Path>) -> Result<Brief, LoomError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| LoomError::io(path, e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(&content).map_err(|source| LoomError::MalformedBrief {
            path: path.to_path_buf(),
            source,
        })
    } else {
        Ok(Brief::from_notes(content))
    }
}

#[cfg(test)]
mod tests {
    use super::{Brief, load_brief};
    use crate::error::LoomError;

    #[test]
    fn load_toml_full_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.toml");
        std::fs::write(
            &path,
            r#"
title = "Night Train"
domain = "fiction"
voice = "wry"
register = "literary"
length_hint = "short story"
lean_into = ["sensory detail", "dry humour"]
avoid = ["cliches"]
notes = "A passenger who never sleeps."
fewshot_examples = "The rails hummed like a held note."
section_intent = "Open on the platform."
rough_draft = "She waits. The train is late."
"#,
        )
        .unwrap();

        let brief = load_brief(&path).unwrap();
        assert_eq!(brief.title, "Night Train");
        assert_eq!(brief.domain, "fiction");
        assert_eq!(brief.voice, "wry");
        assert_eq!(brief.register, "literary");
        assert_eq!(brief.length_hint.as_deref(), Some("short story"));
        assert_eq!(brief.lean_into, vec!["sensory detail", "dry humour"]);
        assert_eq!(brief.avoid, vec!["cliches"]);
        assert_eq!(brief.notes, "A passenger who never sleeps.");
        assert_eq!(brief.fewshot_examples, "The rails hummed like a held note.");
        assert_eq!(brief.section_intent, "Open on the platform.");
        assert_eq!(brief.rough_draft.as_deref(), Some("She waits. The train is late."));
    }

    #[test]
    fn load_toml_missing_optionals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.TOML");
        std::fs::write(&path, "section_intent = \"Intent only\"\n").unwrap();

        let brief = load_brief(&path).unwrap();
        assert_eq!(brief.section_intent, "Intent only");
        assert_eq!(brief.title, "");
        assert_eq!(brief.length_hint, None);
        assert_eq!(brief.rough_draft, None);
        assert!(brief.lean_into.is_empty());
    }

    #[test]
    fn load_markdown_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.md");
        std::fs::write(&path, "# Notes\nKeep it tight.").unwrap();

        let brief = load_brief(&path).unwrap();
        assert_eq!(brief, Brief::from_notes("# Notes\nKeep it tight."));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.toml");
        std::fs::write(&path, "title = [unclosed").unwrap();
        assert!(matches!(
            load_brief(&path),
            Err(LoomError::MalformedBrief { .. })
        ));
    }

    #[test]
    fn summary_prefers_notes_then_title() {
        let mut brief = Brief {
            title: "Title".into(),
            ..Brief::default()
        };
        assert_eq!(brief.summary(), "Title");
        brief.notes = "Notes".into();
        assert_eq!(brief.summary(), "Notes");
        assert_eq!(Brief::default().summary(), "");
    }
}
