use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::revision::RevisionId;

/// Writes new revision scripts.
pub struct ScriptGenerator {
    /// Output directory for scripts.
    output_dir: PathBuf,
}

/// A generated script ready to be written.
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub id: RevisionId,
    pub path: PathBuf,
    pub content: String,
}

/// What the new script builds on.
#[derive(Debug, Clone, Default)]
pub struct NewRevision {
    pub message: String,
    /// Parent revisions; empty for a new root, several for a merge.
    pub parents: Vec<RevisionId>,
    pub branch_labels: Vec<String>,
    pub depends_on: Vec<RevisionId>,
}

impl ScriptGenerator {
    /// Create a new script generator.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render a script with a fresh id.
    pub fn generate(&self, new: &NewRevision) -> GeneratedScript {
        self.generate_at(new, RevisionId::generate(), Utc::now())
    }

    /// Render a script with a given id and timestamp.
    pub fn generate_at(
        &self,
        new: &NewRevision,
        id: RevisionId,
        created: DateTime<Utc>,
    ) -> GeneratedScript {
        let slug = slugify(&new.message);
        let file_name = if slug.is_empty() {
            format!("{}.toml", id)
        } else {
            format!("{}_{}.toml", id, slug)
        };

        let parents = match new.parents.as_slice() {
            [] => "<base>".to_string(),
            many => many
                .iter()
                .map(RevisionId::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        };

        let mut content = format!(
            "# {}\n#\n# Revision ID: {}\n# Revises: {}\n# Create Date: {}\n\n",
            first_line(&new.message),
            id,
            parents,
            created.to_rfc3339()
        );

        content.push_str(&format!("revision = {}\n", quote(id.as_str())));
        match new.parents.as_slice() {
            [] => {}
            [one] => content.push_str(&format!("down_revision = {}\n", quote(one.as_str()))),
            many => content.push_str(&format!(
                "down_revision = {}\n",
                quote_list(many.iter().map(RevisionId::as_str))
            )),
        }
        if !new.branch_labels.is_empty() {
            content.push_str(&format!(
                "branch_labels = {}\n",
                quote_list(new.branch_labels.iter().map(String::as_str))
            ));
        }
        if !new.depends_on.is_empty() {
            content.push_str(&format!(
                "depends_on = {}\n",
                quote_list(new.depends_on.iter().map(RevisionId::as_str))
            ));
        }
        content.push_str(&format!("message = {}\n", quote(&new.message)));
        content.push_str(&format!(
            "created = {}\n",
            quote(&created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        ));

        content.push_str(
            "\n# Replace with [[upgrade]] / [[downgrade]] tables, e.g.\n\
             #\n\
             # [[upgrade]]\n\
             # op = \"add_column\"\n\
             # table = \"users\"\n\
             # column = { name = \"bio\", type = \"TEXT\" }\n\
             #\n\
             # [[downgrade]]\n\
             # op = \"drop_column\"\n\
             # table = \"users\"\n\
             # column = \"bio\"\n\
             upgrade = []\n\
             downgrade = []\n",
        );

        GeneratedScript {
            path: self.output_dir.join(file_name),
            id,
            content,
        }
    }

    /// Write a generated script, refusing to overwrite.
    pub fn write(&self, script: &GeneratedScript) -> Result<(), GeneratorError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| GeneratorError::Io(e.to_string()))?;

        if script.path.exists() {
            return Err(GeneratorError::AlreadyExists(script.path.clone()));
        }

        std::fs::write(&script.path, &script.content)
            .map_err(|e| GeneratorError::Io(e.to_string()))?;
        Ok(())
    }
}

fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn quote_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = items.map(quote).collect();
    format!("[{}]", quoted.join(", "))
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

/// File-name friendly form of a message.
fn slugify(message: &str) -> String {
    let mut slug = String::new();
    for c in first_line(message).chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    slug.chars().take(40).collect::<String>().trim_end_matches('_').to_string()
}

/// Script generator error.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("script already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::loader::parse_script;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 10, 15, 0).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add company links to users"), "add_company_links_to_users");
        assert_eq!(slugify("  status -> enum!  "), "status_enum");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_generated_script_parses_back() {
        let generator = ScriptGenerator::new("migrations/versions");
        let new = NewRevision {
            message: "add \"bio\" to profiles".into(),
            parents: vec![RevisionId::new("8b4e6d2f0a31")],
            branch_labels: vec!["profiles".into()],
            depends_on: vec![],
        };
        let generated = generator.generate_at(&new, RevisionId::new("c0ffee123456"), fixed_time());

        assert_eq!(
            generated.path,
            PathBuf::from("migrations/versions/c0ffee123456_add_bio_to_profiles.toml")
        );

        let script = parse_script(&generated.content, "generated").unwrap();
        assert_eq!(script.id().as_str(), "c0ffee123456");
        assert_eq!(script.revision.down_revisions, vec![RevisionId::new("8b4e6d2f0a31")]);
        assert_eq!(script.revision.branch_labels, vec!["profiles".to_string()]);
        assert_eq!(script.revision.message, "add \"bio\" to profiles");
        assert_eq!(script.revision.created, Some(fixed_time()));
        assert!(script.upgrade.is_empty());
    }

    #[test]
    fn test_merge_script_lists_parents() {
        let generator = ScriptGenerator::new("v");
        let new = NewRevision {
            message: "merge heads".into(),
            parents: vec![RevisionId::new("b3"), RevisionId::new("c2")],
            ..Default::default()
        };
        let generated = generator.generate_at(&new, RevisionId::new("m4"), fixed_time());
        assert!(generated.content.contains("down_revision = [\"b3\", \"c2\"]"));
        assert!(generated.content.contains("# Revises: b3, c2"));

        let script = parse_script(&generated.content, "merge").unwrap();
        assert!(script.revision.is_merge_point());
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let generator = ScriptGenerator::new(dir.path().join("versions"));
        let generated = generator.generate(&NewRevision {
            message: "initial".into(),
            ..Default::default()
        });

        generator.write(&generated).unwrap();
        assert!(generated.path.exists());
        assert!(matches!(
            generator.write(&generated),
            Err(GeneratorError::AlreadyExists(_))
        ));
    }
}
