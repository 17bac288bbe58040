//! Component constructor documents on disk.
//!
//! Layout: `<apps-dir>/<app-id>/<document-file-name>`. The directory name is
//! the app id.
use crate::document::{Document, DocumentIssue};
use crate::model::ComponentTarget;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A document file and the app it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredDocument {
    pub app_id: String,
    pub path: PathBuf,
}

/// A stored document with its text and, when it parsed, its node model.
#[derive(Debug)]
pub struct LoadedDocument {
    pub stored: StoredDocument,
    pub text: String,
    pub parsed: std::result::Result<Document, DocumentIssue>,
}

impl LoadedDocument {
    /// The target the matcher sees; only documents that parsed contribute one.
    pub fn target(&self) -> Option<ComponentTarget> {
        self.parsed.as_ref().ok().map(|document| ComponentTarget {
            app_id: self.stored.app_id.clone(),
            entries: document.entries(),
        })
    }
}

/// App directories holding `file_name`, sorted by app id.
pub fn discover_documents(apps_dir: &Path, file_name: &str) -> Result<Vec<StoredDocument>> {
    if !apps_dir.is_dir() {
        return Err(anyhow!("apps dir {} is not a directory", apps_dir.display()));
    }
    let mut documents = Vec::new();
    for entry in
        fs::read_dir(apps_dir).with_context(|| format!("read {}", apps_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", apps_dir.display()))?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let path = dir.join(file_name);
        if !path.is_file() {
            tracing::debug!(dir = %dir.display(), "no component constructor");
            continue;
        }
        let Some(app_id) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(dir = %dir.display(), "skipping non UTF-8 app directory");
            continue;
        };
        documents.push(StoredDocument { app_id, path });
    }
    documents.sort();
    tracing::info!(documents = documents.len(), "component constructors discovered");
    Ok(documents)
}

/// Read and parse one document. Read errors fail the run; parse errors are
/// kept on the document so it can be reported as failed.
pub fn load_document(stored: StoredDocument) -> Result<LoadedDocument> {
    let text = fs::read_to_string(&stored.path)
        .with_context(|| format!("read {}", stored.path.display()))?;
    let parsed = Document::parse(&text);
    if let Err(issue) = &parsed {
        tracing::warn!(app = %stored.app_id, %issue, "component constructor did not parse");
    }
    Ok(LoadedDocument {
        stored,
        text,
        parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_app_directories_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for app in ["xwiki", "jitsi", "empty"] {
            fs::create_dir(dir.path().join(app)).expect("mkdir");
        }
        for app in ["xwiki", "jitsi"] {
            fs::write(
                dir.path().join(app).join("component-constructor.yaml"),
                "components: []\n",
            )
            .expect("write");
        }
        fs::write(dir.path().join("README.md"), "apps\n").expect("write");

        let documents =
            discover_documents(dir.path(), "component-constructor.yaml").expect("discover");
        let apps: Vec<&str> = documents.iter().map(|d| d.app_id.as_str()).collect();
        assert_eq!(apps, vec!["jitsi", "xwiki"]);
    }

    #[test]
    fn missing_apps_dir_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(discover_documents(&dir.path().join("absent"), "c.yaml").is_err());
    }

    #[test]
    fn unparseable_document_has_no_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("component-constructor.yaml");
        fs::write(&path, "components: [\n").expect("write");
        let loaded = load_document(StoredDocument {
            app_id: "broken".to_string(),
            path,
        })
        .expect("load");
        assert!(loaded.parsed.is_err());
        assert!(loaded.target().is_none());
    }
}
