use crate::error::Result;
use std::path::{Path, PathBuf};

const EVAL_SET_SUFFIX: &str = ".evalset.json";
const EVAL_RESULT_SUFFIX: &str = ".evalresult.json";

/// Read-only view of eval sets and results stored on disk as
/// `<root>/<app_name>/<id>.evalset.json` and `<id>.evalresult.json`.
#[derive(Debug, Clone)]
pub struct EvalStore {
    root: PathBuf,
}

impl EvalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn list_eval_sets(&self, app_name: &str) -> Result<Vec<String>> {
        list_ids(&self.root.join(app_name), EVAL_SET_SUFFIX).await
    }

    pub async fn list_eval_results(&self, app_name: &str) -> Result<Vec<String>> {
        list_ids(&self.root.join(app_name), EVAL_RESULT_SUFFIX).await
    }
}

async fn list_ids(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(suffix))
            && !id.is_empty()
        {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_ids_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("multi-persona-agent");
        std::fs::create_dir_all(&app).unwrap();
        for name in ["b.evalset.json", "a.evalset.json", "run1.evalresult.json", "notes.txt"] {
            std::fs::write(app.join(name), "{}").unwrap();
        }

        let store = EvalStore::new(dir.path());
        assert_eq!(store.list_eval_sets("multi-persona-agent").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_eval_results("multi-persona-agent").await.unwrap(), vec!["run1"]);
    }

    #[tokio::test]
    async fn missing_app_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvalStore::new(dir.path());
        assert!(store.list_eval_sets("nobody").await.unwrap().is_empty());
    }
}
