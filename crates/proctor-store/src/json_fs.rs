//! Filesystem-backed collaborators.
//!
//! [`JsonReportStore`] writes one pretty-printed JSON file per attempt under
//! `<root>/<test>/<user>/<start-millis>.json`. [`DefinitionDirectory`] serves
//! TOML test definitions from a directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use proctor_core::error::StoreError;
use proctor_core::model::TestDefinition;
use proctor_core::parser;
use proctor_core::report::{AttemptKey, TestResultSummary};
use proctor_core::traits::{DefinitionProvider, ReportSink};

/// Stores graded results as JSON files.
#[derive(Debug, Clone)]
pub struct JsonReportStore {
    root: PathBuf,
}

impl JsonReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the result for `key` lives.
    pub fn path_for(&self, key: &AttemptKey) -> PathBuf {
        self.root
            .join(path_component(&key.test_code))
            .join(path_component(&key.user_id))
            .join(format!("{}.json", key.started_at.timestamp_millis()))
    }

    async fn read(&self, path: &Path) -> Result<Option<TestResultSummary>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ReportSink for JsonReportStore {
    async fn put(&self, key: &AttemptKey, summary: &TestResultSummary) -> Result<(), StoreError> {
        let path = self.path_for(key);

        if let Some(existing) = self.read(&path).await? {
            if &existing == summary {
                tracing::debug!(path = %path.display(), "result already stored");
                return Ok(());
            }
            return Err(StoreError::Conflict {
                key: key.storage_key(),
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(summary)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), "result written");
        Ok(())
    }

    async fn get(&self, key: &AttemptKey) -> Result<Option<TestResultSummary>, StoreError> {
        self.read(&self.path_for(key)).await
    }
}

/// Encode a key part so it is a single, safe path component.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`.
fn path_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

/// Serves test definitions from TOML files in a directory.
///
/// `fetch(code)` first tries `<dir>/<code>.toml`, then falls back to
/// scanning the directory for a definition declaring that code.
#[derive(Debug, Clone)]
pub struct DefinitionDirectory {
    dir: PathBuf,
}

impl DefinitionDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DefinitionProvider for DefinitionDirectory {
    async fn fetch(&self, test_code: &str) -> Result<Option<TestDefinition>, StoreError> {
        if !self.dir.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "definitions directory not found: {}",
                self.dir.display()
            )));
        }

        let direct = self.dir.join(format!("{test_code}.toml"));
        let is_plain_name = !test_code.is_empty()
            && !test_code.contains(['/', '\\'])
            && test_code != "."
            && test_code != "..";
        if is_plain_name {
            match tokio::fs::read_to_string(&direct).await {
                Ok(content) => {
                    let definition = parser::parse_definition_str(&content, &direct)
                        .map_err(|e| StoreError::InvalidDefinition(format!("{e:#}")))?;
                    if definition.code == test_code {
                        return Ok(Some(definition));
                    }
                    tracing::warn!(
                        path = %direct.display(),
                        declared = %definition.code,
                        "file name does not match the declared test code"
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let dir = self.dir.clone();
        let definitions = tokio::task::spawn_blocking(move || parser::load_definition_directory(&dir))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;

        Ok(definitions.into_iter().find(|d| d.code == test_code))
    }
}
