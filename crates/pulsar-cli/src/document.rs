//! Loading documents from disk into a notebook.

use std::path::{Path, PathBuf};

use pulsar_core::lang::script::ScriptLanguage;
use pulsar_core::{CellId, DocumentSync, EngineConfig, ExecutionPolicy, Notebook, apply_changes};

pub type ScriptNotebook = Notebook<ScriptLanguage>;

/// Build the engine configuration from CLI flags.
pub fn load_config(config_path: Option<&str>, parallel: bool) -> anyhow::Result<EngineConfig> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if parallel {
        config = config.with_policy(ExecutionPolicy::Parallel);
    }
    Ok(config)
}

/// A document file and the notebook built from it.
pub struct OpenDocument {
    pub path: PathBuf,
    pub notebook: ScriptNotebook,
    sync: DocumentSync,
}

impl OpenDocument {
    /// Read and analyze a document. Nothing runs yet.
    pub fn open(path: &str, config: EngineConfig) -> anyhow::Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            anyhow::bail!("Document not found: {}", path.display());
        }
        let text = std::fs::read_to_string(path)?;

        let mut sync = DocumentSync::new();
        let cells = sync.initial(&text)?;
        let mut notebook = Notebook::new(ScriptLanguage, config)?;
        for (position, (id, source)) in cells.into_iter().enumerate() {
            notebook.insert_cell(id, source, position)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            notebook,
            sync,
        })
    }

    /// Re-read the file and apply what changed. Returns the number of changes.
    pub fn reload(&mut self) -> anyhow::Result<usize> {
        let text = std::fs::read_to_string(&self.path)?;
        let changes = self.sync.diff(&text)?;
        let count = changes.len();
        apply_changes(&mut self.notebook, changes)?;
        Ok(count)
    }

    pub fn label(&self, id: CellId) -> String {
        self.sync
            .label(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}
