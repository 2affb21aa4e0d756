use crate::error::{AlignError, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "covphylo.json";
pub const DEFAULT_BASE_DIR: &str = "covid_phylo_data";
pub const DEFAULT_MAFFT_BIN: &str = "mafft";
pub const MAFFT_ENV_BIN: &str = "COVPHYLO_MAFFT_BIN";
pub const DEFAULT_IQTREE_BIN: &str = "iqtree";
pub const IQTREE_ENV_BIN: &str = "COVPHYLO_IQTREE_BIN";
pub const DEFAULT_SELECTIONS_FILE: &str = "selections.json";

pub fn default_log_filter() -> &'static str {
    "covphylo=info"
}

/// Directory layout and external tool settings for one pipeline installation.
///
/// Every directory defaults to a child of `base_dir`; set one explicitly to
/// move it elsewhere. Ledgers live next to the alignments unless
/// `ledger_dir` says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub fasta_dir: Option<PathBuf>,
    pub ledger_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub tree_dir: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub selections_path: Option<PathBuf>,
    pub mafft_executable: Option<String>,
    pub mafft_extra_args: Vec<String>,
    pub iqtree_executable: Option<String>,
    pub aligner_timeout_secs: Option<u64>,
    pub tree_timeout_secs: Option<u64>,
    pub parallel_selections: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_base_dir(DEFAULT_BASE_DIR)
    }
}

impl PipelineConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fasta_dir: None,
            ledger_dir: None,
            cache_dir: None,
            tree_dir: None,
            media_dir: None,
            selections_path: None,
            mafft_executable: None,
            mafft_extra_args: vec![],
            iqtree_executable: None,
            aligner_timeout_secs: None,
            tree_timeout_secs: None,
            parallel_selections: false,
        }
    }

    /// Reads a JSON config. Relative paths are taken relative to the file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AlignError::Config(format!("Could not read config '{}': {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&text).map_err(|e| {
            AlignError::Config(format!("Could not parse config '{}': {e}", path.display()))
        })?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_relative_to(&base);
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else `covphylo.json` in the working directory
    /// if present, else the defaults. Tool env overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_json_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_json_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Fills unset executables from `COVPHYLO_MAFFT_BIN` / `COVPHYLO_IQTREE_BIN`.
    pub fn apply_env_overrides(&mut self) {
        if self.mafft_executable.is_none() {
            self.mafft_executable = env_non_empty(MAFFT_ENV_BIN);
        }
        if self.iqtree_executable.is_none() {
            self.iqtree_executable = env_non_empty(IQTREE_ENV_BIN);
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.base_dir);
        for p in [
            &mut self.fasta_dir,
            &mut self.ledger_dir,
            &mut self.cache_dir,
            &mut self.tree_dir,
            &mut self.media_dir,
            &mut self.selections_path,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(AlignError::Config("base_dir must not be empty".to_string()));
        }
        if self.aligner_timeout_secs == Some(0) {
            return Err(AlignError::Config(
                "aligner_timeout_secs must be positive when set".to_string(),
            ));
        }
        if self.tree_timeout_secs == Some(0) {
            return Err(AlignError::Config(
                "tree_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fasta_dir(&self) -> PathBuf {
        self.fasta_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("fasta"))
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.ledger_dir.clone().unwrap_or_else(|| self.fasta_dir())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("cache"))
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.tree_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("tree"))
    }

    pub fn media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("media"))
    }

    pub fn selections_path(&self) -> PathBuf {
        self.selections_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_SELECTIONS_FILE))
    }

    pub fn mafft_executable(&self) -> String {
        self.mafft_executable
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_MAFFT_BIN)
            .to_string()
    }

    pub fn iqtree_executable(&self) -> String {
        self.iqtree_executable
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IQTREE_BIN)
            .to_string()
    }

    pub fn aligner_timeout(&self) -> Option<Duration> {
        self.aligner_timeout_secs.map(Duration::from_secs)
    }

    pub fn tree_timeout(&self) -> Option<Duration> {
        self.tree_timeout_secs.map(Duration::from_secs)
    }

    /// Creates every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.fasta_dir(),
            self.ledger_dir(),
            self.cache_dir(),
            self.tree_dir(),
            self.media_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| AlignError::artifact_io(&dir, e))?;
        }
        Ok(())
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
