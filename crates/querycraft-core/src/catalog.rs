use std::collections::HashSet;
use std::path::{Path, PathBuf};

use querycraft_types::{Difficulty, EvalCase, EvalSet};
use thiserror::Error;

use crate::config::is_json;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("duplicate eval id '{0}'")]
    DuplicateId(String),
    #[error("expected pass rate for {difficulty} must be within [0, 1], got {rate}")]
    InvalidRate { difficulty: Difficulty, rate: f64 },
}

/// Reads an eval set from a JSON (`.json`) or YAML document.
pub async fn load(path: impl AsRef<Path>) -> Result<EvalSet, CatalogError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse(path, &content)
}

pub fn parse(path: &Path, content: &str) -> Result<EvalSet, CatalogError> {
    let set: EvalSet = if is_json(path) {
        serde_json::from_str::<EvalSet>(content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str::<EvalSet>(content).map_err(|e| e.to_string())
    }
    .map_err(|message| CatalogError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    validate(&set)?;
    tracing::debug!(path = ?path, name = %set.name, cases = set.evals.len(), "loaded eval catalog");
    Ok(set)
}

fn validate(set: &EvalSet) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for case in &set.evals {
        if !seen.insert(case.id.as_str()) {
            return Err(CatalogError::DuplicateId(case.id.clone()));
        }
    }
    for (&difficulty, &rate) in &set.scoring.expected_pass_rates {
        if !(0.0..=1.0).contains(&rate) {
            return Err(CatalogError::InvalidRate { difficulty, rate });
        }
    }
    Ok(())
}

/// Narrows an eval set by difficulty and/or case id.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub difficulty: Option<Difficulty>,
    pub id: Option<String>,
}

impl CaseFilter {
    pub fn matches(&self, case: &EvalCase) -> bool {
        self.difficulty.map_or(true, |d| case.difficulty == d)
            && self.id.as_deref().map_or(true, |id| case.id == id)
    }

    /// Matching cases in catalog order. No match is an empty list, not an error.
    pub fn select<'a>(&self, set: &'a EvalSet) -> Vec<&'a EvalCase> {
        set.evals.iter().filter(|c| self.matches(c)).collect()
    }
}
