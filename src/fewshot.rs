//! Few-shot Artifact
//!
//! Versioned demonstration set for the query generator. The file is checked once at load; a
//! mismatched version, unknown field, empty demonstration or wrong checksum rejects the artifact.

use crate::error::CopilotError;
use crate::retrieval::query_terms;
use crate::state::Intent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemonstrationInput {
    pub question: String,
    #[serde(default)]
    pub context: String,
}

/// One worked example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Demonstration {
    pub input: DemonstrationInput,
    pub expected_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FewShotArtifact {
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// blake3 hex digest of the serialized demonstrations
    #[serde(default)]
    pub checksum: Option<String>,
    pub demonstrations: Vec<Demonstration>,
}

impl FewShotArtifact {
    pub fn new(name: impl Into<String>, demonstrations: Vec<Demonstration>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.into(),
            created_at: Some(chrono::Utc::now()),
            checksum: None,
            demonstrations,
        }
    }

    /// Parse and validate artifact JSON.
    pub fn from_json(text: &str) -> Result<Self, CopilotError> {
        let artifact: FewShotArtifact = serde_json::from_str(text)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> Result<Self, CopilotError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CopilotError::ArtifactError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let artifact = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            name = %artifact.name,
            demonstrations = artifact.demonstrations.len(),
            "Loaded few-shot artifact"
        );
        Ok(artifact)
    }

    pub fn compute_checksum(&self) -> Result<String, CopilotError> {
        let canonical = serde_json::to_vec(&self.demonstrations)?;
        Ok(hex::encode(blake3::hash(&canonical).as_bytes()))
    }

    /// Fill in the checksum field from the current demonstrations.
    pub fn seal(mut self) -> Result<Self, CopilotError> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CopilotError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(CopilotError::ArtifactError(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }
        if self.name.trim().is_empty() {
            return Err(CopilotError::ArtifactError("name is empty".to_string()));
        }
        for (i, demo) in self.demonstrations.iter().enumerate() {
            if demo.input.question.trim().is_empty() {
                return Err(CopilotError::ArtifactError(format!(
                    "demonstration {} has an empty question",
                    i
                )));
            }
            if demo.expected_query.trim().is_empty() {
                return Err(CopilotError::ArtifactError(format!(
                    "demonstration {} has an empty expected_query",
                    i
                )));
            }
        }
        if let Some(expected) = &self.checksum {
            let actual = self.compute_checksum()?;
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(CopilotError::ArtifactError(format!(
                    "checksum mismatch: file says {}, demonstrations hash to {}",
                    expected, actual
                )));
            }
        }
        Ok(())
    }

    /// Up to `n` demonstrations ranked by shared terms with the question.
    ///
    /// Ties keep artifact order, so the selection is stable.
    pub fn select(&self, question: &str, n: usize) -> Vec<&Demonstration> {
        let wanted: BTreeSet<String> = query_terms(question, Intent::RagOnly).into_iter().collect();
        let mut ranked: Vec<(usize, &Demonstration)> = self
            .demonstrations
            .iter()
            .map(|demo| {
                let overlap = query_terms(&demo.input.question, Intent::RagOnly)
                    .into_iter()
                    .collect::<BTreeSet<_>>()
                    .intersection(&wanted)
                    .count();
                (overlap, demo)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        let selected: Vec<&Demonstration> = ranked.into_iter().take(n).map(|(_, d)| d).collect();
        debug!(requested = n, selected = selected.len(), "Selected demonstrations");
        selected
    }
}
