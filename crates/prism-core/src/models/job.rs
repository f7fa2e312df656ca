use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::fingerprint::fingerprint;
use crate::models::TransformationSpec;

/// Queue message asking a worker to produce one variant.
///
/// Only `image_id` and `spec` are required on decode; unknown fields are ignored.
/// `job_id` and `owner_id` are opaque tokens chosen by the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformJob {
    #[serde(default)]
    pub job_id: String,
    pub image_id: Uuid,
    #[serde(default)]
    pub owner_id: String,
    pub spec: TransformationSpec,
    #[serde(default)]
    pub spec_hash: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl TransformJob {
    pub fn new(
        image_id: Uuid,
        owner_id: impl Into<String>,
        spec: TransformationSpec,
        spec_hash: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            image_id,
            owner_id: owner_id.into(),
            spec,
            spec_hash: spec_hash.into(),
            created_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AppError> {
        serde_json::to_vec(self)
            .map_err(|e| AppError::Internal(format!("Failed to encode transform job: {}", e)))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(payload).map_err(|e| AppError::Decode(e.to_string()))
    }

    /// Fingerprint to deduplicate on.
    ///
    /// An empty `spec_hash` is recomputed from the spec. A non-empty one must match
    /// the spec, otherwise the job could never land under a consistent key.
    pub fn resolved_spec_hash(&self) -> Result<String, AppError> {
        let computed = fingerprint(&self.spec)?;
        if self.spec_hash.is_empty() {
            return Ok(computed);
        }
        if self.spec_hash != computed {
            return Err(AppError::InvalidRequest(format!(
                "Job {} carries spec_hash {} but its spec hashes to {}",
                self.job_id, self.spec_hash, computed
            )));
        }
        Ok(computed)
    }
}
