//! Transformation fingerprint
//!
//! A fingerprint is the lowercase hex SHA-256 of a spec's canonical JSON. It is
//! structural: any field change, including ones that do not affect pixels,
//! yields a different fingerprint.

use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::TransformationSpec;

pub fn fingerprint(spec: &TransformationSpec) -> Result<String, AppError> {
    let canonical = spec.canonical_json()?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}
