//! Shared key generation for storage backends.

use crate::traits::{StorageError, StorageResult};
use std::path::{Component, Path};
use uuid::Uuid;

/// Key of an uploaded original: `users/{owner_id}/images/{image_id}/original`
pub fn original_key(owner_id: Uuid, image_id: Uuid) -> String {
    format!("users/{}/images/{}/original", owner_id, image_id)
}

/// Key of a variant: `variants/{image_id}/{spec_hash}{ext}`
pub fn variant_key(image_id: Uuid, spec_hash: &str, mime_type: &str) -> String {
    format!(
        "variants/{}/{}{}",
        image_id,
        spec_hash,
        extension_for_mime(mime_type)
    )
}

/// File extension (with the dot) for a variant MIME type; unknown types get none
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => "",
    }
}

/// Reject keys that are empty, absolute or escape the storage root
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key must be relative: {}",
            key
        )));
    }
    let all_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid path segments: {}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_key_is_namespaced_by_owner_and_image() {
        let owner = Uuid::parse_str("6f1c2a34-0000-4000-8000-000000000001").unwrap();
        let image = Uuid::parse_str("6f1c2a34-0000-4000-8000-000000000002").unwrap();
        assert_eq!(
            original_key(owner, image),
            "users/6f1c2a34-0000-4000-8000-000000000001/images/6f1c2a34-0000-4000-8000-000000000002/original"
        );
    }

    #[test]
    fn variant_key_uses_mime_extension() {
        let image = Uuid::parse_str("6f1c2a34-0000-4000-8000-000000000002").unwrap();
        assert_eq!(
            variant_key(image, "abc123", "image/webp"),
            "variants/6f1c2a34-0000-4000-8000-000000000002/abc123.webp"
        );
        assert_eq!(
            variant_key(image, "abc123", "image/tiff"),
            "variants/6f1c2a34-0000-4000-8000-000000000002/abc123"
        );
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for_mime("image/jpeg"), ".jpg");
        assert_eq!(extension_for_mime("image/png"), ".png");
        assert_eq!(extension_for_mime("image/webp"), ".webp");
        assert_eq!(extension_for_mime("image/gif"), ".gif");
        assert_eq!(extension_for_mime("application/octet-stream"), "");
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("variants/a/b.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("variants/../../etc").is_err());
        assert!(validate_key("./variants").is_err());
    }
}
