//! Image uploads for product photos and profile pictures.

use std::path::Path;

use axum::{body::Bytes, extract::multipart::Field};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Read a multipart file field, rejecting non-images and oversized files.
pub async fn read_image(field: Field<'_>) -> AppResult<UploadedImage> {
    let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
    if extension_for(&content_type).is_none() {
        return Err(AppError::BadRequest(
            "Only JPEG, PNG, WebP and GIF images are allowed".into(),
        ));
    }
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;

    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".into()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest("Image must be 5 MB or smaller".into()));
    }

    Ok(UploadedImage {
        file_name,
        content_type,
        bytes,
    })
}

/// Keep ASCII letters, digits, dots, dashes and underscores; drop any path.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Write `image` into `dir` under a unique name and return that name.
pub async fn save_image(dir: &Path, image: &UploadedImage) -> AppResult<String> {
    let extension = extension_for(&image.content_type).unwrap_or("bin");
    let stem = sanitize_file_name(&image.file_name);
    let stem = stem
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or(stem);
    let stored = format!("{}-{}.{}", Uuid::new_v4().simple(), stem, extension);

    tokio::fs::create_dir_all(dir).await.map_err(AppError::internal)?;
    tokio::fs::write(dir.join(&stored), &image.bytes)
        .await
        .map_err(AppError::internal)?;
    tracing::info!(file = %stored, bytes = image.bytes.len(), "image stored");
    Ok(stored)
}

/// Best-effort removal of a previously stored upload.
pub async fn remove_file(dir: &Path, name: &str) {
    let name = sanitize_file_name(name);
    if let Err(err) = tokio::fs::remove_file(dir.join(&name)).await {
        tracing::warn!(error = %err, file = %name, "failed to remove stored image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_image_types_have_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("application/pdf"), None);
    }

    #[test]
    fn sanitized_names_cannot_escape_the_directory() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..\\ring photo.png"), "ring_photo.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn saved_images_land_in_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = UploadedImage {
            file_name: "gold ring.png".into(),
            content_type: "image/png".into(),
            bytes: Bytes::from_static(b"\x89PNG\r\n"),
        };
        let stored = save_image(dir.path(), &image).await.expect("save");
        assert!(stored.ends_with("-gold_ring.png"));
        assert!(dir.path().join(&stored).exists());

        remove_file(dir.path(), &stored).await;
        assert!(!dir.path().join(&stored).exists());
    }

    #[tokio::test]
    async fn same_named_uploads_never_overwrite_each_other() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upload = |bytes: &'static [u8]| UploadedImage {
            file_name: "photo.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: Bytes::from_static(bytes),
        };

        let first = save_image(dir.path(), &upload(b"first")).await.expect("save");
        let second = save_image(dir.path(), &upload(b"second")).await.expect("save");
        assert_ne!(first, second);
        assert_eq!(std::fs::read(dir.path().join(&first)).expect("read"), b"first");
        assert_eq!(std::fs::read(dir.path().join(&second)).expect("read"), b"second");
    }
}
