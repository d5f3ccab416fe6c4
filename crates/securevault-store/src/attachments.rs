//! Document and policy attachments.
//!
//! Files are validated locally (MIME allowlist, 10 MB cap), stored under
//! `{name1}/{name1}-{name2}-{timestamp}.{ext}` in the kind's bucket, and
//! referenced from records by their public URL. Deletion works backwards
//! from that URL.

use std::path::Path;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::backend::ObjectStorage;
use crate::error::{StoreError, StoreResult};

/// Upload size limit in bytes.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Accepted content types.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["application/pdf", "image/jpeg", "image/png", "image/webp"];

/// Storage bucket for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// General document files.
    Documents,
    /// Insurance policy documents.
    Policy,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Policy => "policy",
        }
    }
}

/// A file ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Read a local file, inferring the content type from its extension.
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidAttachment {
                reason: format!("{} has no usable file name", path.display()),
            })?
            .to_string();
        let content_type = content_type_for(&file_name)
            .ok_or_else(|| StoreError::InvalidAttachment {
                reason: "Please upload a PDF, JPEG, PNG, or WEBP file".to_string(),
            })?
            .to_string();
        let bytes = std::fs::read(path)?;
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Check the content type and size.
    pub fn validate(&self) -> StoreResult<()> {
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(StoreError::InvalidAttachment {
                reason: "Please upload a PDF, JPEG, PNG, or WEBP file".to_string(),
            });
        }
        if self.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(StoreError::InvalidAttachment {
                reason: "File size must be less than 10MB".to_string(),
            });
        }
        Ok(())
    }

    /// Everything after the last `.` (the whole name when there is none).
    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or(&self.file_name)
    }
}

/// Content type for a file name, if it is one of the accepted kinds.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Object path `{name1}/{name1}-{name2}-{timestamp}.{ext}`.
pub fn object_path(name1: &str, name2: &str, timestamp_ms: i64, extension: &str) -> String {
    format!("{name1}/{name1}-{name2}-{timestamp_ms}.{extension}")
}

/// Recover the object path from a public URL: the part after `{bucket}/`,
/// without any query string, percent-decoded.
pub fn object_path_from_url(url: &str, bucket: Bucket) -> Option<String> {
    let marker = format!("{}/", bucket.as_str());
    let start = url.find(&marker)? + marker.len();
    let rest = &url[start..];
    let rest = rest.split('?').next().unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(percent_decode_str(rest).decode_utf8_lossy().into_owned())
}

/// Uploads and deletes attachments through an [`ObjectStorage`].
#[derive(Clone)]
pub struct AttachmentStore {
    storage: Arc<dyn ObjectStorage>,
}

impl AttachmentStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Upload a general-document file. Returns its public URL.
    pub async fn upload_document(
        &self,
        file: Attachment,
        document_name: &str,
        account_owner: &str,
    ) -> StoreResult<String> {
        self.upload(Bucket::Documents, file, document_name, account_owner)
            .await
    }

    /// Upload an insurance-policy file. Returns its public URL.
    pub async fn upload_policy(
        &self,
        file: Attachment,
        policy_name: &str,
        policy_number: &str,
    ) -> StoreResult<String> {
        self.upload(Bucket::Policy, file, policy_name, policy_number)
            .await
    }

    /// Delete the object behind a public URL.
    pub async fn delete(&self, bucket: Bucket, public_url: &str) -> StoreResult<()> {
        let path =
            object_path_from_url(public_url, bucket).ok_or_else(|| StoreError::InvalidAttachment {
                reason: format!("Invalid file URL: {public_url}"),
            })?;
        self.storage.remove(bucket.as_str(), &[path]).await?;
        tracing::info!(bucket = bucket.as_str(), "attachment deleted");
        Ok(())
    }

    async fn upload(
        &self,
        bucket: Bucket,
        file: Attachment,
        name1: &str,
        name2: &str,
    ) -> StoreResult<String> {
        file.validate()?;
        let path = object_path(
            name1,
            name2,
            chrono::Utc::now().timestamp_millis(),
            file.extension(),
        );
        let content_type = file.content_type.clone();
        self.storage
            .upload(bucket.as_str(), &path, file.bytes, &content_type)
            .await?;
        let url = self.storage.public_url(bucket.as_str(), &path)?;
        tracing::info!(bucket = bucket.as_str(), "attachment uploaded");
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStorage {
        uploads: Mutex<Vec<(String, String, usize, String)>>,
        removed: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait::async_trait]
    impl ObjectStorage for FakeStorage {
        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> StoreResult<()> {
            self.uploads.lock().unwrap().push((
                bucket.into(),
                path.into(),
                bytes.len(),
                content_type.into(),
            ));
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> StoreResult<String> {
            Ok(format!("https://cdn.test/storage/v1/object/public/{bucket}/{path}"))
        }

        async fn remove(&self, bucket: &str, paths: &[String]) -> StoreResult<()> {
            self.removed
                .lock()
                .unwrap()
                .push((bucket.into(), paths.to_vec()));
            Ok(())
        }
    }

    fn pdf(size: usize) -> Attachment {
        Attachment {
            file_name: "scan.final.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn validation_rules() {
        pdf(1024).validate().unwrap();
        pdf(MAX_ATTACHMENT_BYTES).validate().unwrap();
        assert!(pdf(MAX_ATTACHMENT_BYTES + 1).validate().is_err());

        let gif = Attachment {
            content_type: "image/gif".into(),
            ..pdf(10)
        };
        assert!(matches!(
            gif.validate(),
            Err(StoreError::InvalidAttachment { .. })
        ));
    }

    #[test]
    fn extension_and_content_type() {
        assert_eq!(pdf(1).extension(), "pdf");
        let bare = Attachment {
            file_name: "README".into(),
            ..pdf(1)
        };
        assert_eq!(bare.extension(), "README");
        assert_eq!(content_type_for("photo.JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for("a.webp"), Some("image/webp"));
        assert_eq!(content_type_for("a.docx"), None);
    }

    #[test]
    fn object_paths() {
        assert_eq!(
            object_path("Passport", "Asha", 1700000000000, "pdf"),
            "Passport/Passport-Asha-1700000000000.pdf"
        );
    }

    #[test]
    fn path_from_public_url() {
        let url = "https://x.supabase.co/storage/v1/object/public/documents/Asha%20K/Asha%20K-PAN-1.pdf?t=1";
        assert_eq!(
            object_path_from_url(url, Bucket::Documents).as_deref(),
            Some("Asha K/Asha K-PAN-1.pdf")
        );
        assert_eq!(object_path_from_url(url, Bucket::Policy), None);
        assert_eq!(
            object_path_from_url("https://x/public/policy/", Bucket::Policy),
            None
        );
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        let file = Attachment::from_path(&path).unwrap();
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes, b"png-bytes");

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"x").unwrap();
        assert!(Attachment::from_path(&txt).is_err());
    }

    #[tokio::test]
    async fn upload_and_delete_round_trip() {
        let storage = Arc::new(FakeStorage::default());
        let store = AttachmentStore::new(storage.clone());

        let url = store.upload_policy(pdf(2048), "Jeevan", "P-1").await.unwrap();
        assert!(url.starts_with("https://cdn.test/storage/v1/object/public/policy/Jeevan/Jeevan-P-1-"));
        assert!(url.ends_with(".pdf"));

        let (bucket, path, size, content_type) = storage.uploads.lock().unwrap()[0].clone();
        assert_eq!(bucket, "policy");
        assert!(path.starts_with("Jeevan/Jeevan-P-1-"));
        assert_eq!(size, 2048);
        assert_eq!(content_type, "application/pdf");

        store.delete(Bucket::Policy, &url).await.unwrap();
        let removed = storage.removed.lock().unwrap().clone();
        assert_eq!(removed, vec![("policy".to_string(), vec![path])]);
    }

    #[tokio::test]
    async fn invalid_files_never_reach_storage() {
        let storage = Arc::new(FakeStorage::default());
        let store = AttachmentStore::new(storage.clone());

        let err = store
            .upload_document(pdf(MAX_ATTACHMENT_BYTES + 1), "PAN", "Asha")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid attachment: File size must be less than 10MB");
        assert!(storage.uploads.lock().unwrap().is_empty());

        assert!(store.delete(Bucket::Documents, "https://x/other/a.pdf").await.is_err());
    }
}
