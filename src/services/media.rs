use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::AttachmentRef;

const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Attachment payload as sent by the client: base64 data, optionally as a
/// data URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: String,
}

/// Opaque media capability: store a blob, hand back a stable reference,
/// delete by reference.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, upload: &AttachmentUpload) -> AppResult<AttachmentRef>;
    async fn delete(&self, attachment: &AttachmentRef) -> AppResult<()>;
}

pub struct S3MediaStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaStore {
    pub async fn from_env(config: &Config) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket: config.media_bucket.clone(),
            public_base_url: config.media_base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn decode_payload(upload: &AttachmentUpload) -> AppResult<Vec<u8>> {
    // Accept both raw base64 and "data:<mime>;base64,<payload>" URIs.
    let raw = upload
        .data
        .split_once(',')
        .map(|(_, body)| body)
        .unwrap_or(&upload.data);
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| AppError::Media(format!("invalid attachment payload: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::Media("empty attachment payload".into()));
    }
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(AppError::Media("attachment too large".into()));
    }
    Ok(bytes)
}

fn object_key(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("chat/{}/{}", Uuid::new_v4(), safe)
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(&self, upload: &AttachmentUpload) -> AppResult<AttachmentRef> {
        let bytes = decode_payload(upload)?;
        let key = object_key(&upload.file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .set_content_type(upload.content_type.clone())
            .send()
            .await
            .map_err(|e| AppError::Media(format!("upload {key}: {e}")))?;

        Ok(AttachmentRef {
            url: format!("{}/{}", self.public_base_url, key),
            content_type: upload.content_type.clone(),
            key,
        })
    }

    async fn delete(&self, attachment: &AttachmentRef) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&attachment.key)
            .send()
            .await
            .map_err(|e| AppError::Media(format!("delete {}: {e}", attachment.key)))?;
        Ok(())
    }
}

/// Recording media store for tests, with injectable upload failure.
#[derive(Default)]
pub struct MemoryMediaStore {
    uploads: Mutex<Vec<AttachmentRef>>,
    deleted: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn upload(&self, upload: &AttachmentUpload) -> AppResult<AttachmentRef> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Media("upload refused".into()));
        }
        let key = object_key(&upload.file_name);
        let attachment = AttachmentRef {
            url: format!("memory://{key}"),
            content_type: upload.content_type.clone(),
            key,
        };
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attachment.clone());
        Ok(attachment)
    }

    async fn delete(&self, attachment: &AttachmentRef) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Media("delete refused".into()));
        }
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attachment.key.clone());
        Ok(())
    }
}
