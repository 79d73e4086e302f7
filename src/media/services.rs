use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::users::repo_types::ImageSlot;

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

/// Stores `file` under the user's prefix and returns its public URL.
pub async fn upload_image(
    st: &AppState,
    user_id: Uuid,
    slot: ImageSlot,
    file: UploadFile,
) -> anyhow::Result<String> {
    anyhow::ensure!(!file.body.is_empty(), "empty upload");

    let key = object_key(user_id, slot, &file.content_type, file.file_name.as_deref());
    let size = file.body.len();
    st.storage
        .put_object(&key, file.body, &file.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    info!(%user_id, slot = slot.as_str(), %key, size, "image uploaded");
    Ok(st.storage.public_url(&key))
}

/// Removes a previously uploaded image. Failures are logged, never returned.
pub async fn discard_image(st: &AppState, url: &str) {
    let Some(key) = st.storage.key_for_url(url) else {
        return;
    };
    if let Err(e) = st.storage.delete_object(&key).await {
        warn!(error = %e, %key, "failed to delete stale image");
    }
}

fn object_key(user_id: Uuid, slot: ImageSlot, content_type: &str, file_name: Option<&str>) -> String {
    let ext = ext_from_mime(content_type)
        .or_else(|| file_name.and_then(ext_from_file_name))
        .unwrap_or("bin");
    format!("users/{}/{}-{}.{}", user_id, slot.as_str(), Uuid::new_v4(), ext)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn ext_from_file_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Some("jpg"),
        "png" => Some("png"),
        "webp" => Some("webp"),
        "gif" => Some("gif"),
        "heic" => Some("heic"),
        _ => None,
    }
}
