use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::cache::EntityCache;
use crate::error::{StoreError, StoreResult};
use crate::model::FileRecord;
use crate::remote::{self, DocId, FILES, RemoteStore};

/// File content read off disk, ready to persist. Reading happens before any
/// store call so a slow disk never holds a remote mutation open.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                StoreError::Validation(format!("not a usable file name: {}", path.display()))
            })?
            .to_string();
        let bytes = fs::read(path)
            .map_err(|err| StoreError::Validation(format!("failed to read {}: {err}", path.display())))?;
        let mime_type = mime_from_name(&name).to_string();
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }
}

pub struct FileStore {
    store: Arc<dyn RemoteStore>,
    cache: EntityCache<FileRecord>,
}

impl FileStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let cache = EntityCache::new(Arc::clone(&store), FILES);
        Self { store, cache }
    }

    pub fn start(&mut self) -> StoreResult<()> {
        self.cache.start()
    }

    pub fn stop(&mut self) {
        self.cache.stop()
    }

    pub fn on_change(&self, listener: impl Fn(&[FileRecord]) + Send + Sync + 'static) {
        self.cache.on_change(listener)
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.cache.snapshot()
    }

    /// Persists an upload. A record already holding `(category_name, name)`
    /// is replaced: its version carries over incremented, the old record is
    /// deleted and a fresh one created under a new id. The two steps are not
    /// atomic: a crash between them leaves no record for that name until
    /// the next successful upload. Returns the stored version.
    #[instrument(skip(self, upload), fields(name = %upload.name))]
    pub fn upload(&self, category_name: &str, upload: FileUpload) -> StoreResult<u32> {
        if upload.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "file name must not be empty".to_string(),
            ));
        }

        // Point query against the store: the cache may trail a concurrent
        // upload of the same name.
        let existing = self
            .store
            .list(FILES)?
            .into_iter()
            .filter_map(|doc| remote::from_doc::<FileRecord>(&doc).ok())
            .find(|record| record.category_name == category_name && record.name == upload.name);

        let version = match &existing {
            Some(old) => old.version + 1,
            None => 1,
        };

        if let Some(old) = existing {
            self.store.delete(FILES, &old.id)?;
        }

        let record = FileRecord {
            id: DocId::default(),
            category_name: category_name.to_string(),
            name: upload.name.clone(),
            content: encode_data_uri(&upload.mime_type, &upload.bytes),
            date: Utc::now(),
            version,
            size: upload.bytes.len() as u64,
            mime_type: upload.mime_type,
        };
        self.store.create(FILES, remote::to_fields(&record)?)?;

        info!(category = category_name, name = %record.name, version, "stored file");
        Ok(version)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &DocId) -> StoreResult<()> {
        self.store.delete(FILES, id)
    }

    /// Partition of the live cache by category name. Purely computed, never
    /// stored.
    pub fn by_category(&self) -> BTreeMap<String, Vec<FileRecord>> {
        let mut grouped: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
        for record in self.cache.snapshot() {
            grouped
                .entry(record.category_name.clone())
                .or_default()
                .push(record);
        }
        grouped
    }

    pub fn find(&self, category_name: &str, name: &str) -> Option<FileRecord> {
        self.cache
            .snapshot()
            .into_iter()
            .find(|record| record.category_name == category_name && record.name == name)
    }
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

pub fn decode_data_uri(uri: &str) -> StoreResult<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StoreError::Validation("not a data URI".to_string()))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| StoreError::Validation("data URI is not base64-encoded".to_string()))?;
    let bytes = STANDARD.decode(payload).map_err(|err| {
        warn!(error = %err, "corrupt data URI payload");
        StoreError::Validation(format!("corrupt data URI payload: {err}"))
    })?;
    Ok((mime_type.to_string(), bytes))
}

pub fn mime_from_name(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_embeds_mime_and_payload() {
        let uri = encode_data_uri("text/plain", b"seating chart");
        assert!(uri.starts_with("data:text/plain;base64,"));

        let (mime_type, bytes) = decode_data_uri(&uri).expect("decode");
        assert_eq!(mime_type, "text/plain");
        assert_eq!(bytes, b"seating chart");
    }

    #[test]
    fn decode_rejects_non_data_uris() {
        assert!(decode_data_uri("https://example.com/x.pdf").is_err());
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn mime_is_guessed_from_the_extension() {
        assert_eq!(mime_from_name("schedule.pdf"), "application/pdf");
        assert_eq!(mime_from_name("席次表.XLSX"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
        assert_eq!(mime_from_name("unknown.bin"), "application/octet-stream");
    }
}
