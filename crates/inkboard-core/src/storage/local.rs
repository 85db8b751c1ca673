//! Browser `localStorage` backend for WebAssembly.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use wasm_bindgen::JsValue;

/// Storage backed by `window.localStorage`.
///
/// Note: This is intentionally not Send/Sync since WASM is single-threaded
/// and DOM handles are not thread-safe.
pub struct LocalStorage {
    inner: web_sys::Storage,
}

impl LocalStorage {
    /// Open the page's local storage.
    pub fn new() -> StorageResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("No window object".to_string()))?;
        let inner = window
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))?
            .ok_or_else(|| StorageError::Unavailable("localStorage not available".to_string()))?;
        Ok(Self { inner })
    }
}

/// Browsers report a full store as a `QuotaExceededError` DOMException.
fn write_error(e: JsValue) -> StorageError {
    let text = format!("{:?}", e);
    if text.contains("QuotaExceeded") {
        StorageError::QuotaExceeded(text)
    } else {
        StorageError::Other(text)
    }
}

impl Storage for LocalStorage {
    fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<String>>> {
        let result = self
            .inner
            .get_item(key)
            .map_err(|e| StorageError::Other(format!("{:?}", e)));
        Box::pin(async move { result })
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, StorageResult<()>> {
        let result = self.inner.set_item(key, value).map_err(write_error);
        Box::pin(async move { result })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let result = self
            .inner
            .remove_item(key)
            .map_err(|e| StorageError::Other(format!("{:?}", e)));
        Box::pin(async move { result })
    }
}
