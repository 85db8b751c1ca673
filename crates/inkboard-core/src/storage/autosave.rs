//! Auto-save of the local board view.
//!
//! Local mutations are saved right away; remote changes only mark the cache
//! dirty and are flushed by the periodic tick, which coalesces bursts.

use crate::board::{
    BoardSnapshot, NoteKind, StickyRecord, css_px, new_note_id, parse_css_px,
};
use crate::storage::{Storage, StorageError, StorageResult};
use crate::surface::Raster;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Periodic save interval.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(2);

/// Key holding the canvas raster.
pub const CANVAS_KEY: &str = "boardCanvas";

/// Key holding the sticky list (JSON array).
pub const STICKIES_KEY: &str = "stickies";

/// Position used when a cached sticky has no usable `left`/`top`.
const DEFAULT_STICKY_OFFSET: f64 = 100.0;

/// One sticky as laid out in the cache, positions as CSS lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSticky {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub left: String,
    #[serde(default)]
    pub top: String,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub minimized: bool,
}

impl From<&StickyRecord> for PersistedSticky {
    fn from(record: &StickyRecord) -> Self {
        Self {
            id: Some(record.id.clone()),
            kind: record.kind,
            content: record.content.clone(),
            left: css_px(record.x),
            top: css_px(record.y),
            width: record.w.map(css_px).unwrap_or_default(),
            height: record.h.map(css_px).unwrap_or_default(),
            minimized: record.minimized,
        }
    }
}

impl PersistedSticky {
    /// Rebuild the record. Entries cached without an id get a fresh one.
    pub fn into_record(self) -> StickyRecord {
        StickyRecord {
            id: self.id.unwrap_or_else(new_note_id),
            kind: self.kind,
            content: self.content,
            x: parse_css_px(&self.left).unwrap_or(DEFAULT_STICKY_OFFSET),
            y: parse_css_px(&self.top).unwrap_or(DEFAULT_STICKY_OFFSET),
            w: parse_css_px(&self.width),
            h: parse_css_px(&self.height),
            minimized: self.minimized,
        }
    }
}

/// The cached board: raster plus stickies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersistedBoard {
    pub canvas: Option<Raster>,
    pub stickies: Vec<PersistedSticky>,
}

impl PersistedBoard {
    pub fn from_snapshot(board: &BoardSnapshot) -> Self {
        Self {
            canvas: board.canvas_image.clone(),
            stickies: board.notes.iter().map(PersistedSticky::from).collect(),
        }
    }

    pub fn into_snapshot(self) -> BoardSnapshot {
        BoardSnapshot {
            canvas_image: self.canvas,
            notes: self.stickies.into_iter().map(PersistedSticky::into_record).collect(),
        }
    }
}

/// Manages automatic persistence of the local board.
pub struct AutoSaveManager<S: Storage> {
    /// Storage backend.
    storage: Arc<S>,
    /// Auto-save interval.
    interval: Duration,
    /// When the last save was attempted.
    last_save: Option<Instant>,
    /// Whether the board has unsaved changes.
    dirty: bool,
}

impl<S: Storage> AutoSaveManager<S> {
    /// Create a new auto-save manager with the given storage backend.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            interval: DEFAULT_AUTOSAVE_INTERVAL,
            last_save: None,
            dirty: false,
        }
    }

    /// Set the auto-save interval.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Get the auto-save interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the board as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Check if the board has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if enough time has passed for an auto-save.
    pub fn should_save(&self) -> bool {
        if !self.dirty {
            return false;
        }

        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Save the board if needed (dirty + interval elapsed).
    /// Returns true if save was performed.
    pub async fn maybe_save(&mut self, board: &BoardSnapshot) -> StorageResult<bool> {
        if !self.should_save() {
            return Ok(false);
        }

        self.save(board).await?;
        Ok(true)
    }

    /// Force save the board immediately.
    ///
    /// Both keys are written or neither is: if the sticky write fails the
    /// previous canvas entry is put back. A failed save still counts as an
    /// attempt for the interval, so the next periodic tick writes the newer
    /// board instead of repeating this one.
    pub async fn save(&mut self, board: &BoardSnapshot) -> StorageResult<()> {
        let result = self.write_both(board).await;
        self.last_save = Some(Instant::now());
        if result.is_ok() {
            self.dirty = false;
        }
        result
    }

    async fn write_both(&self, board: &BoardSnapshot) -> StorageResult<()> {
        let persisted = PersistedBoard::from_snapshot(board);
        let stickies = serde_json::to_string(&persisted.stickies)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let previous_canvas = self.storage.get(CANVAS_KEY).await?;
        self.write_canvas(persisted.canvas.as_ref().map(Raster::as_str)).await?;

        if let Err(e) = self.storage.set(STICKIES_KEY, &stickies).await {
            if let Err(undo) = self.write_canvas(previous_canvas.as_deref()).await {
                log::warn!("Failed to restore cached canvas: {}", undo);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write_canvas(&self, canvas: Option<&str>) -> StorageResult<()> {
        match canvas {
            Some(data_url) => self.storage.set(CANVAS_KEY, data_url).await,
            None => self.storage.remove(CANVAS_KEY).await,
        }
    }

    /// Read the cached board.
    ///
    /// Fails open: unreadable or corrupt entries are logged and replaced by
    /// an empty value so startup is never blocked.
    pub async fn load(&mut self) -> BoardSnapshot {
        let canvas = match self.storage.get(CANVAS_KEY).await {
            Ok(value) => value.filter(|v| !v.is_empty()).map(Raster::new),
            Err(e) => {
                log::warn!("Failed to read cached canvas: {}", e);
                None
            }
        };

        let stickies = match self.storage.get(STICKIES_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<PersistedSticky>>(&json) {
                Ok(stickies) => stickies,
                Err(e) => {
                    log::warn!("Ignoring corrupt sticky cache: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Failed to read cached stickies: {}", e);
                Vec::new()
            }
        };

        self.dirty = false;
        self.last_save = Some(Instant::now());

        PersistedBoard { canvas, stickies }.into_snapshot()
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

/// Create a platform-appropriate storage backend.
#[cfg(not(target_arch = "wasm32"))]
pub fn create_default_storage() -> StorageResult<Arc<crate::storage::FileStorage>> {
    Ok(Arc::new(crate::storage::FileStorage::default_location()?))
}

#[cfg(target_arch = "wasm32")]
pub fn create_default_storage() -> StorageResult<Arc<crate::storage::LocalStorage>> {
    Ok(Arc::new(crate::storage::LocalStorage::new()?))
}

/// Convenience type alias for platform-specific storage.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformStorage = crate::storage::FileStorage;

#[cfg(target_arch = "wasm32")]
pub type PlatformStorage = crate::storage::LocalStorage;

/// Type alias for the auto-save manager with platform-specific storage.
pub type PlatformAutoSaveManager = AutoSaveManager<PlatformStorage>;

/// Convenience function to create an auto-save manager with default storage.
pub fn create_autosave_manager() -> StorageResult<PlatformAutoSaveManager> {
    let storage = create_default_storage()?;
    Ok(AutoSaveManager::new(storage))
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::storage::{BoxFuture, MemoryStorage, block_on};

    /// Backend whose every call fails, like a full or disabled local storage.
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get(&self, _key: &str) -> BoxFuture<'_, StorageResult<Option<String>>> {
            Box::pin(async { Err(StorageError::Unavailable("disabled".into())) })
        }

        fn set(&self, _key: &str, _value: &str) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::QuotaExceeded("full".into())) })
        }

        fn remove(&self, _key: &str) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Unavailable("disabled".into())) })
        }
    }

    /// Accepts everything except sticky writes, like a quota hit on the
    /// larger of the two entries.
    #[derive(Default)]
    struct StickyQuotaStorage {
        inner: MemoryStorage,
    }

    impl Storage for StickyQuotaStorage {
        fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<String>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> BoxFuture<'_, StorageResult<()>> {
            if key == STICKIES_KEY {
                return Box::pin(async { Err(StorageError::QuotaExceeded("full".into())) });
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
            self.inner.remove(key)
        }
    }

    fn board() -> BoardSnapshot {
        let mut board = BoardSnapshot::new();
        board.canvas_image = Some(Raster::from_png(b"png"));
        let mut note = StickyRecord::note("hello", 120.0, 80.0);
        note.w = Some(200.0);
        note.minimized = true;
        board.add(note);
        board.add(StickyRecord::image("data:image/png;base64,AAAA", 5.0, 6.0));
        board
    }

    #[test]
    fn test_autosave_manager_creation() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = AutoSaveManager::new(storage);

        assert!(!manager.is_dirty());
        assert!(!manager.should_save());
        assert_eq!(manager.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_autosave_dirty_flag() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage);

        manager.mark_dirty();
        assert!(manager.is_dirty());
        // Should save when dirty and no previous save
        assert!(manager.should_save());
    }

    #[test]
    fn test_save_then_tick_coalesces() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage);

        block_on(manager.save(&board())).unwrap();
        manager.mark_dirty();
        // Interval has not elapsed yet.
        assert!(!block_on(manager.maybe_save(&board())).unwrap());

        manager.set_interval(Duration::ZERO);
        assert!(block_on(manager.maybe_save(&board())).unwrap());
        assert!(!manager.is_dirty());
    }

    #[test]
    fn test_save_and_load_restores_board() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage.clone());
        let saved = board();
        block_on(manager.save(&saved)).unwrap();

        let mut manager2 = AutoSaveManager::new(storage);
        let loaded = block_on(manager2.load());
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_saved_layout_uses_css_lengths() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage.clone());
        block_on(manager.save(&board())).unwrap();

        let json = block_on(storage.get(STICKIES_KEY)).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["type"], "note");
        assert_eq!(value[0]["left"], "120px");
        assert_eq!(value[0]["top"], "80px");
        assert_eq!(value[0]["width"], "200px");
        assert_eq!(value[0]["height"], "");
        assert_eq!(value[0]["minimized"], true);
        assert_eq!(value[1]["type"], "image");
    }

    #[test]
    fn test_empty_canvas_removes_key() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = AutoSaveManager::new(storage.clone());
        block_on(manager.save(&board())).unwrap();
        block_on(manager.save(&BoardSnapshot::new())).unwrap();

        assert_eq!(block_on(storage.get(CANVAS_KEY)).unwrap(), None);
        assert_eq!(block_on(storage.get(STICKIES_KEY)).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_load_legacy_entries_without_ids() {
        let storage = Arc::new(MemoryStorage::new());
        let legacy = r#"[{"type":"note","content":"old","left":"","top":"40px","width":"","height":"","minimized":false}]"#;
        block_on(storage.set(STICKIES_KEY, legacy)).unwrap();

        let mut manager = AutoSaveManager::new(storage);
        let loaded = block_on(manager.load());
        let note = &loaded.notes[0];
        assert!(!note.id.is_empty());
        assert_eq!((note.x, note.y), (100.0, 40.0));
        assert_eq!(note.w, None);
    }

    #[test]
    fn test_load_fails_open_on_corrupt_json() {
        let storage = Arc::new(MemoryStorage::new());
        block_on(storage.set(STICKIES_KEY, "{not json")).unwrap();
        block_on(storage.set(CANVAS_KEY, "data:image/png;base64,AAAA")).unwrap();

        let mut manager = AutoSaveManager::new(storage);
        let loaded = block_on(manager.load());
        assert!(loaded.notes.is_empty());
        assert!(loaded.canvas_image.is_some());
    }

    #[test]
    fn test_broken_storage_fails_open() {
        let mut manager = AutoSaveManager::new(Arc::new(BrokenStorage));
        assert!(block_on(manager.load()).is_empty());

        manager.mark_dirty();
        let result = block_on(manager.save(&board()));
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert!(manager.is_dirty());
    }

    #[test]
    fn test_failed_sticky_write_keeps_previous_canvas() {
        let storage = Arc::new(StickyQuotaStorage::default());
        block_on(storage.inner.set(CANVAS_KEY, "data:image/png;base64,b2xk")).unwrap();
        let mut manager = AutoSaveManager::new(storage.clone());

        manager.mark_dirty();
        let result = block_on(manager.save(&board()));
        assert!(matches!(result, Err(StorageError::QuotaExceeded(_))));
        assert_eq!(
            block_on(storage.get(CANVAS_KEY)).unwrap().as_deref(),
            Some("data:image/png;base64,b2xk")
        );
        assert_eq!(block_on(storage.get(STICKIES_KEY)).unwrap(), None);

        // Still dirty, but the failed attempt restarts the interval.
        assert!(manager.is_dirty());
        assert!(!manager.should_save());
    }

    #[test]
    fn test_failed_sticky_write_removes_new_canvas() {
        let storage = Arc::new(StickyQuotaStorage::default());
        let mut manager = AutoSaveManager::new(storage.clone());

        assert!(block_on(manager.save(&board())).is_err());
        assert!(storage.inner.is_empty());
    }
}
