pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod lock;
pub mod merge;
pub mod sync;

pub use config::SyncConfig;
pub use document::{DirtyTracker, Document};
pub use error::{EngineError, StructureError};
pub use events::{EngineEvent, EventBus, EventListener};
pub use lock::{LockCoordinator, LockStatus};
pub use merge::MergeReport;
pub use sync::{PendingRelease, PullOutcome, PushOutcome, SyncCoordinator, SyncState};

use std::path::{Path, PathBuf};
use std::rc::Rc;

use stockroom_core::schema::{self, DEPARTMENT, PART_NAME, PART_NO, QUANTITY, VENDOR};
use stockroom_core::{Cell, Clock, Dataset, DocumentKind, Role, TableStore};
use stockroom_storage::{FileSystem, SettingsStore, SpreadsheetIo};

use crate::sync::LocalDocument;

/// One row of a free-text search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub row: usize,
    pub part_name: Cell,
    pub part_no: Cell,
    pub stock: Cell,
    pub vendor: Cell,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The operation surface a front end drives: documents, merging, search and
/// cloud sync over one in-memory table.
///
/// Every fallible operation returns its error and also publishes it as
/// [`EngineEvent::ErrorOccurred`].
pub struct Workbench {
    document: Document,
    config: SyncConfig,
    settings: Box<dyn SettingsStore>,
    sync: SyncCoordinator,
    fs: Rc<dyn FileSystem>,
    events: EventBus,
    published_dirty: bool,
}

impl Workbench {
    pub fn open(
        settings: Box<dyn SettingsStore>,
        io: Rc<dyn SpreadsheetIo>,
        fs: Rc<dyn FileSystem>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let mut config = SyncConfig::load(settings.as_ref())?;

        let mut stale_canonical = false;
        if let Some(path) = &config.canonical_file {
            if !fs.exists(path) {
                log::warn!("canonical file {} no longer exists", path.display());
                stale_canonical = true;
            } else if !io.is_recognized(path) {
                log::warn!("canonical file {} has an unrecognized format", path.display());
                stale_canonical = true;
            }
        }
        if stale_canonical {
            config.canonical_file = None;
        }

        let initial = match &config.cloud_folder {
            Some(folder) if fs.is_dir(folder) => SyncState::Synced,
            _ => SyncState::Offline,
        };
        let sync = SyncCoordinator::new(
            Rc::clone(&fs),
            clock,
            config.current_user.clone(),
            initial,
        );

        let mut workbench = Self {
            document: Document::new(io),
            config,
            settings,
            sync,
            fs,
            events: EventBus::new(),
            published_dirty: false,
        };
        if stale_canonical {
            workbench.persist()?;
        }
        log::info!(
            "workbench opened for {} ({})",
            workbench.config.current_user,
            workbench.config.role.as_str()
        );
        Ok(workbench)
    }

    pub fn subscribe(&mut self, listener: EventListener) {
        self.events.subscribe(listener);
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        self.config.save(self.settings.as_mut())
    }

    /// Publish the error and hand it back.
    fn report<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            log::warn!("{e}");
            self.events.emit(EngineEvent::ErrorOccurred(e.to_string()));
        }
        result
    }

    fn publish_dirty(&mut self) {
        let dirty = self.document.is_dirty();
        if dirty != self.published_dirty {
            self.published_dirty = dirty;
            self.events.emit(EngineEvent::UnsavedChangesChanged(dirty));
        }
    }

    fn publish_current_file(&mut self) {
        let current = self.document.current_path().map(Path::to_path_buf);
        self.events.emit(EngineEvent::CurrentFileChanged(current));
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn table(&self) -> &TableStore {
        self.document.table()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn sync_coordinator(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.document.current_path()
    }

    pub fn canonical_file(&self) -> Option<&Path> {
        self.config.canonical_file.as_deref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.document.is_dirty()
    }

    pub fn has_saved_canonical(&self) -> bool {
        self.config
            .canonical_file
            .as_deref()
            .is_some_and(|p| self.fs.exists(p))
    }

    /// Cloud location of the current document, if both are known.
    pub fn cloud_file_path(&self) -> Option<PathBuf> {
        self.config.cloud_path_for(self.document.current_path()?)
    }

    pub fn file_name(&self) -> String {
        self.document
            .current_path()
            .map(file_name_of)
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn file_type(&self) -> DocumentKind {
        self.table()
            .get(0, QUANTITY)
            .map_or(DocumentKind::Stock, DocumentKind::from_header)
    }

    // ========================================================================
    // Direct edits
    // ========================================================================

    pub fn set_cell(&mut self, row: usize, col: usize, value: Cell) -> bool {
        let changed = self.document.table_mut().set(row, col, value);
        self.publish_dirty();
        changed
    }

    pub fn append_row(&mut self) -> usize {
        let row = self.document.table_mut().append_row();
        self.publish_dirty();
        row
    }

    pub fn append_column(&mut self) {
        self.document.table_mut().append_column();
        self.publish_dirty();
    }

    // ========================================================================
    // Documents
    // ========================================================================

    fn create(&mut self, kind: DocumentKind, rows: usize) {
        let mut grid = vec![kind.header_row()];
        grid.extend((1..rows).map(|_| vec![Cell::Empty; schema::COLUMN_COUNT]));
        self.document.reset(Dataset::from_rows(grid));
        log::info!("created {} document with {} rows", kind.as_str(), rows.max(1));
        self.publish_dirty();
        self.publish_current_file();
    }

    pub fn create_canonical(&mut self, rows: usize) {
        self.create(DocumentKind::Stock, rows);
    }

    pub fn create_delta(&mut self, rows: usize) {
        self.create(DocumentKind::Purchase, rows);
    }

    pub fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        let result = self.document.load(path);
        if matches!(result, Err(EngineError::Format { .. }))
            && self.config.canonical_file.as_deref() == Some(path)
        {
            self.clear_canonical()?;
        }
        self.report(result)?;

        log::info!(
            "loaded {}: {} rows x {} columns ({})",
            path.display(),
            self.table().row_count(),
            self.table().column_count(),
            self.file_type().as_str()
        );
        self.publish_dirty();
        self.publish_current_file();
        self.events.emit(EngineEvent::FileLoaded(file_name_of(path)));
        Ok(())
    }

    /// Save to `path`, or to the current file. Returns the path written,
    /// which gains the default extension when `path` had none.
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, EngineError> {
        let result = self.document.save(path);
        let written = self.report(result)?;
        self.publish_dirty();
        self.publish_current_file();
        self.events.emit(EngineEvent::FileSaved(file_name_of(&written)));
        Ok(written)
    }

    fn clear_canonical(&mut self) -> Result<(), EngineError> {
        self.config.canonical_file = None;
        let result = self.persist();
        self.report(result)?;
        self.events.emit(EngineEvent::CanonicalFileChanged(None));
        Ok(())
    }

    /// Designate `path` as the canonical stock file and make it the current
    /// file. The table is not reloaded.
    pub fn set_canonical_path(&mut self, path: &Path) -> Result<(), EngineError> {
        let result = self.document.check_readable(path);
        self.report(result)?;

        self.config.canonical_file = Some(path.to_path_buf());
        self.document.set_current_path(path.to_path_buf());
        let result = self.persist();
        self.report(result)?;

        log::info!("canonical file set to {}", path.display());
        self.events
            .emit(EngineEvent::CanonicalFileChanged(Some(path.to_path_buf())));
        self.publish_current_file();
        Ok(())
    }

    pub fn load_canonical(&mut self) -> Result<(), EngineError> {
        let Some(path) = self.config.canonical_file.clone() else {
            return self.report(Err(EngineError::NotConfigured("canonical file")));
        };
        if !self.fs.exists(&path) {
            self.clear_canonical()?;
            return self.report(Err(EngineError::NotFound(path)));
        }
        self.load(&path)
    }

    pub fn save_to_canonical(&mut self) -> Result<PathBuf, EngineError> {
        let Some(path) = self.config.canonical_file.clone() else {
            return self.report(Err(EngineError::NotConfigured("canonical file")));
        };
        self.save(Some(&path))
    }

    // ========================================================================
    // Merge and search
    // ========================================================================

    fn merge_file(&mut self, path: &Path) -> Result<MergeReport, EngineError> {
        if !self.fs.exists(path) {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        let sheet = self
            .document
            .io()
            .open(path)
            .map_err(|source| EngineError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        merge::validate_delta_structure(sheet.as_ref())?;

        let table = self.document.table_mut();
        if table.row_count() == 0 {
            table.replace_all(Dataset::from_rows(vec![DocumentKind::Stock.header_row()]));
        }
        let rows = merge::read_delta_rows(sheet.as_ref());
        Ok(merge::merge_rows(table, &rows))
    }

    /// Merge a purchase file into the table, then save to the canonical
    /// file when one is configured.
    pub fn merge(&mut self, path: &Path) -> Result<MergeReport, EngineError> {
        log::info!("merging {}", path.display());
        let result = self.merge_file(path);
        let report = self.report(result)?;
        log::info!(
            "merge complete: {} updated, {} added, {} rows total",
            report.rows_updated,
            report.rows_added,
            self.table().row_count()
        );
        self.publish_dirty();

        if self.config.canonical_file.is_some() {
            self.save_to_canonical()?;
        }

        self.events.emit(EngineEvent::FileMerged {
            file_name: file_name_of(path),
            report,
        });
        Ok(report)
    }

    pub fn find_by_name(&mut self, name: &str) -> Option<usize> {
        let row = merge::match_by_key(self.table().dataset(), name);
        match row {
            Some(row) => {
                log::debug!("found '{name}' at row {row}");
                self.events.emit(EngineEvent::SearchResultFound(row));
            }
            None => log::debug!("'{name}' not found"),
        }
        row
    }

    /// Rows whose part name, part number or vendor contains `text`,
    /// ignoring case.
    pub fn search_all(&self, text: &str) -> Vec<SearchHit> {
        fn cell(row: &[Cell], col: usize) -> Cell {
            row.get(col).cloned().unwrap_or_default()
        }

        let needle = text.trim().to_lowercase();

        self.table()
            .dataset()
            .rows()
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| {
                [PART_NAME, PART_NO, VENDOR].iter().any(|&col| {
                    row.get(col)
                        .is_some_and(|c| c.to_text().to_lowercase().contains(&needle))
                })
            })
            .map(|(index, row)| SearchHit {
                row: index,
                part_name: cell(row, PART_NAME),
                part_no: cell(row, PART_NO),
                stock: cell(row, QUANTITY),
                vendor: cell(row, VENDOR),
            })
            .collect()
    }

    /// Book `quantity` units of a part into stock, creating the row (with a
    /// generated part number) when the part is unknown.
    pub fn receive_item(&mut self, part_name: &str, department: &str, quantity: i64) -> usize {
        let existing = merge::match_by_key(self.table().dataset(), part_name);
        let table = self.document.table_mut();
        let row = match existing {
            Some(row) => {
                let stock = table
                    .get(row, QUANTITY)
                    .map_or(0, Cell::to_quantity)
                    .saturating_add(quantity);
                table.set(row, QUANTITY, Cell::Integer(stock));
                row
            }
            None => {
                let row = table.append_row();
                table.set(row, PART_NAME, Cell::text(part_name.trim()));
                table.set(row, PART_NO, Cell::text(format!("PN-{row}")));
                table.set(row, QUANTITY, Cell::Integer(quantity));
                table.set(row, DEPARTMENT, Cell::text(department));
                row
            }
        };
        self.publish_dirty();
        row
    }

    // ========================================================================
    // Cloud sync
    // ========================================================================

    fn persist_sync_time(&mut self) {
        if let Err(e) = self.persist() {
            log::warn!("could not persist sync time: {e}");
            self.events.emit(EngineEvent::ErrorOccurred(e.to_string()));
        }
    }

    pub fn push_to_cloud(&mut self) -> Result<PushOutcome, EngineError> {
        let result = self
            .sync
            .push(&mut self.document, &mut self.config, &mut self.events);
        let outcome = self.report(result)?;
        self.persist_sync_time();
        self.publish_dirty();
        Ok(outcome)
    }

    pub fn pull_from_cloud(&mut self) -> Result<PullOutcome, EngineError> {
        let result = self
            .sync
            .pull(&mut self.document, &mut self.config, &mut self.events);
        let outcome = self.report(result)?;
        self.persist_sync_time();
        self.publish_dirty();
        self.publish_current_file();
        Ok(outcome)
    }

    pub fn check_for_updates(&mut self) -> bool {
        self.sync
            .check_for_updates(&self.document, &self.config, &mut self.events)
    }

    /// Run grace-period lock releases that are due.
    pub fn run_due_releases(&mut self) -> usize {
        self.sync.run_due_releases()
    }

    /// Release every lock still held from earlier pushes.
    pub fn flush_releases(&mut self) -> usize {
        self.sync.flush_releases()
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn set_cloud_folder(&mut self, folder: &Path) -> Result<(), EngineError> {
        if !self.fs.is_dir(folder) {
            return self.report(Err(EngineError::NotFound(folder.to_path_buf())));
        }
        self.config.cloud_folder = Some(folder.to_path_buf());
        let result = self.persist();
        self.report(result)?;
        log::info!("cloud folder set to {}", folder.display());
        self.events.emit(EngineEvent::SettingsChanged(config::keys::CLOUD_FOLDER));
        Ok(())
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if self.config.sync_enabled == enabled {
            return Ok(());
        }
        self.config.sync_enabled = enabled;
        let result = self.persist();
        self.report(result)?;
        self.events.emit(EngineEvent::SettingsChanged(config::keys::SYNC_ENABLED));
        Ok(())
    }

    pub fn set_current_user(&mut self, user: &str) -> Result<(), EngineError> {
        if self.config.current_user == user {
            return Ok(());
        }
        self.config.current_user = user.to_string();
        self.sync.set_user(user);
        let result = self.persist();
        self.report(result)?;
        self.events.emit(EngineEvent::SettingsChanged(config::keys::CURRENT_USER));
        Ok(())
    }

    pub fn set_user_role(&mut self, role: Role) -> Result<(), EngineError> {
        if self.config.role == role {
            return Ok(());
        }
        self.config.role = role;
        let result = self.persist();
        self.report(result)?;
        self.events.emit(EngineEvent::SettingsChanged(config::keys::USER_ROLE));
        Ok(())
    }
}
