//! Pushing and pulling the working document through a shared cloud folder.
//!
//! The cloud copy of a document is `cloud_folder / file_name(document)`.
//! Every write into the folder happens under a [`LockCoordinator`] lock;
//! reads only check that nobody else holds one. Conflicts are detected by
//! comparing modification times, never content.
//!
//! After a successful upload the lock is kept for a short grace period so a
//! quick follow-up push from this machine does not thrash the sentinel.
//! The release is a [`PendingRelease`] that the host drives through
//! [`SyncCoordinator::run_due_releases`]; nothing runs in the background, so
//! a host that never calls it leaves the sentinel until it goes stale.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use stockroom_core::Clock;
use stockroom_storage::FileSystem;

use crate::config::{SyncConfig, format_sync_time};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::lock::{LockCoordinator, LockStatus};

/// How long a pushed file stays locked after the upload finished.
pub const RELEASE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Conflict,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The in-memory document the coordinator pushes from and pulls into.
pub trait LocalDocument {
    fn current_path(&self) -> Option<&Path>;

    /// Persist the in-memory table at `path`; returns the path written.
    fn save_to(&mut self, path: &Path) -> Result<PathBuf, EngineError>;

    /// Replace the in-memory table with the file at `path`, which becomes
    /// the current path.
    fn load_from(&mut self, path: &Path) -> Result<(), EngineError>;

    fn set_current_path(&mut self, path: PathBuf);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelease {
    pub target: PathBuf,
    pub due: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The current document already lives in the cloud folder; it was saved
    /// where it is.
    SavedInPlace(PathBuf),
    Uploaded { cloud_path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub cloud_path: PathBuf,
    /// Where the pulled document now lives locally. Equal to `cloud_path`
    /// when there was nowhere else to put it or the local copy failed.
    pub working_path: PathBuf,
}

pub struct SyncCoordinator {
    lock: LockCoordinator,
    fs: Rc<dyn FileSystem>,
    clock: Rc<dyn Clock>,
    state: SyncState,
    pending: Vec<PendingRelease>,
}

impl SyncCoordinator {
    pub fn new(
        fs: Rc<dyn FileSystem>,
        clock: Rc<dyn Clock>,
        user: impl Into<String>,
        initial: SyncState,
    ) -> Self {
        Self {
            lock: LockCoordinator::new(Rc::clone(&fs), Rc::clone(&clock), user),
            fs,
            clock,
            state: initial,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.lock.set_user(user);
    }

    fn set_state(&mut self, state: SyncState, events: &mut EventBus) {
        if self.state != state {
            log::info!("sync status: {} -> {}", self.state, state);
            self.state = state;
            events.emit(EngineEvent::SyncStatusChanged(state));
        }
    }

    fn fail(&mut self, state: SyncState, events: &mut EventBus, err: EngineError) -> EngineError {
        self.set_state(state, events);
        err
    }

    fn mark_synced(&mut self, config: &mut SyncConfig, events: &mut EventBus) {
        config.last_sync_time = format_sync_time(self.clock.now());
        events.emit(EngineEvent::LastSyncTimeChanged(config.last_sync_time.clone()));
        self.set_state(SyncState::Synced, events);
        events.emit(EngineEvent::SyncCompleted);
    }

    /// Whether `a` and `b` name one file. Works when the file itself is
    /// missing, as long as both parent folders exist.
    fn same_file(&self, a: &Path, b: &Path) -> bool {
        if a == b {
            return true;
        }
        if let (Ok(a), Ok(b)) = (self.fs.canonicalize(a), self.fs.canonicalize(b)) {
            return a == b;
        }
        match (a.parent(), b.parent(), a.file_name(), b.file_name()) {
            (Some(dir_a), Some(dir_b), Some(name_a), Some(name_b)) if name_a == name_b => {
                match (self.fs.canonicalize(dir_a), self.fs.canonicalize(dir_b)) {
                    (Ok(dir_a), Ok(dir_b)) => dir_a == dir_b,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn replace_with_copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.same_file(from, to) {
            return Ok(());
        }
        if self.fs.exists(to) {
            if let Err(e) = self.fs.remove_file(to) {
                log::warn!("could not remove {}: {e}", to.display());
            }
        }
        self.fs.copy(from, to)
    }

    fn release_now(&mut self, target: &Path) {
        self.cancel_release(target);
        if let Err(e) = self.lock.release(target) {
            log::warn!("could not release lock on {}: {e}", target.display());
        }
    }

    /// Upload the current document to the cloud folder.
    pub fn push(
        &mut self,
        doc: &mut dyn LocalDocument,
        config: &mut SyncConfig,
        events: &mut EventBus,
    ) -> Result<PushOutcome, EngineError> {
        if config.cloud_folder.is_none() {
            return Err(EngineError::NotConfigured("cloud folder"));
        }
        let current = doc
            .current_path()
            .map(Path::to_path_buf)
            .ok_or(EngineError::NotConfigured("current document"))?;
        if !config.can_edit() {
            return Err(EngineError::Permission {
                role: config.role.as_str().to_string(),
            });
        }

        self.set_state(SyncState::Syncing, events);

        let Some(cloud_path) = config.cloud_path_for(&current) else {
            let err = EngineError::NotConfigured("current document");
            return Err(self.fail(SyncState::Offline, events, err));
        };
        log::info!("pushing {} to {}", current.display(), cloud_path.display());

        if self.same_file(&current, &cloud_path) {
            return match doc.save_to(&current) {
                Ok(saved) => {
                    self.mark_synced(config, events);
                    Ok(PushOutcome::SavedInPlace(saved))
                }
                Err(e) => Err(self.fail(SyncState::Offline, events, e)),
            };
        }

        // A grace release still pending from our previous push must not fire
        // in the middle of this one.
        self.cancel_release(&cloud_path);
        if let Err(e) = self.lock.acquire(&cloud_path) {
            let state = match e {
                EngineError::LockConflict { .. } => SyncState::Conflict,
                _ => SyncState::Offline,
            };
            return Err(self.fail(state, events, e));
        }

        let saved = match doc.save_to(&current) {
            Ok(saved) => saved,
            Err(e) => {
                self.release_now(&cloud_path);
                return Err(self.fail(SyncState::Offline, events, e));
            }
        };

        if let Err(e) = self.replace_with_copy(&saved, &cloud_path) {
            log::warn!("copy {} -> {} failed: {e}", saved.display(), cloud_path.display());
            self.release_now(&cloud_path);
            return Err(self.fail(SyncState::Offline, events, EngineError::Io(e)));
        }

        self.mark_synced(config, events);
        self.schedule_release(cloud_path.clone());
        Ok(PushOutcome::Uploaded { cloud_path })
    }

    /// Replace the in-memory document with the cloud copy and store it at
    /// the best local location: the canonical file, else the previous
    /// current path, else nowhere (the cloud copy becomes the working file).
    pub fn pull(
        &mut self,
        doc: &mut dyn LocalDocument,
        config: &mut SyncConfig,
        events: &mut EventBus,
    ) -> Result<PullOutcome, EngineError> {
        if config.cloud_folder.is_none() {
            return Err(EngineError::NotConfigured("cloud folder"));
        }

        self.set_state(SyncState::Syncing, events);

        let reference = doc
            .current_path()
            .map(Path::to_path_buf)
            .or_else(|| config.canonical_file.clone());
        let Some(cloud_path) = reference.and_then(|p| config.cloud_path_for(&p)) else {
            let err = EngineError::NotConfigured("current document");
            return Err(self.fail(SyncState::Offline, events, err));
        };
        log::info!("pulling {}", cloud_path.display());

        if !self.fs.exists(&cloud_path) {
            let err = EngineError::NotFound(cloud_path);
            return Err(self.fail(SyncState::Offline, events, err));
        }
        if let LockStatus::HeldBy(owner) = self.lock.status(&cloud_path) {
            let err = EngineError::LockConflict { path: cloud_path, owner };
            return Err(self.fail(SyncState::Conflict, events, err));
        }

        let previous = doc.current_path().map(Path::to_path_buf);
        if let Err(e) = doc.load_from(&cloud_path) {
            return Err(self.fail(SyncState::Offline, events, e));
        }

        let destination = config.canonical_file.clone().or(previous);
        let working_path = match destination {
            Some(dest) if !self.same_file(&dest, &cloud_path) => {
                match self.replace_with_copy(&cloud_path, &dest) {
                    Ok(()) => dest,
                    Err(e) => {
                        log::warn!("could not copy cloud file to {}: {e}", dest.display());
                        events.emit(EngineEvent::Warning(format!(
                            "could not copy the cloud file to {}; working on the cloud copy",
                            dest.display()
                        )));
                        cloud_path.clone()
                    }
                }
            }
            _ => cloud_path.clone(),
        };
        doc.set_current_path(working_path.clone());

        self.mark_synced(config, events);
        Ok(PullOutcome { cloud_path, working_path })
    }

    /// Whether the cloud copy was modified after the local one. Advisory:
    /// raises a conflict event but changes nothing.
    pub fn check_for_updates(
        &self,
        doc: &dyn LocalDocument,
        config: &SyncConfig,
        events: &mut EventBus,
    ) -> bool {
        let Some(current) = doc.current_path() else {
            return false;
        };
        let Some(cloud_path) = config.cloud_path_for(current) else {
            return false;
        };
        let Ok(cloud_modified) = self.fs.modified(&cloud_path) else {
            return false;
        };

        let newer = match self.fs.modified(current) {
            Ok(local_modified) => cloud_modified > local_modified,
            Err(_) => true,
        };
        if newer {
            log::info!("{} is newer than the local copy", cloud_path.display());
            events.emit(EngineEvent::ConflictDetected(format!(
                "{} has been updated by another user",
                cloud_path.display()
            )));
        }
        newer
    }

    pub fn pending_releases(&self) -> &[PendingRelease] {
        &self.pending
    }

    /// Queue a lock release for `target` after [`RELEASE_GRACE`], replacing
    /// any release already queued for it.
    pub fn schedule_release(&mut self, target: PathBuf) {
        self.cancel_release(&target);
        let due = self.clock.now() + RELEASE_GRACE;
        self.pending.push(PendingRelease { target, due });
    }

    pub fn cancel_release(&mut self, target: &Path) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.target != target);
        self.pending.len() != before
    }

    /// Release every lock whose grace period is over. Returns how many
    /// releases ran.
    pub fn run_due_releases(&mut self) -> usize {
        let now = self.clock.now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        for release in &due {
            if let Err(e) = self.lock.release(&release.target) {
                log::warn!("deferred release of {} failed: {e}", release.target.display());
            }
        }
        due.len()
    }

    /// Release every queued lock now, due or not.
    pub fn flush_releases(&mut self) -> usize {
        let all: Vec<_> = self.pending.drain(..).collect();
        for release in &all {
            if let Err(e) = self.lock.release(&release.target) {
                log::warn!("release of {} failed: {e}", release.target.display());
            }
        }
        all.len()
    }
}
