//! Cooperative locking over a shared folder.
//!
//! A lock on `target` is a sentinel file `target.lock` holding the owner's
//! user name; its modification time is the acquisition time. Sentinels older
//! than [`STALE_AFTER`] are ignored (but left in place). All state lives in
//! the file system.
//!
//! `acquire` checks and then writes, which is not atomic: two machines can
//! both see the target unlocked and both write the sentinel, and the last
//! writer's name ends up in the file. Participants that ignore sentinels are
//! not stopped at all.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use stockroom_core::Clock;
use stockroom_core::clock::age;
use stockroom_storage::FileSystem;

use crate::error::EngineError;

pub const LOCK_SUFFIX: &str = ".lock";
pub const STALE_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    /// A sentinel exists but is too old to count.
    Stale,
    HeldBySelf,
    HeldBy(String),
}

pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

pub struct LockCoordinator {
    fs: Rc<dyn FileSystem>,
    clock: Rc<dyn Clock>,
    user: String,
}

impl LockCoordinator {
    pub fn new(fs: Rc<dyn FileSystem>, clock: Rc<dyn Clock>, user: impl Into<String>) -> Self {
        Self {
            fs,
            clock,
            user: user.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = user.into();
    }

    pub fn status(&self, target: &Path) -> LockStatus {
        let sentinel = lock_path(target);
        if !self.fs.exists(&sentinel) {
            return LockStatus::Unlocked;
        }

        if let Ok(modified) = self.fs.modified(&sentinel) {
            if age(self.clock.now(), modified).as_secs() > STALE_AFTER.as_secs() {
                log::warn!("ignoring stale lock {}", sentinel.display());
                return LockStatus::Stale;
            }
        }

        match self.fs.read_to_string(&sentinel) {
            Ok(content) => {
                let owner = content.trim();
                if owner == self.user {
                    LockStatus::HeldBySelf
                } else {
                    LockStatus::HeldBy(owner.to_string())
                }
            }
            Err(e) => {
                log::warn!("unreadable lock {}: {e}", sentinel.display());
                LockStatus::Unlocked
            }
        }
    }

    /// True only when someone else holds a fresh lock.
    pub fn is_locked(&self, target: &Path) -> bool {
        matches!(self.status(target), LockStatus::HeldBy(_))
    }

    pub fn acquire(&self, target: &Path) -> Result<(), EngineError> {
        if let LockStatus::HeldBy(owner) = self.status(target) {
            log::debug!("{} is locked by {owner}", target.display());
            return Err(EngineError::LockConflict {
                path: target.to_path_buf(),
                owner,
            });
        }

        let sentinel = lock_path(target);
        if let Err(e) = self.fs.write(&sentinel, self.user.as_bytes()) {
            let _ = self.fs.remove_file(&sentinel);
            return Err(EngineError::Io(e));
        }
        log::debug!("locked {} as {}", target.display(), self.user);
        Ok(())
    }

    /// Remove the sentinel whoever owns it. Returns whether one was there.
    pub fn release(&self, target: &Path) -> Result<bool, EngineError> {
        let sentinel = lock_path(target);
        if !self.fs.exists(&sentinel) {
            return Ok(false);
        }
        match self.fs.remove_file(&sentinel) {
            Ok(()) => {
                log::debug!("unlocked {}", target.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::SystemTime;

    use stockroom_core::ManualClock;
    use stockroom_storage::OsFileSystem;

    use super::*;

    fn coordinator(clock: &ManualClock, user: &str) -> LockCoordinator {
        LockCoordinator::new(Rc::new(OsFileSystem), Rc::new(clock.clone()), user)
    }

    #[test]
    fn sentinel_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/cloud/stock.grid")),
            PathBuf::from("/cloud/stock.grid.lock")
        );
    }

    #[test]
    fn acquire_writes_owner_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stock.grid");
        let clock = ManualClock::new(SystemTime::now());
        let alice = coordinator(&clock, "alice");

        assert_eq!(alice.status(&target), LockStatus::Unlocked);
        alice.acquire(&target).unwrap();
        assert_eq!(fs::read_to_string(lock_path(&target)).unwrap(), "alice");
        assert_eq!(alice.status(&target), LockStatus::HeldBySelf);
        assert!(!alice.is_locked(&target));

        assert!(alice.release(&target).unwrap());
        assert!(!alice.release(&target).unwrap());
        assert!(!lock_path(&target).exists());
    }

    #[test]
    fn fresh_foreign_lock_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stock.grid");
        let clock = ManualClock::new(SystemTime::now());
        coordinator(&clock, "bob").acquire(&target).unwrap();

        let alice = coordinator(&clock, "alice");
        assert!(alice.is_locked(&target));
        match alice.acquire(&target) {
            Err(EngineError::LockConflict { owner, .. }) => assert_eq!(owner, "bob"),
            other => panic!("expected lock conflict, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(lock_path(&target)).unwrap(), "bob");
    }

    #[test]
    fn stale_lock_is_ignored_but_kept() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stock.grid");
        let clock = ManualClock::new(SystemTime::now());
        coordinator(&clock, "bob").acquire(&target).unwrap();

        let alice = coordinator(&clock, "alice");
        clock.advance(Duration::from_secs(299));
        assert!(alice.is_locked(&target));

        clock.advance(Duration::from_secs(3));
        assert_eq!(alice.status(&target), LockStatus::Stale);
        assert!(!alice.is_locked(&target));
        assert!(lock_path(&target).exists());

        alice.acquire(&target).unwrap();
        assert_eq!(fs::read_to_string(lock_path(&target)).unwrap(), "alice");
    }

    #[test]
    fn owner_whitespace_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stock.grid");
        fs::write(lock_path(&target), "alice\n").unwrap();
        let clock = ManualClock::new(SystemTime::now());
        assert_eq!(coordinator(&clock, "alice").status(&target), LockStatus::HeldBySelf);
    }
}
