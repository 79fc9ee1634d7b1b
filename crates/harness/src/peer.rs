use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use stockroom_core::ManualClock;
use stockroom_engine::{EngineError, EngineEvent, Workbench};
use stockroom_storage::{GridFileIo, SqliteSettings};

use crate::FaultyFs;

/// One installation: a local folder, its settings database and a workbench
/// whose events are recorded.
pub struct TestPeer {
    pub workbench: Workbench,
    pub fs: Rc<FaultyFs>,
    pub clock: ManualClock,
    local_dir: PathBuf,
    events: Rc<RefCell<Vec<EngineEvent>>>,
}

impl TestPeer {
    /// Open a peer rooted at `local_dir`, which must exist.
    pub fn open(local_dir: &Path, clock: ManualClock) -> Result<Self, EngineError> {
        let fs = Rc::new(FaultyFs::new());
        let (workbench, events) = Self::workbench(local_dir, &fs, &clock)?;
        Ok(Self {
            workbench,
            fs,
            clock,
            local_dir: local_dir.to_path_buf(),
            events,
        })
    }

    fn workbench(
        local_dir: &Path,
        fs: &Rc<FaultyFs>,
        clock: &ManualClock,
    ) -> Result<(Workbench, Rc<RefCell<Vec<EngineEvent>>>), EngineError> {
        let settings = SqliteSettings::open(&local_dir.join("settings.db"))?;
        let mut workbench = Workbench::open(
            Box::new(settings),
            Rc::new(GridFileIo),
            fs.clone(),
            Rc::new(clock.clone()),
        )?;

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        workbench.subscribe(Box::new(move |event: &EngineEvent| {
            sink.borrow_mut().push(event.clone());
        }));
        Ok((workbench, events))
    }

    /// Simulate an application restart on the same settings database.
    pub fn reopen(&mut self) -> Result<(), EngineError> {
        let (workbench, events) = Self::workbench(&self.local_dir, &self.fs, &self.clock)?;
        self.workbench = workbench;
        self.events = events;
        Ok(())
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn local_path(&self, name: &str) -> PathBuf {
        self.local_dir.join(name)
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<EngineEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn saw(&self, predicate: impl Fn(&EngineEvent) -> bool) -> bool {
        self.events.borrow().iter().any(predicate)
    }
}
