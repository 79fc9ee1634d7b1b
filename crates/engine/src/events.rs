use std::fmt;
use std::path::PathBuf;

use crate::merge::MergeReport;
use crate::sync::SyncState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ErrorOccurred(String),
    Warning(String),
    FileLoaded(String),
    FileSaved(String),
    FileMerged { file_name: String, report: MergeReport },
    CurrentFileChanged(Option<PathBuf>),
    CanonicalFileChanged(Option<PathBuf>),
    UnsavedChangesChanged(bool),
    SearchResultFound(usize),
    SettingsChanged(&'static str),
    SyncStatusChanged(SyncState),
    LastSyncTimeChanged(String),
    SyncCompleted,
    ConflictDetected(String),
}

pub type EventListener = Box<dyn FnMut(&EngineEvent)>;

/// Fan-out of engine events to any number of observers.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<EventListener>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    pub fn emit(&mut self, event: EngineEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
