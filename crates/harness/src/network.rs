use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use stockroom_core::ManualClock;
use tempfile::TempDir;

use crate::TestPeer;

/// Several peers sharing one cloud folder and one clock.
pub struct TestNetwork {
    root: TempDir,
    cloud_dir: PathBuf,
    clock: ManualClock,
    peers: Vec<TestPeer>,
}

impl TestNetwork {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let cloud_dir = root.path().join("cloud");
        fs::create_dir(&cloud_dir)?;
        Ok(Self {
            root,
            cloud_dir,
            clock: ManualClock::new(SystemTime::now()),
            peers: Vec::new(),
        })
    }

    /// Add a peer signed in as `user` with the shared cloud folder
    /// configured.
    pub fn add_peer(&mut self, user: &str) -> Result<usize, Box<dyn std::error::Error>> {
        let local_dir = self.root.path().join(user);
        fs::create_dir(&local_dir)?;

        let mut peer = TestPeer::open(&local_dir, self.clock.clone())?;
        peer.workbench.set_current_user(user)?;
        peer.workbench.set_cloud_folder(&self.cloud_dir)?;
        peer.take_events();

        let index = self.peers.len();
        self.peers.push(peer);
        Ok(index)
    }

    pub fn cloud_dir(&self) -> &Path {
        &self.cloud_dir
    }

    pub fn cloud_path(&self, name: &str) -> PathBuf {
        self.cloud_dir.join(name)
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn peer(&self, index: usize) -> &TestPeer {
        &self.peers[index]
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut TestPeer {
        &mut self.peers[index]
    }
}
