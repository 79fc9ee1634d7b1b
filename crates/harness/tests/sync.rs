use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use stockroom_core::{Cell, Role};
use stockroom_engine::lock::lock_path;
use stockroom_engine::sync::RELEASE_GRACE;
use stockroom_engine::{EngineError, EngineEvent, PushOutcome, SyncState};
use stockroom_harness::{PartLine, TestNetwork, TestPeer, stock_rows, write_grid};

const STOCK: usize = 2;

fn with_canonical(
    peer: &mut TestPeer,
    lines: &[PartLine<'_>],
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = write_grid(&peer.local_path("stock.grid"), &stock_rows(lines))?;
    peer.workbench.set_canonical_path(&path)?;
    peer.workbench.load_canonical()?;
    peer.take_events();
    Ok(path)
}

fn set_mtime(path: &std::path::Path, at: SystemTime) -> std::io::Result<()> {
    File::options().write(true).open(path)?.set_modified(at)
}

// ============================================================================
// Push
// ============================================================================

#[test]
fn push_uploads_and_releases_after_grace() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = net.cloud_path("stock.grid");
    let alice = net.peer_mut(a);
    with_canonical(alice, &[("Bolt", "P1", 10, "")])?;

    let outcome = alice.workbench.push_to_cloud()?;
    assert_eq!(outcome, PushOutcome::Uploaded { cloud_path: cloud.clone() });
    assert!(cloud.exists());
    assert_eq!(alice.workbench.sync_state(), SyncState::Synced);
    assert_ne!(alice.workbench.config().last_sync_time, "Never");
    assert!(alice.saw(|e| matches!(e, EngineEvent::SyncCompleted)));

    // The lock outlives the push by the grace period.
    assert_eq!(fs::read_to_string(lock_path(&cloud))?, "alice");
    assert_eq!(alice.workbench.run_due_releases(), 0);
    alice.clock.advance(RELEASE_GRACE);
    assert_eq!(alice.workbench.run_due_releases(), 1);
    assert!(!lock_path(&cloud).exists());
    Ok(())
}

#[test]
fn push_blocked_by_foreign_lock() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("userA")?;
    let cloud = net.cloud_path("stock.grid");
    fs::write(lock_path(&cloud), "userB")?;

    let alice = net.peer_mut(a);
    let canonical = with_canonical(alice, &[("BoltM6", "P1", 10, "")])?;
    let before = fs::read(&canonical)?;
    alice.workbench.set_cell(1, STOCK, Cell::Integer(99));

    match alice.workbench.push_to_cloud() {
        Err(EngineError::LockConflict { owner, .. }) => assert_eq!(owner, "userB"),
        other => panic!("expected lock conflict, got {other:?}"),
    }
    assert_eq!(alice.workbench.sync_state(), SyncState::Conflict);
    assert_eq!(fs::read(&canonical)?, before);
    assert!(!cloud.exists());
    assert_eq!(fs::read_to_string(lock_path(&cloud))?, "userB");

    // The conflict clears as soon as the other user lets go.
    fs::remove_file(lock_path(&cloud))?;
    alice.workbench.push_to_cloud()?;
    assert_eq!(alice.workbench.sync_state(), SyncState::Synced);
    Ok(())
}

#[test]
fn stale_foreign_lock_is_overridden() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = net.cloud_path("stock.grid");
    fs::write(lock_path(&cloud), "bob")?;
    net.clock().advance(Duration::from_secs(400));

    let alice = net.peer_mut(a);
    with_canonical(alice, &[("Bolt", "P1", 1, "")])?;
    alice.workbench.push_to_cloud()?;
    assert_eq!(fs::read_to_string(lock_path(&cloud))?, "alice");
    Ok(())
}

#[test]
fn failed_copy_releases_lock_at_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = net.cloud_path("stock.grid");
    let alice = net.peer_mut(a);
    with_canonical(alice, &[("Bolt", "P1", 1, "")])?;

    alice.fs.fail_copy.set(true);
    assert!(matches!(alice.workbench.push_to_cloud(), Err(EngineError::Io(_))));
    assert_eq!(alice.workbench.sync_state(), SyncState::Offline);
    assert!(!lock_path(&cloud).exists());
    assert!(alice.workbench.sync_coordinator().pending_releases().is_empty());
    assert!(alice.saw(|e| matches!(e, EngineEvent::ErrorOccurred(_))));
    Ok(())
}

#[test]
fn push_prerequisites_leave_state_alone() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let alice = net.peer_mut(a);
    let initial = alice.workbench.sync_state();

    assert!(matches!(
        alice.workbench.push_to_cloud(),
        Err(EngineError::NotConfigured(_))
    ));

    with_canonical(alice, &[])?;
    alice.workbench.set_user_role(Role::Viewer)?;
    assert!(matches!(
        alice.workbench.push_to_cloud(),
        Err(EngineError::Permission { .. })
    ));
    assert_eq!(alice.workbench.sync_state(), initial);
    Ok(())
}

#[test]
fn push_from_cloud_folder_saves_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = write_grid(&net.cloud_path("stock.grid"), &stock_rows(&[("Bolt", "", 1, "")]))?;
    let alice = net.peer_mut(a);
    alice.workbench.load(&cloud)?;

    let outcome = alice.workbench.push_to_cloud()?;
    assert!(matches!(outcome, PushOutcome::SavedInPlace(_)));
    assert!(!lock_path(&cloud).exists());
    Ok(())
}

#[test]
fn push_of_missing_cloud_file_saves_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = write_grid(&net.cloud_path("stock.grid"), &stock_rows(&[("Bolt", "", 1, "")]))?;
    let alice = net.peer_mut(a);
    alice.workbench.load(&cloud)?;
    // Another machine is halfway through replacing the cloud copy.
    fs::remove_file(&cloud)?;

    let outcome = alice.workbench.push_to_cloud()?;
    assert_eq!(outcome, PushOutcome::SavedInPlace(cloud.clone()));
    assert!(cloud.exists());
    assert!(!lock_path(&cloud).exists());
    assert_eq!(alice.workbench.sync_state(), SyncState::Synced);
    Ok(())
}

#[test]
fn failed_lock_write_leaves_no_sentinel() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let cloud = net.cloud_path("stock.grid");
    let alice = net.peer_mut(a);
    let canonical = with_canonical(alice, &[("Bolt", "P1", 1, "")])?;
    let before = fs::read(&canonical)?;

    alice.fs.fail_write.set(true);
    assert!(matches!(alice.workbench.push_to_cloud(), Err(EngineError::Io(_))));
    assert_eq!(alice.workbench.sync_state(), SyncState::Offline);
    assert!(!lock_path(&cloud).exists());
    assert!(!cloud.exists());
    assert_eq!(fs::read(&canonical)?, before);
    assert!(alice.workbench.sync_coordinator().pending_releases().is_empty());
    Ok(())
}

// ============================================================================
// Pull
// ============================================================================

#[test]
fn pull_replaces_local_canonical() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let b = net.add_peer("bob")?;
    let cloud = net.cloud_path("stock.grid");

    with_canonical(net.peer_mut(a), &[("Bolt", "P1", 42, "Acme")])?;
    net.peer_mut(a).workbench.push_to_cloud()?;
    net.clock().advance(RELEASE_GRACE);
    net.peer_mut(a).workbench.run_due_releases();

    let bob = net.peer_mut(b);
    let canonical = with_canonical(bob, &[("Nut", "N1", 1, "")])?;
    let outcome = bob.workbench.pull_from_cloud()?;

    assert_eq!(outcome.cloud_path, cloud);
    assert_eq!(outcome.working_path, canonical);
    assert_eq!(bob.workbench.current_file(), Some(canonical.as_path()));
    assert_eq!(bob.workbench.find_by_name("bolt"), Some(1));
    assert_eq!(bob.workbench.find_by_name("nut"), None);
    assert_eq!(fs::read(&canonical)?, fs::read(&cloud)?);
    assert_eq!(bob.workbench.sync_state(), SyncState::Synced);
    Ok(())
}

#[test]
fn pull_keeps_cloud_copy_when_local_copy_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let b = net.add_peer("bob")?;
    let cloud = net.cloud_path("stock.grid");

    with_canonical(net.peer_mut(a), &[("Bolt", "P1", 42, "")])?;
    net.peer_mut(a).workbench.push_to_cloud()?;
    net.peer_mut(a).workbench.flush_releases();

    let bob = net.peer_mut(b);
    with_canonical(bob, &[])?;
    bob.fs.fail_copy.set(true);
    let outcome = bob.workbench.pull_from_cloud()?;

    assert_eq!(outcome.working_path, cloud);
    assert_eq!(bob.workbench.current_file(), Some(cloud.as_path()));
    assert_eq!(bob.workbench.find_by_name("Bolt"), Some(1));
    assert!(bob.saw(|e| matches!(e, EngineEvent::Warning(_))));
    assert_eq!(bob.workbench.sync_state(), SyncState::Synced);
    Ok(())
}

#[test]
fn pull_waits_for_foreign_lock() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let b = net.add_peer("bob")?;

    with_canonical(net.peer_mut(a), &[("Bolt", "P1", 42, "")])?;
    net.peer_mut(a).workbench.push_to_cloud()?;
    with_canonical(net.peer_mut(b), &[])?;

    match net.peer_mut(b).workbench.pull_from_cloud() {
        Err(EngineError::LockConflict { owner, .. }) => assert_eq!(owner, "alice"),
        other => panic!("expected lock conflict, got {other:?}"),
    }
    assert_eq!(net.peer(b).workbench.sync_state(), SyncState::Conflict);

    net.clock().advance(RELEASE_GRACE);
    net.peer_mut(a).workbench.run_due_releases();
    net.peer_mut(b).workbench.pull_from_cloud()?;
    assert_eq!(net.peer(b).workbench.sync_state(), SyncState::Synced);
    Ok(())
}

#[test]
fn pull_without_cloud_copy_goes_offline() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let b = net.add_peer("bob")?;
    let bob = net.peer_mut(b);
    with_canonical(bob, &[("Nut", "", 1, "")])?;

    assert!(matches!(
        bob.workbench.pull_from_cloud(),
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(bob.workbench.sync_state(), SyncState::Offline);
    assert_eq!(bob.workbench.find_by_name("Nut"), Some(1));
    Ok(())
}

// ============================================================================
// Update checks
// ============================================================================

#[test]
fn newer_cloud_copy_raises_conflict_event() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let a = net.add_peer("alice")?;
    let b = net.add_peer("bob")?;
    let cloud = net.cloud_path("stock.grid");

    with_canonical(net.peer_mut(a), &[("Bolt", "P1", 42, "")])?;
    net.peer_mut(a).workbench.push_to_cloud()?;
    net.peer_mut(a).workbench.flush_releases();

    let bob = net.peer_mut(b);
    let local = with_canonical(bob, &[])?;
    let now = SystemTime::now();
    set_mtime(&cloud, now)?;
    set_mtime(&local, now - Duration::from_secs(60))?;

    let state = bob.workbench.sync_state();
    assert!(bob.workbench.check_for_updates());
    assert!(bob.saw(|e| matches!(e, EngineEvent::ConflictDetected(_))));
    assert_eq!(bob.workbench.sync_state(), state);

    bob.take_events();
    set_mtime(&local, now)?;
    assert!(!bob.workbench.check_for_updates());

    set_mtime(&local, now + Duration::from_secs(60))?;
    assert!(!bob.workbench.check_for_updates());
    assert!(!bob.saw(|e| matches!(e, EngineEvent::ConflictDetected(_))));
    Ok(())
}

#[test]
fn no_cloud_copy_means_no_update() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new()?;
    let b = net.add_peer("bob")?;
    let bob = net.peer_mut(b);
    with_canonical(bob, &[])?;
    assert!(!bob.workbench.check_for_updates());
    Ok(())
}
