//! Handle lifecycle tests against the in-process engine.

use std::path::Path;

use lvmkit::{Engine, Error, Lvm, OpenMode, engine::MemoryEngine};
use tempfile::TempDir;

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

fn seed(dir: &Path, devices: &[&str]) {
    let mut engine = MemoryEngine::init(Some(dir));
    assert_eq!(engine.errno(), 0, "{}", engine.errmsg());
    for d in devices {
        engine.add_device(d, GIB).expect("add device");
    }
}

fn lvm_code(err: &Error) -> i32 {
    match err {
        Error::Lvm { code, .. } => *code,
        other => panic!("expected an engine error, got {other:?}"),
    }
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn closing_the_session_invalidates_children() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);

    let mut lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    let lv = vg.create_lv_linear("data", 8 * MIB).unwrap();
    let pv = vg.list_pvs().unwrap().remove(0);

    lvm.close();
    lvm.close();

    assert!(vg.name().unwrap_err().is_closed());
    assert!(lv.size().unwrap_err().is_closed());
    assert!(pv.size().unwrap_err().is_closed());
    assert!(lvm.list_vg_names().unwrap_err().is_closed());
    vg.close();
}

#[test]
fn dropping_the_session_invalidates_children() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);

    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    drop(lvm);

    assert!(vg.uuid().unwrap_err().is_closed());
}

#[test]
fn version_mentions_engine() {
    let lvm = Lvm::in_memory(None).unwrap();
    assert!(lvm.version().unwrap().contains("memory"));
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn create_and_extend_persist_for_a_fresh_session() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb", "/dev/sdc"]);

    {
        let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
        let mut vg = lvm.vg_create("vg0").unwrap();
        vg.extend("/dev/sdb").unwrap();
        vg.extend("/dev/sdc").unwrap();
        vg.create_lv_linear("data", 100 * MIB).unwrap();
    }

    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    assert_eq!(lvm.list_vg_names().unwrap(), vec!["vg0".to_string()]);
    assert_eq!(lvm.list_vg_uuids().unwrap().len(), 1);

    let vg = lvm.vg_open("vg0", OpenMode::Read).unwrap();
    assert_eq!(vg.pv_count().unwrap(), 2);
    let names: Vec<String> = vg
        .list_pvs()
        .unwrap()
        .iter()
        .map(|pv| pv.name().unwrap())
        .collect();
    assert_eq!(names, vec!["/dev/sdb", "/dev/sdc"]);

    let lvs = vg.list_lvs().unwrap();
    assert_eq!(lvs.len(), 1);
    assert_eq!(lvs[0].size().unwrap(), 100 * MIB);

    assert_eq!(lvm.vg_name_from_device("/dev/sdc").unwrap(), "vg0");
    let pvid = vg.list_pvs().unwrap()[0].uuid().unwrap();
    assert_eq!(lvm.vg_name_from_pvid(&pvid).unwrap(), "vg0");
}

#[test]
fn unwritten_lv_changes_are_dropped_with_the_handle() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);
    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();

    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    vg.create_lv_linear("data", 8 * MIB).unwrap();
    vg.close();

    {
        let vg = lvm.vg_open("vg0", OpenMode::Write).unwrap();
        let lv = vg.list_lvs().unwrap().remove(0);
        lv.resize(64 * MIB).unwrap();
        lv.add_tag("pending").unwrap();
        assert_eq!(lv.size().unwrap(), 64 * MIB);
    }
    {
        let vg = lvm.vg_open("vg0", OpenMode::Read).unwrap();
        let lv = vg.list_lvs().unwrap().remove(0);
        assert_eq!(lv.size().unwrap(), 8 * MIB);
        assert!(lv.tags().unwrap().is_empty());
    }

    let mut vg = lvm.vg_open("vg0", OpenMode::Write).unwrap();
    let lv = vg.list_lvs().unwrap().remove(0);
    lv.resize(64 * MIB).unwrap();
    vg.write().unwrap();
    vg.close();

    let vg = lvm.vg_open("vg0", OpenMode::Read).unwrap();
    assert_eq!(vg.list_lvs().unwrap()[0].size().unwrap(), 64 * MIB);
}

#[test]
fn scan_picks_up_changes_from_another_session() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);

    let watcher = Lvm::in_memory(Some(tmp.path())).unwrap();
    assert!(watcher.list_vg_names().is_err());

    let writer = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = writer.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();

    assert_eq!(watcher.scan().unwrap(), 0);
    assert_eq!(watcher.list_vg_names().unwrap(), vec!["vg0".to_string()]);
}

#[test]
fn sessions_sharing_a_dir_keep_each_others_vgs() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb", "/dev/sdc"]);

    let a = Lvm::in_memory(Some(tmp.path())).unwrap();
    let b = Lvm::in_memory(Some(tmp.path())).unwrap();

    let mut vg1 = b.vg_create("vg1").unwrap();
    vg1.extend("/dev/sdc").unwrap();
    let mut vg0 = a.vg_create("vg0").unwrap();
    vg0.extend("/dev/sdb").unwrap();

    let fresh = Lvm::in_memory(Some(tmp.path())).unwrap();
    assert_eq!(
        fresh.list_vg_names().unwrap(),
        vec!["vg0".to_string(), "vg1".to_string()]
    );
    assert_eq!(fresh.vg_name_from_device("/dev/sdc").unwrap(), "vg1");
}

#[test]
fn device_claimed_by_another_session_is_busy() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);

    let a = Lvm::in_memory(Some(tmp.path())).unwrap();
    let b = Lvm::in_memory(Some(tmp.path())).unwrap();

    let mut vgx = b.vg_create("vgx").unwrap();
    vgx.extend("/dev/sdb").unwrap();

    let mut vgy = a.vg_create("vgy").unwrap();
    let err = vgy.extend("/dev/sdb").unwrap_err();
    assert_eq!(lvm_code(&err), libc::EBUSY);
    assert!(vgy.is_closed());

    let fresh = Lvm::in_memory(Some(tmp.path())).unwrap();
    assert_eq!(fresh.list_vg_names().unwrap(), vec!["vgx".to_string()]);
}

// =============================================================================
// List asymmetry
// =============================================================================

#[test]
fn empty_pv_list_is_fine_but_empty_vg_list_is_an_error() {
    let lvm = Lvm::in_memory(None).unwrap();
    let vg = lvm.vg_create("fresh").unwrap();
    assert!(vg.list_pvs().unwrap().is_empty());
    assert!(vg.list_lvs().is_err());

    let err = lvm.list_vg_names().unwrap_err();
    assert!(matches!(err, Error::Lvm { .. }), "err was: {err:?}");
}

// =============================================================================
// Failure contracts
// =============================================================================

#[test]
fn read_mode_mutators_report_code_and_message() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb", "/dev/sdc"]);
    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    vg.close();

    let mut ro = lvm.vg_open("vg0", OpenMode::Read).unwrap();
    let err = ro.extend("/dev/sdc").unwrap_err();
    assert_eq!(lvm_code(&err), libc::EPERM);
    assert!(err.to_string().contains("read-only"), "err was: {err}");
    assert!(ro.is_closed());

    let ro = lvm.vg_open("vg0", OpenMode::Read).unwrap();
    let err = ro.create_lv_linear("data", MIB).unwrap_err();
    assert_eq!(lvm_code(&err), libc::EPERM);
    assert!(!ro.is_closed());
}

#[test]
fn failed_vg_mutator_closes_vg_but_failed_lv_mutator_does_not() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);
    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    let lv = vg.create_lv_linear("data", 8 * MIB).unwrap();

    assert!(lv.add_tag("not a tag").is_err());
    assert_eq!(lv.name().unwrap(), "data");
    lv.add_tag("ok").unwrap();

    let err = vg.add_tag("not a tag").unwrap_err();
    assert!(matches!(err, Error::Lvm { .. }), "err was: {err:?}");
    assert!(vg.is_closed());
    assert!(vg.name().unwrap_err().is_closed());
    assert!(lv.name().unwrap_err().is_closed());
}

#[test]
fn tags_round_trip() {
    let mut engine = MemoryEngine::new();
    engine.add_device("/dev/sdb", GIB).unwrap();
    let lvm = Lvm::with_engine(Box::new(engine)).unwrap();

    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    vg.add_tag("site=a").unwrap();
    vg.add_tag("backup").unwrap();
    let mut tags = vg.tags().unwrap();
    tags.sort();
    assert_eq!(tags, vec!["backup", "site=a"]);
    vg.remove_tag("site=a").unwrap();
    vg.remove_tag("backup").unwrap();
    assert!(vg.tags().unwrap().is_empty());

    let lv = vg.create_lv_linear("data", MIB).unwrap();
    lv.add_tag("x").unwrap();
    assert_eq!(lv.tags().unwrap(), vec!["x"]);
    lv.remove_tag("x").unwrap();
    assert!(lv.tags().unwrap().is_empty());
}

#[test]
fn vg_remove_needs_an_empty_vg() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), &["/dev/sdb"]);
    let lvm = Lvm::in_memory(Some(tmp.path())).unwrap();
    let mut vg = lvm.vg_create("vg0").unwrap();
    vg.extend("/dev/sdb").unwrap();
    vg.create_lv_linear("data", MIB).unwrap();
    vg.close();

    let mut vg = lvm.vg_open("vg0", OpenMode::Write).unwrap();
    assert_eq!(lvm_code(&vg.remove().unwrap_err()), libc::EBUSY);
    assert!(vg.is_closed());

    let mut vg = lvm.vg_open("vg0", OpenMode::Write).unwrap();
    vg.list_lvs().unwrap()[0].remove().unwrap();
    vg.remove().unwrap();
    vg.close();
    assert!(lvm.list_vg_names().is_err());
    assert!(lvm.vg_name_from_device("/dev/sdb").is_err());
}
