mod common;

use std::fs;

use common::{barrel, gate, host, test_dir, Barrel, Gate, Ledger, Lever};
use save::bundle_io::{encode_bundle, read_bundle, write_bundle_files, SaveBundle};
use save::scene_cache::RegisterOutcome;
use save::scene_host::SceneHost;
use save::type_registry::reference::ObjectRef;
use save::{SaveError, SaveSubsystem, SceneName, SharedObject};

const VERSION: &str = "1.0";

fn write_and_read(subsystem: &SaveSubsystem, bundle: &SaveBundle, name: &str) -> SaveBundle {
    let dir = test_dir(name);
    let encoded = encode_bundle(bundle, VERSION, true).unwrap();
    write_bundle_files(&dir, &encoded, false).unwrap();
    let back = read_bundle(&dir, &subsystem.tracked_scenes(), VERSION)
        .unwrap()
        .unwrap();
    let _ = fs::remove_dir_all(&dir);
    back
}

#[test]
fn test_round_trip_restores_fields_references_and_dynamics() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();

    let gate_obj = host.spawn(SharedObject::new(gate("Harbor", true, "1234")));
    let lever_obj = host.spawn(SharedObject::new(Lever {
        uid: save::UniqueId::generate(),
        go: save::GameObject::in_scene("Harbor"),
        pulled: true,
        target: ObjectRef::to_object(&gate_obj).unwrap(),
    }));
    let ledger_obj = host.spawn(SharedObject::new(Ledger {
        coins: 250,
        ..Default::default()
    }));
    let barrel_obj = host.spawn(SharedObject::new(barrel("Harbor", 0.75)));
    subsystem.dynamic_mut().track(&barrel_obj);

    let bundle = subsystem.capture_bundle(host.as_ref());
    assert_eq!(bundle.record_count(), 4);
    let back = write_and_read(&subsystem, &bundle, "round_trip");
    assert_eq!(back.record_count(), 4);

    gate_obj.with_mut::<Gate, _>(|g| {
        g.open = false;
        g.code.clear();
    });
    lever_obj.with_mut::<Lever, _>(|l| {
        l.pulled = false;
        l.target = ObjectRef::none();
    });
    ledger_obj.with_mut::<Ledger, _>(|l| l.coins = 0);
    barrel_obj.with_mut::<Barrel, _>(|b| b.fill = 0.0);

    let report = subsystem.apply_bundle(back, host.as_ref());
    assert_eq!(report.destroyed, 0);
    assert_eq!(report.created, 0);
    assert_eq!(report.restored, 4);

    assert_eq!(gate_obj.with::<Gate, _>(|g| (g.open, g.code.clone())), Some((true, "1234".to_string())));
    assert_eq!(lever_obj.with::<Lever, _>(|l| l.pulled), Some(true));
    let target = lever_obj.with::<Lever, _>(|l| l.target.get().cloned()).flatten();
    assert!(target.is_some_and(|t| t.ptr_eq(&gate_obj)));
    assert_eq!(ledger_obj.with::<Ledger, _>(|l| l.coins), Some(250));
    assert_eq!(barrel_obj.with::<Barrel, _>(|b| b.fill), Some(0.75));
}

#[test]
fn test_ids_survive_a_round_trip() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    let gate_obj = host.spawn(SharedObject::new(gate("Harbor", true, "a")));
    let id = gate_obj.id().unwrap();

    let bundle = subsystem.capture_bundle(host.as_ref());
    let back = write_and_read(&subsystem, &bundle, "ids");
    let record = &back.scenes[&SceneName::from("Harbor")][&id];
    assert_eq!(record.header.id, id);
    assert_eq!(record.header.association_id, id.association_id());
    assert_eq!(record.header.type_name, "Gate");
}

#[test]
fn test_missing_dynamic_is_recreated_from_prefab() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    let barrel_obj = host.spawn(SharedObject::new(barrel("Harbor", 0.5)));
    subsystem.dynamic_mut().track(&barrel_obj);
    let id = barrel_obj.id().unwrap();
    let bundle = subsystem.capture_bundle(host.as_ref());

    host.destroy(&barrel_obj);
    subsystem.dynamic_mut().mark_destroyed(&id);
    drop(barrel_obj);

    let report = subsystem.apply_bundle(bundle, host.as_ref());
    assert_eq!(report.created, 1);
    let recreated = subsystem
        .find(&id, host.as_ref())
        .expect("barrel recreated under its saved id");
    assert_eq!(recreated.with::<Barrel, _>(|b| b.fill), Some(0.5));
    assert_eq!(recreated.scene(), SceneName::from("Harbor"));
}

#[test]
fn test_destroyed_dynamic_never_comes_back() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    let barrel_obj = host.spawn(SharedObject::new(barrel("Harbor", 1.0)));
    subsystem.dynamic_mut().track(&barrel_obj);
    let id = barrel_obj.id().unwrap();

    host.destroy(&barrel_obj);
    subsystem.dynamic_mut().mark_destroyed(&id);
    drop(barrel_obj);

    let bundle = subsystem.capture_bundle(host.as_ref());
    assert!(bundle.dynamic.values().all(|records| !records.contains_key(&id)));
    let report = subsystem.apply_bundle(bundle, host.as_ref());
    assert_eq!(report.created, 0);
    assert!(!subsystem.is_tracked(&id));
    assert!(host
        .loaded_objects(&SceneName::from("Harbor"))
        .iter()
        .all(|o| !o.is::<Barrel>()));
}

#[test]
fn test_dynamic_absent_from_bundle_is_destroyed() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    let bundle = subsystem.capture_bundle(host.as_ref());

    let barrel_obj = host.spawn(SharedObject::new(barrel("Harbor", 1.0)));
    subsystem.dynamic_mut().track(&barrel_obj);
    let report = subsystem.apply_bundle(bundle, host.as_ref());
    assert_eq!(report.destroyed, 1);
    assert_eq!(host.object_count(), 0);
}

#[test]
fn test_missing_scene_file_leaves_scene_untouched() {
    let host = host(&["Harbor", "Cellar"]);
    let mut subsystem = SaveSubsystem::default();
    let harbor_gate = host.spawn(SharedObject::new(gate("Harbor", true, "h")));
    let cellar_gate = host.spawn(SharedObject::new(gate("Cellar", true, "c")));

    let dir = test_dir("partial");
    let bundle = subsystem.capture_bundle(host.as_ref());
    let encoded = encode_bundle(&bundle, VERSION, false).unwrap();
    write_bundle_files(&dir, &encoded, false).unwrap();
    fs::remove_file(dir.join("Cellar.scene")).unwrap();

    harbor_gate.with_mut::<Gate, _>(|g| g.open = false);
    cellar_gate.with_mut::<Gate, _>(|g| g.open = false);

    let back = read_bundle(&dir, &subsystem.tracked_scenes(), VERSION)
        .unwrap()
        .unwrap();
    assert!(back.scenes[&SceneName::from("Cellar")].is_empty());
    subsystem.apply_bundle(back, host.as_ref());

    assert_eq!(harbor_gate.with::<Gate, _>(|g| g.open), Some(true));
    assert_eq!(cellar_gate.with::<Gate, _>(|g| g.open), Some(false));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_duplicate_instance_rejected_and_destroyed() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    let original = gate("Harbor", true, "first");
    let guid = original.uid;
    let first = host.spawn(SharedObject::new(original));
    let second = host.spawn(SharedObject::new(Gate {
        uid: guid,
        go: save::GameObject::in_scene("Harbor"),
        open: false,
        code: "second".into(),
    }));

    assert_eq!(subsystem.register(&first), RegisterOutcome::Registered);
    assert_eq!(subsystem.register(&first), RegisterOutcome::AlreadyRegistered);
    assert_eq!(
        subsystem.register_or_destroy(&second, host.as_ref()),
        RegisterOutcome::Duplicate
    );
    assert_eq!(host.object_count(), 1);
    let found = subsystem.find(&first.id().unwrap(), host.as_ref()).unwrap();
    assert!(found.ptr_eq(&first));
}

#[test]
fn test_other_build_version_rejected() {
    let host = host(&["Harbor"]);
    let mut subsystem = SaveSubsystem::default();
    host.spawn(SharedObject::new(gate("Harbor", true, "v")));
    let dir = test_dir("version");
    let encoded = encode_bundle(&subsystem.capture_bundle(host.as_ref()), "1.0", true).unwrap();
    write_bundle_files(&dir, &encoded, true).unwrap();

    let err = read_bundle(&dir, &[], "1.1").unwrap_err();
    assert!(matches!(err, SaveError::VersionMismatch { .. }));
    let msg = format!("{err}");
    assert!(msg.contains("'1.0'"), "got: {msg}");
    assert!(msg.contains("'1.1'"), "got: {msg}");
    let _ = fs::remove_dir_all(&dir);
}
