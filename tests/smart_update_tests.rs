/// Smart update tests
///
/// A detached revision of a persisted graph is mapped onto the graph loaded
/// by a second context and saved.
/// Run with: cargo test --test smart_update_tests
mod common;

use common::*;
use rustmemomap::{DbError, Entity, Mapper, MergePolicy, OrphanPolicy, UnmatchedKeyPolicy};

#[test]
fn test_smart_update_scenario() {
    let db = fresh_db();
    let x1 = seed(&db);
    let y1 = x1.y_list[0].clone();
    let z2 = y1.z_list[1].clone();

    let detached = detached_revision(&x1);

    let mut ctx = context(&db);
    let mut x1_from_db: X = ctx.load(x1.id, 2).unwrap();
    mapper().map(detached, &mut x1_from_db).unwrap();
    let summary = ctx.save(&mut x1_from_db).unwrap();

    assert_eq!(x1_from_db.name, "Initial X1 (Updated)");
    assert_eq!(x1_from_db.y_list.len(), 1);
    let y = &x1_from_db.y_list[0];
    assert_eq!(y.name, "Initial X1-Y1 (Updated)");
    assert_eq!(y.z_list.len(), 2);

    let updated: Vec<&Z> = y.z_list.iter().filter(|z| z.id == z2.id).collect();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].name, "Initial X1-Y1-Z1 (Updated)");

    let inserted: Vec<&Z> = y.z_list.iter().filter(|z| z.id != z2.id).collect();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].name, "Initial X1-Y1-Z1 (Inserted)");
    assert_ne!(inserted[0].id, 0);
    assert_eq!(inserted[0].y_id, y1.id);

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 3);
    assert_eq!(summary.deleted, 1);
}

#[test]
fn test_saved_revision_is_what_storage_holds() {
    let db = fresh_db();
    let x1 = seed(&db);
    let z1_id = x1.y_list[0].z_list[0].id;

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    mapper().map(detached_revision(&x1), &mut loaded).unwrap();
    ctx.save(&mut loaded).unwrap();

    let reread: X = context(&db).load(x1.id, 2).unwrap();
    assert_eq!(reread.name, "Initial X1 (Updated)");
    assert_eq!(
        z_names(&reread),
        vec!["Initial X1-Y1-Z1 (Updated)", "Initial X1-Y1-Z1 (Inserted)"]
    );
    assert_eq!(db.row_count(Z::TABLE).unwrap(), 2);
    assert_eq!(db.get_row(Z::TABLE, z1_id).unwrap(), None);
}

#[test]
fn test_matched_elements_keep_identity() {
    let db = fresh_db();
    let x1 = seed(&db);
    let detached = detached_revision(&x1);
    let detached_y_tag = detached.y_list[0].uid;

    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();
    let x_tag = loaded.uid;
    let y_tag = loaded.y_list[0].uid;
    let z2_tag = loaded.y_list[0].z_list[1].uid;

    mapper().map(detached, &mut loaded).unwrap();

    let y = &loaded.y_list[0];
    assert_eq!(loaded.uid, x_tag);
    assert_eq!(y.uid, y_tag);
    assert_ne!(y.uid, detached_y_tag);
    assert_eq!(y.id, x1.y_list[0].id);
    assert_eq!(y.x_id, x1.id);

    let z2 = &y.z_list[0];
    assert_eq!(z2.uid, z2_tag);
    assert_eq!(z2.id, x1.y_list[0].z_list[1].id);
    assert_eq!(z2.y_id, y.id);
}

#[test]
fn test_merge_report_counts_every_level() {
    let db = fresh_db();
    let x1 = seed(&db);
    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();

    let report = mapper().map(detached_revision(&x1), &mut loaded).unwrap();

    assert_eq!(report.stats("X").updated, 1);
    assert_eq!(report.stats("Y").updated, 1);
    let z = report.stats("Z");
    assert_eq!((z.updated, z.inserted, z.removed), (1, 1, 1));
    assert_eq!(report.total().inserted, 1);
}

#[test]
fn test_mirror_merge_is_a_noop() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let before = loaded.clone();

    let report = mapper().map(loaded.clone(), &mut loaded).unwrap();
    assert!(report.is_structurally_unchanged());
    assert_eq!(loaded, before);

    let summary = ctx.save(&mut loaded).unwrap();
    assert_eq!((summary.inserted, summary.updated, summary.deleted), (0, 0, 0));
    assert!(summary.is_empty());
}

#[test]
fn test_second_save_writes_nothing() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    mapper().map(detached_revision(&x1), &mut loaded).unwrap();
    ctx.save(&mut loaded).unwrap();

    let again = ctx.save(&mut loaded).unwrap();
    assert!(again.is_empty());
}

#[test]
fn test_removing_a_child_removes_its_subtree() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let detached = X {
        id: x1.id,
        name: x1.name.clone(),
        ..Default::default()
    };
    mapper().map(detached, &mut loaded).unwrap();
    assert!(loaded.y_list.is_empty());

    let summary = ctx.save(&mut loaded).unwrap();
    assert_eq!(summary.deleted, 3);
    assert_eq!(summary.count_for(Z::TABLE), 2);
    assert_eq!(db.row_count(Y::TABLE).unwrap(), 0);
    assert_eq!(db.row_count(Z::TABLE).unwrap(), 0);
    assert_eq!(db.row_count(X::TABLE).unwrap(), 1);
}

#[test]
fn test_new_child_brings_its_children() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let mut detached = loaded.clone();
    detached
        .y_list
        .push(Y::new("X1-Y2", vec![Z::new("X1-Y2-Z1"), Z::new("X1-Y2-Z2")]));

    mapper().map(detached, &mut loaded).unwrap();
    let summary = ctx.save(&mut loaded).unwrap();

    assert_eq!(summary.inserted, 3);
    let y2 = &loaded.y_list[1];
    assert_ne!(y2.id, 0);
    assert_eq!(y2.x_id, x1.id);
    assert!(y2.z_list.iter().all(|z| z.id != 0 && z.y_id == y2.id));
    assert_eq!(db.row_count(Z::TABLE).unwrap(), 4);
}

#[test]
fn test_duplicate_key_leaves_graph_unchanged() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let before = loaded.clone();

    let mut detached = detached_revision(&x1);
    let twin = detached.y_list[0].z_list[0].clone();
    detached.y_list[0].z_list.push(twin);

    let err = mapper().map(detached, &mut loaded).unwrap_err();
    match err {
        DbError::DuplicateKey { entity, key } => {
            assert_eq!(entity, "Z");
            assert_eq!(key, x1.y_list[0].z_list[1].id.to_string());
        }
        other => panic!("Expected DuplicateKey, got {:?}", other),
    }
    assert_eq!(loaded, before);
    assert!(ctx.save(&mut loaded).unwrap().is_empty());
}

#[test]
fn test_dangling_reference_rejected() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();
    let before = loaded.clone();

    let mut detached = detached_revision(&x1);
    detached.y_list[0].z_list[1].id = 999;

    let err = mapper().map(detached, &mut loaded).unwrap_err();
    assert!(matches!(
        err,
        DbError::DanglingReference { ref entity, ref key } if entity == "Z" && key == "999"
    ));
    assert_eq!(loaded, before);
}

#[test]
fn test_new_child_with_keyed_children_rejected() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();
    let before = loaded.clone();

    let existing_z = x1.y_list[0].z_list[0].id;
    let mut detached = detached_revision(&x1);
    let mut keyed = Z::new("Borrowed");
    keyed.id = existing_z;
    detached.y_list.push(Y::new("Second", vec![keyed]));

    let err = mapper().map(detached, &mut loaded).unwrap_err();
    assert_eq!(
        err,
        DbError::DanglingReference {
            entity: "Z".into(),
            key: existing_z.to_string()
        }
    );
    assert_eq!(loaded, before);
}

#[test]
fn test_duplicate_child_keys_rejected() {
    let db = fresh_db();
    let x1 = seed(&db);

    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();
    let before = loaded.clone();

    let mut detached = detached_revision(&x1);
    let twin = detached.y_list[0].clone();
    detached.y_list.push(twin);

    let err = mapper().map(detached, &mut loaded).unwrap_err();
    match err {
        DbError::DuplicateKey { entity, key } => {
            assert_eq!(entity, "Y");
            assert_eq!(key, x1.y_list[0].id.to_string());
        }
        other => panic!("Expected DuplicateKey, got {:?}", other),
    }
    assert_eq!(loaded, before);
}

#[test]
fn test_insert_as_new_policy_discards_unknown_key() {
    let db = fresh_db();
    let x1 = seed(&db);
    let mapper = Mapper::new(mapper_config(
        MergePolicy::default().unmatched_key(UnmatchedKeyPolicy::InsertAsNew),
    ));

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let mut detached = detached_revision(&x1);
    detached.y_list[0].z_list[1].id = 999;

    mapper.map(detached, &mut loaded).unwrap();
    let summary = ctx.save(&mut loaded).unwrap();

    let inserted = &loaded.y_list[0].z_list[1];
    assert_eq!(summary.inserted, 1);
    assert_ne!(inserted.id, 0);
    assert_ne!(inserted.id, 999);
    assert_eq!(db.get_row(Z::TABLE, 999).unwrap(), None);
}

#[test]
fn test_retain_policy_keeps_unmatched_children() {
    let db = fresh_db();
    let x1 = seed(&db);
    let mapper = Mapper::new(mapper_config(MergePolicy::default().orphans(OrphanPolicy::Retain)));

    let mut ctx = context(&db);
    let mut loaded: X = ctx.load(x1.id, 2).unwrap();
    let mut detached = detached_revision(&x1);
    detached.y_list[0].z_list.remove(0);

    mapper.map(detached, &mut loaded).unwrap();
    let summary = ctx.save(&mut loaded).unwrap();

    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.inserted, 1);
    assert_eq!(
        z_names(&loaded),
        vec!["Initial X1-Y1-Z1", "Initial X1-Y1-Z2", "Initial X1-Y1-Z1 (Inserted)"]
    );
    assert_eq!(db.row_count(Z::TABLE).unwrap(), 3);
}

#[test]
fn test_root_key_mismatch() {
    let db = fresh_db();
    let x1 = seed(&db);
    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();

    let mut detached = detached_revision(&x1);
    detached.id = x1.id + 1;

    let err = mapper().map(detached, &mut loaded).unwrap_err();
    assert!(matches!(err, DbError::KeyMismatch { .. }));
    assert_eq!(loaded.name, "Initial X1");
}

#[test]
fn test_missing_child_mapping() {
    let db = fresh_db();
    let x1 = seed(&db);
    let partial = rustmemomap::MapperConfig::builder()
        .entity(rustmemomap::EntityMap::new("X", |x: &X| x.id, apply_x))
        .entity(rustmemomap::EntityMap::new("Y", |y: &Y| y.id, apply_y))
        .build()
        .unwrap();

    let mut loaded: X = context(&db).load(x1.id, 2).unwrap();
    let before = loaded.clone();
    let err = Mapper::new(partial)
        .map(detached_revision(&x1), &mut loaded)
        .unwrap_err();

    assert!(matches!(err, DbError::MappingNotConfigured(ref name) if name.contains("Z")));
    assert_eq!(loaded, before);
}
