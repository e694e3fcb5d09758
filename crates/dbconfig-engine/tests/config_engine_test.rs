//! Integration tests for the config engine over the memory store
//!
//! Covers merge precedence, item writes, revision generation, publish/apply
//! and key rotation end to end.

mod common;

use serde_json::json;

use common::*;
use dbconfig_common::{DbConfigError, ValueCodec};
use dbconfig_engine::{
    BatchGetQuery, ConfigItemOp, GenerateMethod, ItemEdit, LevelInfo, LevelName, OpType,
    OutputFormat, REVISION_LATEST, ReqType, Separator,
};
use dbconfig_persistence::{ConfigItemData, ItemChange, ItemPersistence, RevisionPersistence};

fn edit(node: dbconfig_engine::ConfigNode, items: Vec<ConfigItemOp>) -> ItemEdit {
    ItemEdit::new(node, items)
}

// ============================================================================
// Merge and item writes
// ============================================================================

#[tokio::test]
async fn test_locked_ancestor_takes_precedence() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;
    let items = engine.items();

    let cluster = node(PLAIN_FILE, LevelName::Cluster, "c1");
    let info = LevelInfo::module("m1");
    items
        .save(
            &edit(
                cluster.clone(),
                vec![ConfigItemOp::update("mysqld.character_set_server", "latin1")],
            )
            .with_info(info.clone()),
            OPERATOR,
        )
        .await
        .unwrap();

    // locking a different value at app would change what c1 sees
    let app = node(PLAIN_FILE, LevelName::App, BIZ);
    let lock = edit(
        app,
        vec![ConfigItemOp::update("mysqld.character_set_server", "utf8mb4").locked()],
    );
    let err = domain_err(items.save(&lock, OPERATOR).await.unwrap_err());
    assert!(matches!(err, DbConfigError::DomainConflict(_)));

    items.save(&lock.clone().confirmed(), OPERATOR).await.unwrap();

    let content = items
        .query(&cluster, &info, OutputFormat::SplitMap(Separator::Dot), true)
        .await
        .unwrap();
    assert_eq!(content["mysqld"]["character_set_server"], "utf8mb4");
    assert_eq!(content["mysqld"]["port"], "3306");

    // the lock also blocks new writes below app
    let retry = edit(
        cluster,
        vec![ConfigItemOp::update("mysqld.character_set_server", "utf8")],
    )
    .with_info(info);
    let err = domain_err(items.save(&retry, OPERATOR).await.unwrap_err());
    assert!(matches!(err, DbConfigError::DomainConflict(_)));
}

#[tokio::test]
async fn test_query_is_idempotent_and_records_source_level() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;

    let module = node(PLAIN_FILE, LevelName::Module, "m1");
    engine
        .items()
        .save(
            &edit(module.clone(), vec![ConfigItemOp::update("mysqld.port", "3307")]),
            OPERATOR,
        )
        .await
        .unwrap();

    let info = LevelInfo::default();
    let first = engine.items().merged(&module, &info, true).await.unwrap();
    let second = engine.items().merged(&module, &info, true).await.unwrap();
    assert_eq!(first, second);

    let port = first.iter().find(|i| i.conf_name == "mysqld.port").unwrap();
    assert_eq!(port.conf_value, "3307");
    assert_eq!(port.level_name, Some(LevelName::Module));
    assert!(port.need_restart);

    let charset = first
        .iter()
        .find(|i| i.conf_name == "mysqld.character_set_server")
        .unwrap();
    assert_eq!(charset.level_name, Some(LevelName::Plat));
}

#[tokio::test]
async fn test_add_duplicate_and_validation_errors() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;
    let items = engine.items();
    let app = node(PLAIN_FILE, LevelName::App, BIZ);

    let add = edit(
        app.clone(),
        vec![ConfigItemOp::update("mysqld.port", "3307").with_op(OpType::Add)],
    );
    items.save(&add, OPERATOR).await.unwrap();
    let err = domain_err(items.save(&add, OPERATOR).await.unwrap_err());
    assert!(matches!(err, DbConfigError::DomainConflict(_)));

    let duplicate = edit(
        app.clone(),
        vec![
            ConfigItemOp::update("mysqld.port", "3307"),
            ConfigItemOp::update("mysqld.port", "3308"),
        ],
    );
    let err = domain_err(items.save(&duplicate, OPERATOR).await.unwrap_err());
    assert!(matches!(err, DbConfigError::DomainConflict(_)));

    for (name, value) in [
        ("mysqld.port", "abc"),
        ("mysqld.port", "80"),
        ("mysqld.innodb_buffer_pool_size", "4g"),
        ("mysqld.character_set_server", "gbk"),
        ("mysqld.undefined", "1"),
    ] {
        let bad = edit(app.clone(), vec![ConfigItemOp::update(name, value)]);
        let err = domain_err(items.save(&bad, OPERATOR).await.unwrap_err());
        assert!(
            matches!(err, DbConfigError::InputValidation(_)),
            "{}={} should be rejected",
            name,
            value
        );
    }

    let ok = edit(
        app,
        vec![ConfigItemOp::update("mysqld.innodb_buffer_pool_size", "1g")],
    );
    items.save(&ok, OPERATOR).await.unwrap();
}

#[tokio::test]
async fn test_save_rejects_versioned_file() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;

    let app = node(VERSIONED_FILE, LevelName::App, BIZ);
    let err = domain_err(
        engine
            .items()
            .save(&edit(app, vec![ConfigItemOp::update("mysqld.port", "3307")]), OPERATOR)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::InputValidation(_)));
}

#[tokio::test]
async fn test_plat_writes_edit_name_definitions() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;
    let plat = node(PLAIN_FILE, LevelName::Plat, "0");
    let app = node(PLAIN_FILE, LevelName::App, BIZ);
    let info = LevelInfo::default();

    engine
        .items()
        .save(
            &edit(
                plat.clone(),
                vec![
                    ConfigItemOp::update("mysqld.port", "3310"),
                    ConfigItemOp::update("mysqld.sql_mode", "").with_op(OpType::Add),
                ],
            ),
            OPERATOR,
        )
        .await
        .unwrap();

    let content = engine
        .items()
        .query(&app, &info, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(content["mysqld.port"], "3310");
    assert_eq!(content["mysqld.sql_mode"], "");

    engine
        .items()
        .save(
            &edit(
                plat,
                vec![ConfigItemOp::update("mysqld.port", "").with_op(OpType::Remove)],
            ),
            OPERATOR,
        )
        .await
        .unwrap();
    let content = engine
        .items()
        .query(&app, &info, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert!(content.get("mysqld.port").is_none());

    let names = engine
        .files()
        .list_names(&file(PLAIN_FILE), None, false)
        .await
        .unwrap();
    assert!(names.iter().any(|n| n.conf_name == "mysqld.sql_mode"));
    assert!(!names.iter().any(|n| n.conf_name == "mysqld.port"));
}

#[tokio::test]
async fn test_encrypted_values_at_rest() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;

    let cluster = node(PLAIN_FILE, LevelName::Cluster, "c1");
    let info = LevelInfo::module("m1");
    engine
        .items()
        .save(
            &edit(
                cluster.clone(),
                vec![ConfigItemOp::update("mysqld.admin_password", "s3cret")],
            )
            .with_info(info.clone()),
            OPERATOR,
        )
        .await
        .unwrap();

    let stored = engine.store().item_list(&cluster.key()).await.unwrap();
    assert!(stored[0].conf_value.starts_with("**"));

    let plain = engine
        .items()
        .query(&cluster, &info, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(plain["mysqld.admin_password"], "s3cret");

    let raw = engine
        .items()
        .query(&cluster, &info, OutputFormat::FlatMap, false)
        .await
        .unwrap();
    assert_ne!(raw["mysqld.admin_password"], "s3cret");
}

#[tokio::test]
async fn test_batch_get_reports_crypto_failures() {
    let engine = engine();
    setup_file(&engine, PLAIN_FILE, "").await;
    let info = LevelInfo::module("m1");

    for (cluster, port) in [("c1", "3307"), ("c2", "3308")] {
        engine
            .items()
            .save(
                &edit(
                    node(PLAIN_FILE, LevelName::Cluster, cluster),
                    vec![ConfigItemOp::update("mysqld.port", port)],
                )
                .with_info(info.clone()),
                OPERATOR,
            )
            .await
            .unwrap();
    }

    let query = BatchGetQuery {
        bk_biz_id: BIZ.to_string(),
        file: file(PLAIN_FILE),
        level_name: LevelName::Cluster,
        level_values: vec!["c1".to_string(), "c2".to_string()],
        info: info.clone(),
        conf_names: vec!["mysqld.port".to_string()],
        format: OutputFormat::FlatMap,
    };
    let result = engine.items().batch_get(&query).await.unwrap();
    assert_eq!(result.content["c1"], json!({"mysqld.port": "3307"}));
    assert_eq!(result.content["c2"], json!({"mysqld.port": "3308"}));
    assert!(result.errors.is_empty());

    // corrupt one stored ciphertext behind the engine's back
    let c2 = node(PLAIN_FILE, LevelName::Cluster, "c2");
    engine
        .store()
        .item_apply_changes(
            &c2.key(),
            &[ItemChange::Upsert(ConfigItemData {
                conf_name: "mysqld.admin_password".to_string(),
                conf_value: "**not-base64!".to_string(),
                ..Default::default()
            })],
        )
        .await
        .unwrap();

    let query = BatchGetQuery {
        conf_names: Vec::new(),
        ..query
    };
    let result = engine.items().batch_get(&query).await.unwrap();
    assert!(result.content.contains_key("c1"));
    assert!(result.errors.contains_key("c2"));

    let err = domain_err(
        engine
            .items()
            .query(&c2, &info, OutputFormat::List, true)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::CryptoFailure(_)));
}

// ============================================================================
// Revisions, publish and apply
// ============================================================================

#[tokio::test]
async fn test_upsert_publishes_at_versioned_level() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");

    let module = node(VERSIONED_FILE, LevelName::Module, "m1");
    let saved = engine
        .items()
        .upsert(
            &edit(module, vec![ConfigItemOp::update("mysqld.port", "3307")]),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap();
    assert!(saved.revision.is_none());

    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");
    let saved = engine
        .items()
        .upsert(
            &edit(
                cluster.clone(),
                vec![ConfigItemOp::update("mysqld.character_set_server", "utf8mb4")],
            )
            .with_info(info.clone()),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap();
    let revision = saved.revision.unwrap();
    assert!(revision.is_published);
    assert!(revision.created);
    assert!(revision.revision.starts_with("v_"));

    let status = engine.publisher().status(&cluster).await.unwrap();
    assert_eq!(status.revision_published, revision.revision);
    assert!(!status.is_applied);

    let detail = engine
        .versions()
        .detail(&cluster, REVISION_LATEST, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(detail.info.revision, revision.revision);
    assert_eq!(detail.content["mysqld.port"], "3307");
    assert_eq!(detail.content["mysqld.character_set_server"], "utf8mb4");

    engine
        .publisher()
        .applied(&cluster, &revision.revision, OPERATOR)
        .await
        .unwrap();
    let status = engine.publisher().status(&cluster).await.unwrap();
    assert!(status.is_applied);
    assert_eq!(status.revision_applied, revision.revision);
}

#[tokio::test]
async fn test_publish_state_machine() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");

    let upsert = |port: &'static str| {
        edit(cluster.clone(), vec![ConfigItemOp::update("mysqld.port", port)])
            .with_info(info.clone())
    };

    let r1 = engine
        .items()
        .upsert(&upsert("3307"), ReqType::SaveOnly, OPERATOR)
        .await
        .unwrap()
        .revision
        .unwrap();
    assert!(!r1.is_published);

    let err = domain_err(
        engine
            .publisher()
            .applied(&cluster, &r1.revision, OPERATOR)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::DomainConflict(_)));

    engine
        .publisher()
        .publish(&cluster, &r1.revision, OPERATOR)
        .await
        .unwrap();
    let err = domain_err(
        engine
            .publisher()
            .publish(&cluster, &r1.revision, OPERATOR)
            .await
            .unwrap_err(),
    );
    match err {
        DbConfigError::DomainConflict(msg) => assert!(msg.contains("applied already")),
        other => panic!("unexpected error {:?}", other),
    }

    let r2 = engine
        .items()
        .upsert(&upsert("3308"), ReqType::SaveOnly, OPERATOR)
        .await
        .unwrap()
        .revision
        .unwrap();
    assert!(r2.revision > r1.revision);

    engine
        .publisher()
        .publish(&cluster, &r2.revision, OPERATOR)
        .await
        .unwrap();

    let list = engine.versions().list(&cluster, 0).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].revision, r2.revision);
    assert!(list[0].is_published);
    assert_eq!(list[0].pre_revision, r1.revision);
    assert_eq!(list[0].rows_affected, 1);
    assert!(!list[1].is_published);

    let missing = domain_err(
        engine
            .publisher()
            .publish(&cluster, "v_19700101000000", OPERATOR)
            .await
            .unwrap_err(),
    );
    assert!(matches!(missing, DbConfigError::NotFound(_)));
}

#[tokio::test]
async fn test_same_second_upserts_publish_the_last_write() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");

    let mut revisions = Vec::new();
    for port in ["3307", "3308"] {
        let saved = engine
            .items()
            .upsert(
                &edit(cluster.clone(), vec![ConfigItemOp::update("mysqld.port", port)])
                    .with_info(info.clone()),
                ReqType::SaveAndPublish,
                OPERATOR,
            )
            .await
            .unwrap();
        let revision = saved.revision.unwrap();
        assert!(revision.created);
        assert!(revision.is_published);
        revisions.push(revision.revision);
    }
    assert!(revisions[1] > revisions[0]);

    let detail = engine
        .versions()
        .detail(&cluster, REVISION_LATEST, OutputFormat::FlatMap, false)
        .await
        .unwrap();
    assert_eq!(detail.info.revision, revisions[1]);
    assert_eq!(detail.content["mysqld.port"], "3308");

    let stored = engine.store().item_list(&cluster.key()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].conf_value, "3308");

    let list = engine.versions().list(&cluster, 0).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].pre_revision, revisions[0]);
    assert!(!list[1].is_published);
}

#[tokio::test]
async fn test_generate_reuses_fresh_revision() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");

    let first = engine
        .versions()
        .generate(&cluster, &info, GenerateMethod::GenerateAndSave, OPERATOR, "")
        .await
        .unwrap();
    assert!(first.created);

    // a module edit changes the merged content, yet the request lands in the
    // fresh window of the first snapshot
    engine
        .items()
        .upsert(
            &edit(
                node(VERSIONED_FILE, LevelName::Module, "m1"),
                vec![ConfigItemOp::update("mysqld.port", "3310")],
            ),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap();
    let again = engine
        .versions()
        .generate(&cluster, &info, GenerateMethod::GenerateAndPublish, OPERATOR, "")
        .await
        .unwrap();
    assert_eq!(again.revision, first.revision);
    assert!(!again.created);
    assert!(again.is_published);
    assert_eq!(engine.versions().list(&cluster, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_v_latest_requires_published_revision() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");

    let err = domain_err(
        engine
            .versions()
            .detail(&cluster, REVISION_LATEST, OutputFormat::List, false)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::NotFound(_)));

    let generated = engine
        .versions()
        .generate(&cluster, &info, GenerateMethod::GenerateAndPublish, OPERATOR, "")
        .await
        .unwrap();
    let detail = engine
        .versions()
        .detail(&cluster, REVISION_LATEST, OutputFormat::List, false)
        .await
        .unwrap();
    assert_eq!(detail.info.revision, generated.revision);

    // publishing the same content again is a no-op
    let again = engine
        .versions()
        .generate(&cluster, &info, GenerateMethod::GenerateAndPublish, OPERATOR, "")
        .await
        .unwrap();
    assert_eq!(again.revision, generated.revision);
    assert!(!again.created);
}

#[tokio::test]
async fn test_generate_requires_versioned_level() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;

    let module = node(VERSIONED_FILE, LevelName::Module, "m1");
    let err = domain_err(
        engine
            .versions()
            .generate(
                &module,
                &LevelInfo::default(),
                GenerateMethod::GenerateAndSave,
                OPERATOR,
                "",
            )
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::InputValidation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_generate_yields_one_revision() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");
    let info = LevelInfo::module("m1");

    let spawn = || {
        let engine = engine.clone();
        let cluster = cluster.clone();
        let info = info.clone();
        tokio::spawn(async move {
            engine
                .versions()
                .generate(&cluster, &info, GenerateMethod::GenerateAndSave, OPERATOR, "")
                .await
        })
    };
    let (a, b) = tokio::join!(spawn(), spawn());
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    assert_eq!(a.revision, b.revision);
    assert_eq!(a.content, b.content);
    assert!(a.created != b.created);
    assert_eq!(engine.versions().list(&cluster, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_apply_items_advances_applied_revision() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");

    let revision = engine
        .items()
        .upsert(
            &edit(cluster.clone(), vec![ConfigItemOp::update("mysqld.port", "3307")])
                .with_info(LevelInfo::module("m1")),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap()
        .revision
        .unwrap()
        .revision;

    let info = engine.publisher().apply_info(&cluster).await.unwrap();
    assert_eq!(info.revision_published, revision);
    assert_eq!(info.revision_applied, "");
    assert_eq!(info.items.len(), 4);
    assert!(info.need_restart);
    assert!(info.items.iter().all(|i| i.op_type == "add" && !i.applied));

    let outcome = engine
        .publisher()
        .apply_items(&cluster, &revision, &["mysqld.port".to_string()], OPERATOR)
        .await
        .unwrap();
    assert_eq!(outcome.marked, 1);
    assert_eq!(outcome.pending, 3);
    assert!(!outcome.applied);

    let info = engine.publisher().apply_info(&cluster).await.unwrap();
    assert!(!info.need_restart);

    let rest: Vec<String> = info
        .items
        .iter()
        .filter(|i| !i.applied)
        .map(|i| i.conf_name.clone())
        .collect();
    let outcome = engine
        .publisher()
        .apply_items(&cluster, &revision, &rest, OPERATOR)
        .await
        .unwrap();
    assert!(outcome.applied);

    let status = engine.publisher().status(&cluster).await.unwrap();
    assert!(status.is_applied);
}

#[tokio::test]
async fn test_apply_level_fans_out_to_children() {
    let engine = engine();
    setup_file(&engine, VERSIONED_FILE, "cluster").await;

    for cluster in ["c1", "c2"] {
        engine
            .resolver()
            .register(
                &node(VERSIONED_FILE, LevelName::Cluster, cluster),
                &LevelInfo::module("m1"),
            )
            .await
            .unwrap();
    }

    let module = node(VERSIONED_FILE, LevelName::Module, "m1");
    let applied = engine
        .publisher()
        .apply_level(
            &module,
            &LevelInfo::default(),
            &["c1".to_string(), "c3".to_string()],
            OPERATOR,
        )
        .await
        .unwrap();

    let outcome: Vec<_> = applied
        .iter()
        .map(|c| (c.level_value.as_str(), c.is_published))
        .collect();
    assert_eq!(outcome, vec![("c1", true), ("c2", false), ("c3", true)]);
    assert!(applied.iter().all(|c| c.level_name == "cluster"));

    let c2 = node(VERSIONED_FILE, LevelName::Cluster, "c2");
    let status = engine.publisher().status(&c2).await.unwrap();
    assert_eq!(status.revision_published, "");
    assert_eq!(engine.versions().list(&c2, 0).await.unwrap().len(), 1);

    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");
    let err = domain_err(
        engine
            .publisher()
            .apply_level(&cluster, &LevelInfo::module("m1"), &[], OPERATOR)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, DbConfigError::InputValidation(_)));
}

// ============================================================================
// Key rotation
// ============================================================================

#[tokio::test]
async fn test_rekey_rewrites_items_and_revisions() {
    let store = store();
    let old = engine_with(store.clone(), "old-prefix");
    setup_file(&old, VERSIONED_FILE, "cluster").await;

    let cluster = node(VERSIONED_FILE, LevelName::Cluster, "c1");
    let info = LevelInfo::module("m1");
    old.items()
        .upsert(
            &edit(
                cluster.clone(),
                vec![ConfigItemOp::update("mysqld.admin_password", "s3cret")],
            )
            .with_info(info.clone()),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap();
    let before = store.item_list(&cluster.key()).await.unwrap();

    let new = engine_with(store.clone(), "new-prefix");
    let reports = new
        .rekeyer(ValueCodec::new("old-prefix", false))
        .rekey_all("tendbha", None)
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].conf_file, VERSIONED_FILE);
    assert_eq!(reports[0].rows.items, 1);
    assert_eq!(reports[0].rows.revisions, 1);

    let after = store.item_list(&cluster.key()).await.unwrap();
    assert_ne!(before[0].conf_value, after[0].conf_value);

    let content = new
        .items()
        .query(&cluster, &info, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(content["mysqld.admin_password"], "s3cret");

    let detail = new
        .versions()
        .detail(&cluster, REVISION_LATEST, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(detail.content["mysqld.admin_password"], "s3cret");
}

#[tokio::test]
async fn test_rekey_with_wrong_prefix_leaves_file_untouched() {
    let store = store();
    let engine = engine_with(store.clone(), "old-prefix");
    setup_file(&engine, VERSIONED_FILE, "cluster").await;
    let info = LevelInfo::module("m1");

    let c1 = node(VERSIONED_FILE, LevelName::Cluster, "c1");
    engine
        .items()
        .upsert(
            &edit(
                c1.clone(),
                vec![ConfigItemOp::update("mysqld.admin_password", "s3cret")],
            )
            .with_info(info.clone()),
            ReqType::SaveAndPublish,
            OPERATOR,
        )
        .await
        .unwrap();
    // plaintext row of an encrypted name, which a re-key would rewrite
    let c0 = node(VERSIONED_FILE, LevelName::Cluster, "c0");
    store
        .item_apply_changes(
            &c0.key(),
            &[ItemChange::Upsert(ConfigItemData {
                conf_name: "mysqld.admin_password".to_string(),
                conf_value: "legacy".to_string(),
                ..Default::default()
            })],
        )
        .await
        .unwrap();

    let items_before = (
        store.item_list(&c0.key()).await.unwrap(),
        store.item_list(&c1.key()).await.unwrap(),
    );
    let revisions_before = store.revision_list(&c1.key(), 0).await.unwrap();

    let result = engine
        .rekeyer(ValueCodec::new("wrong-prefix", false))
        .rekey_file(&file(VERSIONED_FILE))
        .await;
    assert!(result.is_err());

    let items_after = (
        store.item_list(&c0.key()).await.unwrap(),
        store.item_list(&c1.key()).await.unwrap(),
    );
    assert_eq!(items_after, items_before);
    assert_eq!(items_after.0[0].conf_value, "legacy");
    assert_eq!(store.revision_list(&c1.key(), 0).await.unwrap(), revisions_before);

    let content = engine
        .items()
        .query(&c1, &info, OutputFormat::FlatMap, true)
        .await
        .unwrap();
    assert_eq!(content["mysqld.admin_password"], "s3cret");
}
