//! One-shot maintenance commands run instead of the server

use serde::Serialize;
use tracing::info;

use dbconfig_common::ValueCodec;
use dbconfig_engine::{ConfigEngine, ConfigNode, FileDetail, RekeyReport, RevisionInfo};
use dbconfig_persistence::{ConfigItemData, FileKey, ItemPersistence, NodeKey};

use crate::model::config::{DumpArgs, RekeyArgs};

/// Items and revisions of one node as stored; encrypted values stay encrypted
#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub node: NodeKey,
    pub items: Vec<ConfigItemData>,
    pub revisions: Vec<RevisionInfo>,
}

#[derive(Debug, Serialize)]
pub struct FileDump {
    #[serde(flatten)]
    pub detail: FileDetail,
    pub nodes: Vec<NodeDump>,
}

/// Read-only export of a conf file
pub async fn dump(engine: &ConfigEngine, args: &DumpArgs) -> anyhow::Result<FileDump> {
    let file = FileKey::new(&args.namespace, &args.conf_type, &args.conf_file);
    let detail = engine.files().query(&file).await?;
    let store = engine.store();

    let mut nodes = Vec::new();
    for key in store.item_nodes(&file, args.bk_biz_id.as_deref()).await? {
        let node = ConfigNode::from_key(&key)?;
        nodes.push(NodeDump {
            items: store.item_list(&key).await?,
            revisions: engine.versions().list(&node, 0).await?,
            node: key,
        });
    }

    info!("Dumped {} with {} nodes", file, nodes.len());
    Ok(FileDump { detail, nodes })
}

/// Re-key stored values from `old_prefix` to `new_prefix`.
///
/// `engine` must already be built with the new prefix.
pub async fn rekey(engine: &ConfigEngine, args: &RekeyArgs) -> anyhow::Result<Vec<RekeyReport>> {
    let from = ValueCodec::new(&args.old_prefix, engine.crypto().codec().gzip());
    let reports = engine
        .rekeyer(from)
        .rekey_all(&args.namespace, args.conf_type.as_deref())
        .await?;

    let rows: u64 = reports.iter().map(|r| r.rows.total()).sum();
    info!(
        "Re-keyed {} conf files ({} rows) from prefix {} to {}",
        reports.len(),
        rows,
        args.old_prefix,
        args.new_prefix
    );
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use dbconfig_engine::ItemEdit;
    use dbconfig_engine::model::ConfigItemOp;
    use dbconfig_persistence::{ConfigFileDefData, ConfigNameDefData, MemoryConfigStore};

    fn file() -> FileKey {
        FileKey::new("tendbha", "dbconf", "MySQL-5.7")
    }

    async fn seeded(prefix: &str) -> ConfigEngine {
        let engine = ConfigEngine::builder(Arc::new(MemoryConfigStore::new()))
            .codec(ValueCodec::new(prefix, false))
            .build();
        let def = ConfigFileDefData {
            namespace: "tendbha".into(),
            conf_type: "dbconf".into(),
            conf_file: "MySQL-5.7".into(),
            level_names: "plat,app,module,cluster".into(),
            ..Default::default()
        };
        let names = vec![ConfigNameDefData {
            conf_name: "admin_password".into(),
            flag_status: 1,
            flag_encrypt: true,
            ..Default::default()
        }];
        engine.files().add(def, names, "admin").await.unwrap();

        let node = ConfigNode::parse("3", file(), "app", "3").unwrap();
        let edit = ItemEdit::new(node, vec![ConfigItemOp::update("admin_password", "s3cret")]);
        engine.items().save(&edit, "admin").await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_dump_keeps_values_encrypted() {
        let engine = seeded("dbconfig").await;
        let dump = dump(
            &engine,
            &DumpArgs {
                namespace: "tendbha".into(),
                conf_type: "dbconf".into(),
                conf_file: "MySQL-5.7".into(),
                bk_biz_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(dump.detail.conf_names.len(), 1);
        assert_eq!(dump.nodes.len(), 1);
        let item = &dump.nodes[0].items[0];
        assert_eq!(item.conf_name, "admin_password");
        assert_ne!(item.conf_value, "s3cret");
    }

    #[tokio::test]
    async fn test_rekey_then_read_with_new_prefix() {
        let old = seeded("old").await;
        let new = ConfigEngine::builder(old.store().clone())
            .codec(ValueCodec::new("new", false))
            .build();

        let reports = rekey(
            &new,
            &RekeyArgs {
                old_prefix: "old".into(),
                new_prefix: "new".into(),
                namespace: "tendbha".into(),
                conf_type: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rows.items, 1);

        let node = ConfigNode::parse("3", file(), "app", "3").unwrap();
        let items = new
            .items()
            .merged(&node, &Default::default(), true)
            .await
            .unwrap();
        assert_eq!(items[0].conf_value, "s3cret");
    }
}
