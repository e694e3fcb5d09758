//! SQL-based persistence backend (MySQL/PostgreSQL via SeaORM)

pub mod schema;

use async_trait::async_trait;
use sea_orm::{prelude::Expr, *};

use dbconfig_common::DbConfigError;

use crate::entity::{
    tb_config_applied, tb_config_file_def, tb_config_level_node, tb_config_name_def,
    tb_config_node, tb_config_node_task, tb_config_versioned,
};
use crate::error::PersistenceError;
use crate::model::*;
use crate::traits::*;

/// External database persistence service
///
/// Wraps a SeaORM `DatabaseConnection` and implements all persistence traits
/// with direct entity queries.
pub struct SqlConfigStore {
    db: DatabaseConnection,
}

impl SqlConfigStore {
    /// Create a new SqlConfigStore with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn flag(value: bool) -> i8 {
    i8::from(value)
}

/// Convert a driver error at the store boundary: a rejected unique index
/// becomes `PersistenceError::UniqueViolation`, anything else a
/// `DbConfigError::StoreFailure`
pub(crate) fn store_failure(err: DbErr) -> anyhow::Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => {
            PersistenceError::UniqueViolation(msg).into()
        }
        _ => DbConfigError::StoreFailure(err.to_string()).into(),
    }
}

/// Filter on the six node identity columns of an entity
macro_rules! node_condition {
    ($entity:ident, $node:expr) => {{
        let node: &NodeKey = $node;
        Condition::all()
            .add($entity::Column::BkBizId.eq(node.bk_biz_id.as_str()))
            .add($entity::Column::Namespace.eq(node.namespace.as_str()))
            .add($entity::Column::ConfType.eq(node.conf_type.as_str()))
            .add($entity::Column::ConfFile.eq(node.conf_file.as_str()))
            .add($entity::Column::LevelName.eq(node.level_name.as_str()))
            .add($entity::Column::LevelValue.eq(node.level_value.as_str()))
    }};
}

macro_rules! file_condition {
    ($entity:ident, $file:expr) => {{
        let file: &FileKey = $file;
        Condition::all()
            .add($entity::Column::Namespace.eq(file.namespace.as_str()))
            .add($entity::Column::ConfType.eq(file.conf_type.as_str()))
            .add($entity::Column::ConfFile.eq(file.conf_file.as_str()))
    }};
}

// ============================================================================
// Entity conversions
// ============================================================================

fn file_def_to_storage(model: tb_config_file_def::Model) -> ConfigFileDefData {
    ConfigFileDefData {
        namespace: model.namespace,
        conf_type: model.conf_type,
        conf_file: model.conf_file,
        conf_type_lc: model.conf_type_lc,
        conf_file_lc: model.conf_file_lc,
        level_names: model.level_names,
        level_versioned: model.level_versioned,
        conf_name_validate: model.conf_name_validate != 0,
        value_type_strict: model.value_type_strict != 0,
        version_keep_limit: model.version_keep_limit,
        description: model.description,
        updated_by: model.updated_by,
        created_at: Some(model.created_at),
        updated_at: Some(model.updated_at),
    }
}

fn name_def_to_storage(model: tb_config_name_def::Model) -> ConfigNameDefData {
    ConfigNameDefData {
        namespace: model.namespace,
        conf_type: model.conf_type,
        conf_file: model.conf_file,
        conf_name: model.conf_name,
        value_type: model.value_type,
        value_type_sub: model.value_type_sub,
        value_allowed: model.value_allowed,
        value_default: model.value_default,
        need_restart: model.need_restart != 0,
        flag_locked: model.flag_locked != 0,
        flag_status: model.flag_status,
        flag_encrypt: model.flag_encrypt != 0,
        description: model.description,
        updated_by: model.updated_by,
    }
}

fn item_to_storage(model: tb_config_node::Model) -> ConfigItemData {
    ConfigItemData {
        conf_name: model.conf_name,
        conf_value: model.conf_value,
        flag_locked: model.flag_locked != 0,
        flag_disable: model.flag_disable != 0,
        description: model.description,
        updated_by: model.updated_by,
    }
}

fn revision_to_storage(model: tb_config_versioned::Model) -> RevisionData {
    RevisionData {
        node: NodeKey {
            bk_biz_id: model.bk_biz_id,
            namespace: model.namespace,
            conf_type: model.conf_type,
            conf_file: model.conf_file,
            level_name: model.level_name,
            level_value: model.level_value,
        },
        revision: model.revision,
        content: model.content,
        content_md5: model.content_md5,
        is_published: model.is_published != 0,
        pre_revision: model.pre_revision,
        rows_affected: model.rows_affected,
        description: model.description,
        created_by: model.created_by,
        created_at: model.created_at,
    }
}

fn task_to_storage(model: tb_config_node_task::Model) -> NodeTaskData {
    NodeTaskData {
        node: NodeKey {
            bk_biz_id: model.bk_biz_id,
            namespace: model.namespace,
            conf_type: model.conf_type,
            conf_file: model.conf_file,
            level_name: model.level_name,
            level_value: model.level_value,
        },
        revision: model.revision,
        conf_name: model.conf_name,
        value_before: model.value_before,
        value_after: model.value_after,
        op_type: model.op_type,
        need_restart: model.need_restart != 0,
        stage: model.stage,
    }
}

fn name_def_active(name: &ConfigNameDefData) -> tb_config_name_def::ActiveModel {
    let ts = now();
    tb_config_name_def::ActiveModel {
        namespace: Set(name.namespace.clone()),
        conf_type: Set(name.conf_type.clone()),
        conf_file: Set(name.conf_file.clone()),
        conf_name: Set(name.conf_name.clone()),
        value_type: Set(name.value_type.clone()),
        value_type_sub: Set(name.value_type_sub.clone()),
        value_allowed: Set(name.value_allowed.clone()),
        value_default: Set(name.value_default.clone()),
        need_restart: Set(flag(name.need_restart)),
        flag_locked: Set(flag(name.flag_locked)),
        flag_status: Set(name.flag_status),
        flag_encrypt: Set(flag(name.flag_encrypt)),
        description: Set(name.description.clone()),
        updated_by: Set(name.updated_by.clone()),
        created_at: Set(ts),
        updated_at: Set(ts),
        ..Default::default()
    }
}

fn task_active(task: &NodeTaskData) -> tb_config_node_task::ActiveModel {
    tb_config_node_task::ActiveModel {
        bk_biz_id: Set(task.node.bk_biz_id.clone()),
        namespace: Set(task.node.namespace.clone()),
        conf_type: Set(task.node.conf_type.clone()),
        conf_file: Set(task.node.conf_file.clone()),
        level_name: Set(task.node.level_name.clone()),
        level_value: Set(task.node.level_value.clone()),
        revision: Set(task.revision.clone()),
        conf_name: Set(task.conf_name.clone()),
        value_before: Set(task.value_before.clone()),
        value_after: Set(task.value_after.clone()),
        op_type: Set(task.op_type.clone()),
        need_restart: Set(flag(task.need_restart)),
        stage: Set(task.stage),
        updated_at: Set(now()),
        ..Default::default()
    }
}

/// Upsert one name definition inside an open transaction
async fn upsert_name_def<C: ConnectionTrait>(db: &C, name: &ConfigNameDefData) -> anyhow::Result<()> {
    let file = FileKey::new(&name.namespace, &name.conf_type, &name.conf_file);
    let existing = tb_config_name_def::Entity::find()
        .filter(file_condition!(tb_config_name_def, &file))
        .filter(tb_config_name_def::Column::ConfName.eq(name.conf_name.as_str()))
        .one(db)
        .await
        .map_err(store_failure)?;

    match existing {
        Some(entity) => {
            let created_at = entity.created_at;
            let mut active: tb_config_name_def::ActiveModel = name_def_active(name);
            active.id = Set(entity.id);
            active.created_at = Set(created_at);
            active.update(db).await.map_err(store_failure)?;
        }
        None => {
            tb_config_name_def::Entity::insert(name_def_active(name))
                .exec(db)
                .await
                .map_err(store_failure)?;
        }
    }
    Ok(())
}

/// Replace the apply tasks of a node inside an open transaction
async fn replace_tasks<C: ConnectionTrait>(
    db: &C,
    node: &NodeKey,
    tasks: &[NodeTaskData],
) -> anyhow::Result<()> {
    tb_config_node_task::Entity::delete_many()
        .filter(node_condition!(tb_config_node_task, node))
        .exec(db)
        .await
        .map_err(store_failure)?;
    if !tasks.is_empty() {
        tb_config_node_task::Entity::insert_many(tasks.iter().map(task_active))
            .exec(db)
            .await
            .map_err(store_failure)?;
    }
    Ok(())
}

async fn apply_item_changes<C: ConnectionTrait>(
    db: &C,
    node: &NodeKey,
    changes: &[ItemChange],
    ts: chrono::NaiveDateTime,
) -> anyhow::Result<()> {
    for change in changes {
        match change {
            ItemChange::Upsert(item) => {
                let existing = tb_config_node::Entity::find()
                    .filter(node_condition!(tb_config_node, node))
                    .filter(tb_config_node::Column::ConfName.eq(item.conf_name.as_str()))
                    .one(db)
                    .await
                    .map_err(store_failure)?;

                match existing {
                    Some(entity) => {
                        let mut active: tb_config_node::ActiveModel = entity.into();
                        active.conf_value = Set(item.conf_value.clone());
                        active.flag_locked = Set(flag(item.flag_locked));
                        active.flag_disable = Set(flag(item.flag_disable));
                        active.description = Set(item.description.clone());
                        active.updated_by = Set(item.updated_by.clone());
                        active.updated_at = Set(ts);
                        active.update(db).await.map_err(store_failure)?;
                    }
                    None => {
                        let active = tb_config_node::ActiveModel {
                            bk_biz_id: Set(node.bk_biz_id.clone()),
                            namespace: Set(node.namespace.clone()),
                            conf_type: Set(node.conf_type.clone()),
                            conf_file: Set(node.conf_file.clone()),
                            level_name: Set(node.level_name.clone()),
                            level_value: Set(node.level_value.clone()),
                            conf_name: Set(item.conf_name.clone()),
                            conf_value: Set(item.conf_value.clone()),
                            flag_locked: Set(flag(item.flag_locked)),
                            flag_disable: Set(flag(item.flag_disable)),
                            description: Set(item.description.clone()),
                            updated_by: Set(item.updated_by.clone()),
                            created_at: Set(ts),
                            updated_at: Set(ts),
                            ..Default::default()
                        };
                        tb_config_node::Entity::insert(active)
                            .exec(db)
                            .await
                            .map_err(store_failure)?;
                    }
                }
            }
            ItemChange::Remove(conf_name) => {
                tb_config_node::Entity::delete_many()
                    .filter(node_condition!(tb_config_node, node))
                    .filter(tb_config_node::Column::ConfName.eq(conf_name.as_str()))
                    .exec(db)
                    .await
                    .map_err(store_failure)?;
            }
        }
    }
    Ok(())
}

async fn unpublish_all<C: ConnectionTrait>(db: &C, node: &NodeKey) -> anyhow::Result<()> {
    tb_config_versioned::Entity::update_many()
        .col_expr(tb_config_versioned::Column::IsPublished, Expr::value(0))
        .filter(node_condition!(tb_config_versioned, node))
        .filter(tb_config_versioned::Column::IsPublished.eq(1))
        .exec(db)
        .await
        .map_err(store_failure)?;
    Ok(())
}

async fn set_applied<C: ConnectionTrait>(
    db: &C,
    node: &NodeKey,
    revision: &str,
    operator: &str,
) -> anyhow::Result<()> {
    let existing = tb_config_applied::Entity::find()
        .filter(node_condition!(tb_config_applied, node))
        .one(db)
        .await
        .map_err(store_failure)?;

    match existing {
        Some(entity) => {
            let mut active: tb_config_applied::ActiveModel = entity.into();
            active.revision_applied = Set(revision.to_string());
            active.applied_by = Set(operator.to_string());
            active.applied_at = Set(now());
            active.update(db).await.map_err(store_failure)?;
        }
        None => {
            let active = tb_config_applied::ActiveModel {
                bk_biz_id: Set(node.bk_biz_id.clone()),
                namespace: Set(node.namespace.clone()),
                conf_type: Set(node.conf_type.clone()),
                conf_file: Set(node.conf_file.clone()),
                level_name: Set(node.level_name.clone()),
                level_value: Set(node.level_value.clone()),
                revision_applied: Set(revision.to_string()),
                applied_by: Set(operator.to_string()),
                applied_at: Set(now()),
                ..Default::default()
            };
            tb_config_applied::Entity::insert(active).exec(db).await.map_err(store_failure)?;
        }
    }
    Ok(())
}

// ============================================================================
// DefinitionPersistence implementation
// ============================================================================

#[async_trait]
impl DefinitionPersistence for SqlConfigStore {
    async fn file_def_find(&self, file: &FileKey) -> anyhow::Result<Option<ConfigFileDefData>> {
        Ok(tb_config_file_def::Entity::find()
            .filter(file_condition!(tb_config_file_def, file))
            .one(&self.db)
            .await
            .map_err(store_failure)?
            .map(file_def_to_storage))
    }

    async fn file_def_list(
        &self,
        namespace: &str,
        conf_type: Option<&str>,
    ) -> anyhow::Result<Vec<ConfigFileDefData>> {
        let mut query = tb_config_file_def::Entity::find();
        if !namespace.is_empty() {
            query = query.filter(tb_config_file_def::Column::Namespace.eq(namespace));
        }
        if let Some(conf_type) = conf_type {
            query = query.filter(tb_config_file_def::Column::ConfType.eq(conf_type));
        }

        Ok(query
            .order_by_asc(tb_config_file_def::Column::Namespace)
            .order_by_asc(tb_config_file_def::Column::ConfType)
            .order_by_asc(tb_config_file_def::Column::ConfFile)
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(file_def_to_storage)
            .collect())
    }

    async fn file_def_upsert(
        &self,
        def: &ConfigFileDefData,
        names: &[ConfigNameDefData],
    ) -> anyhow::Result<()> {
        let ts = now();
        let existing = tb_config_file_def::Entity::find()
            .filter(file_condition!(tb_config_file_def, &def.key()))
            .one(&self.db)
            .await
            .map_err(store_failure)?;

        let tx = self.db.begin().await.map_err(store_failure)?;

        match existing {
            Some(entity) => {
                let mut active: tb_config_file_def::ActiveModel = entity.into();
                active.conf_type_lc = Set(def.conf_type_lc.clone());
                active.conf_file_lc = Set(def.conf_file_lc.clone());
                active.level_names = Set(def.level_names.clone());
                active.level_versioned = Set(def.level_versioned.clone());
                active.conf_name_validate = Set(flag(def.conf_name_validate));
                active.value_type_strict = Set(flag(def.value_type_strict));
                active.version_keep_limit = Set(def.version_keep_limit);
                active.description = Set(def.description.clone());
                active.updated_by = Set(def.updated_by.clone());
                active.updated_at = Set(ts);
                active.update(&tx).await.map_err(store_failure)?;
            }
            None => {
                let active = tb_config_file_def::ActiveModel {
                    namespace: Set(def.namespace.clone()),
                    conf_type: Set(def.conf_type.clone()),
                    conf_file: Set(def.conf_file.clone()),
                    conf_type_lc: Set(def.conf_type_lc.clone()),
                    conf_file_lc: Set(def.conf_file_lc.clone()),
                    level_names: Set(def.level_names.clone()),
                    level_versioned: Set(def.level_versioned.clone()),
                    conf_name_validate: Set(flag(def.conf_name_validate)),
                    value_type_strict: Set(flag(def.value_type_strict)),
                    version_keep_limit: Set(def.version_keep_limit),
                    description: Set(def.description.clone()),
                    updated_by: Set(def.updated_by.clone()),
                    created_at: Set(ts),
                    updated_at: Set(ts),
                    ..Default::default()
                };
                tb_config_file_def::Entity::insert(active).exec(&tx).await.map_err(store_failure)?;
            }
        }

        for name in names {
            upsert_name_def(&tx, name).await?;
        }

        tx.commit().await.map_err(store_failure)?;
        Ok(())
    }

    async fn name_def_list(
        &self,
        file: &FileKey,
        include_deleted: bool,
    ) -> anyhow::Result<Vec<ConfigNameDefData>> {
        let mut query =
            tb_config_name_def::Entity::find().filter(file_condition!(tb_config_name_def, file));
        if !include_deleted {
            query = query.filter(tb_config_name_def::Column::FlagStatus.ne(NAME_STATUS_DELETED));
        }

        Ok(query
            .order_by_asc(tb_config_name_def::Column::ConfName)
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(name_def_to_storage)
            .collect())
    }

    async fn name_def_upsert(&self, names: &[ConfigNameDefData]) -> anyhow::Result<()> {
        let tx = self.db.begin().await.map_err(store_failure)?;
        for name in names {
            upsert_name_def(&tx, name).await?;
        }
        tx.commit().await.map_err(store_failure)?;
        Ok(())
    }
}

// ============================================================================
// ItemPersistence implementation
// ============================================================================

#[async_trait]
impl ItemPersistence for SqlConfigStore {
    async fn item_list(&self, node: &NodeKey) -> anyhow::Result<Vec<ConfigItemData>> {
        Ok(tb_config_node::Entity::find()
            .filter(node_condition!(tb_config_node, node))
            .order_by_asc(tb_config_node::Column::ConfName)
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(item_to_storage)
            .collect())
    }

    async fn item_apply_changes(
        &self,
        node: &NodeKey,
        changes: &[ItemChange],
    ) -> anyhow::Result<()> {
        let tx = self.db.begin().await.map_err(store_failure)?;
        apply_item_changes(&tx, node, changes, now()).await?;

        tx.commit().await.map_err(store_failure)?;
        Ok(())
    }

    async fn item_nodes(
        &self,
        file: &FileKey,
        bk_biz_id: Option<&str>,
    ) -> anyhow::Result<Vec<NodeKey>> {
        let mut query = tb_config_node::Entity::find()
            .select_only()
            .column(tb_config_node::Column::BkBizId)
            .column(tb_config_node::Column::LevelName)
            .column(tb_config_node::Column::LevelValue)
            .filter(file_condition!(tb_config_node, file))
            .distinct();
        if let Some(biz) = bk_biz_id {
            query = query.filter(tb_config_node::Column::BkBizId.eq(biz));
        }

        let rows = query
            .order_by_asc(tb_config_node::Column::BkBizId)
            .order_by_asc(tb_config_node::Column::LevelName)
            .order_by_asc(tb_config_node::Column::LevelValue)
            .into_tuple::<(String, String, String)>()
            .all(&self.db)
            .await
            .map_err(store_failure)?;

        Ok(rows
            .into_iter()
            .map(|(biz, level_name, level_value)| NodeKey::new(biz, file, level_name, level_value))
            .collect())
    }

    async fn level_node_register(&self, node: &LevelNodeData) -> anyhow::Result<()> {
        let existing = tb_config_level_node::Entity::find()
            .filter(tb_config_level_node::Column::BkBizId.eq(node.bk_biz_id.as_str()))
            .filter(tb_config_level_node::Column::LevelName.eq(node.level_name.as_str()))
            .filter(tb_config_level_node::Column::LevelValue.eq(node.level_value.as_str()))
            .filter(tb_config_level_node::Column::Module.eq(node.module.as_str()))
            .filter(tb_config_level_node::Column::Cluster.eq(node.cluster.as_str()))
            .one(&self.db)
            .await
            .map_err(store_failure)?;
        if existing.is_some() {
            return Ok(());
        }

        let active = tb_config_level_node::ActiveModel {
            bk_biz_id: Set(node.bk_biz_id.clone()),
            level_name: Set(node.level_name.clone()),
            level_value: Set(node.level_value.clone()),
            module: Set(node.module.clone()),
            cluster: Set(node.cluster.clone()),
            created_at: Set(now()),
            ..Default::default()
        };
        match tb_config_level_node::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(store_failure)
        {
            Ok(_) => Ok(()),
            // registered concurrently by another request
            Err(err) if crate::is_unique_violation(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn level_node_list(
        &self,
        bk_biz_id: &str,
        filter: &LevelNodeFilter,
    ) -> anyhow::Result<Vec<LevelNodeData>> {
        let mut query = tb_config_level_node::Entity::find()
            .filter(tb_config_level_node::Column::BkBizId.eq(bk_biz_id));
        if let Some(level_name) = &filter.level_name {
            query = query.filter(tb_config_level_node::Column::LevelName.eq(level_name.as_str()));
        }
        if let Some(module) = &filter.module {
            query = query.filter(tb_config_level_node::Column::Module.eq(module.as_str()));
        }
        if let Some(cluster) = &filter.cluster {
            query = query.filter(tb_config_level_node::Column::Cluster.eq(cluster.as_str()));
        }

        Ok(query
            .order_by_asc(tb_config_level_node::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(|m| LevelNodeData {
                bk_biz_id: m.bk_biz_id,
                level_name: m.level_name,
                level_value: m.level_value,
                module: m.module,
                cluster: m.cluster,
            })
            .collect())
    }

    async fn level_node_biz_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(tb_config_level_node::Entity::find()
            .select_only()
            .column(tb_config_level_node::Column::BkBizId)
            .distinct()
            .order_by_asc(tb_config_level_node::Column::BkBizId)
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(store_failure)?)
    }
}

// ============================================================================
// RevisionPersistence implementation
// ============================================================================

#[async_trait]
impl RevisionPersistence for SqlConfigStore {
    async fn revision_insert(
        &self,
        rev: &RevisionData,
        changes: &[ItemChange],
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()> {
        let tx = self.db.begin().await.map_err(store_failure)?;

        apply_item_changes(&tx, &rev.node, changes, now()).await?;
        if rev.is_published {
            unpublish_all(&tx, &rev.node).await?;
        }

        let active = tb_config_versioned::ActiveModel {
            bk_biz_id: Set(rev.node.bk_biz_id.clone()),
            namespace: Set(rev.node.namespace.clone()),
            conf_type: Set(rev.node.conf_type.clone()),
            conf_file: Set(rev.node.conf_file.clone()),
            level_name: Set(rev.node.level_name.clone()),
            level_value: Set(rev.node.level_value.clone()),
            revision: Set(rev.revision.clone()),
            content: Set(rev.content.clone()),
            content_md5: Set(rev.content_md5.clone()),
            is_published: Set(flag(rev.is_published)),
            pre_revision: Set(rev.pre_revision.clone()),
            rows_affected: Set(rev.rows_affected),
            description: Set(rev.description.clone()),
            created_by: Set(rev.created_by.clone()),
            created_at: Set(rev.created_at),
            ..Default::default()
        };
        tb_config_versioned::Entity::insert(active)
            .exec(&tx)
            .await
            .map_err(store_failure)?;

        if rev.is_published {
            replace_tasks(&tx, &rev.node, tasks).await?;
        }

        tx.commit().await.map_err(store_failure)?;
        Ok(())
    }

    async fn revision_find(
        &self,
        node: &NodeKey,
        revision: &str,
    ) -> anyhow::Result<Option<RevisionData>> {
        Ok(tb_config_versioned::Entity::find()
            .filter(node_condition!(tb_config_versioned, node))
            .filter(tb_config_versioned::Column::Revision.eq(revision))
            .one(&self.db)
            .await
            .map_err(store_failure)?
            .map(revision_to_storage))
    }

    async fn revision_latest(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>> {
        Ok(self.revision_list(node, 1).await?.into_iter().next())
    }

    async fn revision_published(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>> {
        Ok(tb_config_versioned::Entity::find()
            .filter(node_condition!(tb_config_versioned, node))
            .filter(tb_config_versioned::Column::IsPublished.eq(1))
            .one(&self.db)
            .await
            .map_err(store_failure)?
            .map(revision_to_storage))
    }

    async fn revision_list(&self, node: &NodeKey, limit: u64) -> anyhow::Result<Vec<RevisionData>> {
        let mut query = tb_config_versioned::Entity::find()
            .filter(node_condition!(tb_config_versioned, node))
            .order_by_desc(tb_config_versioned::Column::CreatedAt)
            .order_by_desc(tb_config_versioned::Column::Revision);
        if limit > 0 {
            query = query.limit(limit);
        }

        Ok(query
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(revision_to_storage)
            .collect())
    }

    async fn revision_publish(
        &self,
        node: &NodeKey,
        revision: &str,
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()> {
        let tx = self.db.begin().await.map_err(store_failure)?;

        unpublish_all(&tx, node).await?;
        let result = tb_config_versioned::Entity::update_many()
            .col_expr(tb_config_versioned::Column::IsPublished, Expr::value(1))
            .filter(node_condition!(tb_config_versioned, node))
            .filter(tb_config_versioned::Column::Revision.eq(revision))
            .exec(&tx)
            .await
            .map_err(store_failure)?;
        if result.rows_affected == 0 {
            anyhow::bail!("revision {} not found for {}", revision, node);
        }
        replace_tasks(&tx, node, tasks).await?;

        tx.commit().await.map_err(store_failure)?;
        Ok(())
    }

    async fn revision_purge(&self, node: &NodeKey, keep: u64) -> anyhow::Result<u64> {
        let applied = self
            .applied_find(node)
            .await?
            .map(|a| a.revision)
            .unwrap_or_default();

        let rows = tb_config_versioned::Entity::find()
            .select_only()
            .column(tb_config_versioned::Column::Id)
            .column(tb_config_versioned::Column::Revision)
            .column(tb_config_versioned::Column::IsPublished)
            .filter(node_condition!(tb_config_versioned, node))
            .order_by_desc(tb_config_versioned::Column::CreatedAt)
            .order_by_desc(tb_config_versioned::Column::Revision)
            .into_tuple::<(i64, String, i8)>()
            .all(&self.db)
            .await
            .map_err(store_failure)?;

        let stale: Vec<i64> = rows
            .into_iter()
            .skip(keep as usize)
            .filter(|(_, revision, is_published)| *is_published == 0 && *revision != applied)
            .map(|(id, _, _)| id)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let result = tb_config_versioned::Entity::delete_many()
            .filter(tb_config_versioned::Column::Id.is_in(stale))
            .exec(&self.db)
            .await
            .map_err(store_failure)?;
        Ok(result.rows_affected)
    }

    async fn applied_find(&self, node: &NodeKey) -> anyhow::Result<Option<AppliedData>> {
        Ok(tb_config_applied::Entity::find()
            .filter(node_condition!(tb_config_applied, node))
            .one(&self.db)
            .await
            .map_err(store_failure)?
            .map(|m| AppliedData {
                node: node.clone(),
                revision: m.revision_applied,
                applied_by: m.applied_by,
                applied_at: m.applied_at,
            }))
    }

    async fn applied_set(
        &self,
        node: &NodeKey,
        revision: &str,
        operator: &str,
    ) -> anyhow::Result<()> {
        set_applied(&self.db, node, revision, operator).await
    }

    async fn task_list(&self, node: &NodeKey) -> anyhow::Result<Vec<NodeTaskData>> {
        Ok(tb_config_node_task::Entity::find()
            .filter(node_condition!(tb_config_node_task, node))
            .order_by_asc(tb_config_node_task::Column::ConfName)
            .all(&self.db)
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(task_to_storage)
            .collect())
    }

    async fn task_mark_applied(
        &self,
        node: &NodeKey,
        revision: &str,
        conf_names: &[String],
        operator: &str,
    ) -> anyhow::Result<TaskApplyOutcome> {
        let tx = self.db.begin().await.map_err(store_failure)?;

        let mut update = tb_config_node_task::Entity::update_many()
            .col_expr(tb_config_node_task::Column::Stage, Expr::value(TASK_STAGE_APPLIED))
            .col_expr(tb_config_node_task::Column::UpdatedAt, Expr::value(now()))
            .filter(node_condition!(tb_config_node_task, node))
            .filter(tb_config_node_task::Column::Revision.eq(revision))
            .filter(tb_config_node_task::Column::Stage.eq(TASK_STAGE_PENDING));
        if !conf_names.is_empty() {
            update = update.filter(tb_config_node_task::Column::ConfName.is_in(conf_names.to_vec()));
        }
        let marked = update.exec(&tx).await.map_err(store_failure)?.rows_affected;

        let pending = tb_config_node_task::Entity::find()
            .filter(node_condition!(tb_config_node_task, node))
            .filter(tb_config_node_task::Column::Revision.eq(revision))
            .filter(tb_config_node_task::Column::Stage.eq(TASK_STAGE_PENDING))
            .count(&tx)
            .await
            .map_err(store_failure)?;

        let applied = pending == 0;
        if applied {
            set_applied(&tx, node, revision, operator).await?;
        }

        tx.commit().await.map_err(store_failure)?;
        Ok(TaskApplyOutcome {
            marked,
            pending,
            applied,
        })
    }
}

// ============================================================================
// ConfigStore implementation
// ============================================================================

#[async_trait]
impl ConfigStore for SqlConfigStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::ExternalDb
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        // Execute a simple query to verify connectivity
        tb_config_file_def::Entity::find()
            .select_only()
            .column_as(Expr::cust("1"), "health")
            .into_tuple::<i32>()
            .one(&self.db)
            .await
            .map_err(store_failure)?;
        Ok(())
    }

    async fn rekey_file(
        &self,
        file: &FileKey,
        encrypted_names: &[String],
        rewrite_value: ValueRewriter<'_>,
        rewrite_content: ContentRewriter<'_>,
    ) -> anyhow::Result<RekeyCount> {
        let mut count = RekeyCount::default();
        let tx = self.db.begin().await.map_err(store_failure)?;

        if !encrypted_names.is_empty() {
            let plat = NodeKey::plat(file);
            let defs = tb_config_name_def::Entity::find()
                .filter(file_condition!(tb_config_name_def, file))
                .filter(tb_config_name_def::Column::ConfName.is_in(encrypted_names.to_vec()))
                .filter(tb_config_name_def::Column::ValueDefault.ne(""))
                .all(&tx)
                .await
                .map_err(store_failure)?;
            for def in defs {
                let value = rewrite_value(&plat, &def.value_default)?;
                let mut active: tb_config_name_def::ActiveModel = def.into();
                active.value_default = Set(value);
                active.update(&tx).await.map_err(store_failure)?;
                count.name_defs += 1;
            }

            let items = tb_config_node::Entity::find()
                .filter(file_condition!(tb_config_node, file))
                .filter(tb_config_node::Column::ConfName.is_in(encrypted_names.to_vec()))
                .filter(tb_config_node::Column::ConfValue.ne(""))
                .all(&tx)
                .await
                .map_err(store_failure)?;
            for item in items {
                let node = NodeKey::new(&item.bk_biz_id, file, &item.level_name, &item.level_value);
                let value = rewrite_value(&node, &item.conf_value)?;
                let mut active: tb_config_node::ActiveModel = item.into();
                active.conf_value = Set(value);
                active.update(&tx).await.map_err(store_failure)?;
                count.items += 1;
            }
        }

        let revisions = tb_config_versioned::Entity::find()
            .filter(file_condition!(tb_config_versioned, file))
            .all(&tx)
            .await
            .map_err(store_failure)?;
        for rev in revisions {
            let node = NodeKey::new(&rev.bk_biz_id, file, &rev.level_name, &rev.level_value);
            let (content, md5) = rewrite_content(&node, &rev.content)?;
            let mut active: tb_config_versioned::ActiveModel = rev.into();
            active.content = Set(content);
            active.content_md5 = Set(md5);
            active.update(&tx).await.map_err(store_failure)?;
            count.revisions += 1;
        }

        tx.commit().await.map_err(store_failure)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_become_store_failures() {
        let err = store_failure(DbErr::Custom("deadlock found".to_string()));
        assert!(!crate::is_unique_violation(&err));
        match err.downcast_ref::<DbConfigError>() {
            Some(DbConfigError::StoreFailure(msg)) => assert!(msg.contains("deadlock found")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
