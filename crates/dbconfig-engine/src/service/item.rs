//! Item editing and merged reads

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use dbconfig_common::DbConfigError;
use dbconfig_persistence::model::NAME_STATUS_DELETED;
use dbconfig_persistence::{
    ConfigFileDefData, ConfigNameDefData, ConfigStore, DefinitionPersistence, FileKey, ItemChange,
    ItemPersistence,
};

use crate::model::item::op_to_item;
use crate::model::{
    ConfigItemOp, ConfigNode, GenerateMethod, GeneratedRevision, ItemEdit, LevelInfo, LevelName,
    MergedItem, OpType, OutputFormat, ReqType, format_items,
};
use crate::validate::validate_value;

use super::encryption::EncryptionService;
use super::level::{LevelResolver, ancestor_chain};
use super::merge::{
    ConflictPredicate, Layer, MergeEngine, PendingChange, ValueState, locked_by, merge_layers,
};
use super::version::VersionManager;

/// Outcome of a save or upsert
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub rows: usize,
    /// Revision generated when the node sits at the versioned level
    pub revision: Option<GeneratedRevision>,
}

/// Read of one level across many level values
#[derive(Clone, Debug)]
pub struct BatchGetQuery {
    pub bk_biz_id: String,
    pub file: FileKey,
    pub level_name: LevelName,
    pub level_values: Vec<String>,
    pub info: LevelInfo,
    /// Only these names when non-empty
    pub conf_names: Vec<String>,
    pub format: OutputFormat,
}

/// Per level_value content; nodes that failed to decrypt are in `errors`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchGetResult {
    pub content: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, String>,
}

/// A validated edit with the state it was checked against
struct PreparedEdit {
    name_defs: Vec<ConfigNameDefData>,
    /// Ancestor chain layers, the edited node last
    layers: Vec<Layer>,
}

impl PreparedEdit {
    fn def_map(&self) -> HashMap<&str, &ConfigNameDefData> {
        self.name_defs.iter().map(|d| (d.conf_name.as_str(), d)).collect()
    }
}

fn active_def<'a>(
    defs: &'a HashMap<&str, &'a ConfigNameDefData>,
    conf_name: &str,
) -> Option<&'a ConfigNameDefData> {
    defs.get(conf_name)
        .copied()
        .filter(|d| d.flag_status != NAME_STATUS_DELETED)
}

fn level_allowed(def: &ConfigFileDefData, level: LevelName) -> bool {
    level == LevelName::Plat
        || def
            .level_names
            .split(',')
            .any(|l| l.trim().eq_ignore_ascii_case(level.as_str()))
}

#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn ConfigStore>,
    resolver: LevelResolver,
    merger: MergeEngine,
    crypto: EncryptionService,
    versions: VersionManager,
    predicate: Arc<dyn ConflictPredicate>,
}

impl ItemService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        resolver: LevelResolver,
        merger: MergeEngine,
        crypto: EncryptionService,
        versions: VersionManager,
        predicate: Arc<dyn ConflictPredicate>,
    ) -> Self {
        Self {
            store,
            resolver,
            merger,
            crypto,
            versions,
            predicate,
        }
    }

    async fn file_def(&self, file: &FileKey) -> anyhow::Result<ConfigFileDefData> {
        self.store
            .file_def_find(file)
            .await?
            .ok_or_else(|| DbConfigError::NotFound(format!("conf file {}", file)).into())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Edit items of a file without versioning
    pub async fn save(&self, edit: &ItemEdit, operator: &str) -> anyhow::Result<SaveResult> {
        let def = self.file_def(&edit.node.file).await?;
        if !def.level_versioned.is_empty() {
            return Err(DbConfigError::InputValidation(format!(
                "conf file {} is versioned, use upsert",
                edit.node.file
            ))
            .into());
        }
        let rows = self.write_items(edit, &def, operator).await?;
        Ok(SaveResult {
            rows,
            revision: None,
        })
    }

    /// Edit items of a versioned file; at the versioned level a revision is
    /// generated as well
    pub async fn upsert(
        &self,
        edit: &ItemEdit,
        req_type: ReqType,
        operator: &str,
    ) -> anyhow::Result<SaveResult> {
        let def = self.file_def(&edit.node.file).await?;
        if def.level_versioned.is_empty() {
            return Err(DbConfigError::InputValidation(format!(
                "conf file {} is not versioned, use save",
                edit.node.file
            ))
            .into());
        }
        let prepared = self.prepare(edit, &def).await?;
        let rows = edit.items.len();

        let versioned = LevelName::parse(&def.level_versioned)?;
        if versioned != edit.node.level_name {
            self.commit(edit, &prepared, operator).await?;
            return Ok(SaveResult {
                rows,
                revision: None,
            });
        }

        let method = match req_type {
            ReqType::SaveAndPublish => GenerateMethod::GenerateAndPublish,
            ReqType::SaveOnly => {
                warn!(
                    "req_type SaveOnly is deprecated, saving {} without publishing",
                    edit.node
                );
                GenerateMethod::GenerateAndSave
            }
        };

        let revision = if edit.node.level_name == LevelName::Plat {
            self.commit(edit, &prepared, operator).await?;
            self.versions
                .generate_now(&edit.node, &edit.info, &def, method, operator, &edit.description)
                .await?
        } else {
            let changes = self.item_changes(edit, &prepared, operator)?;
            let mut layers = prepared.layers;
            if let Some(own) = layers.last_mut() {
                own.apply(&changes);
            }
            let items = merge_layers(&layers, &prepared.name_defs);
            let revision = self
                .versions
                .snapshot(&edit.node, &def, items, &changes, method, operator, &edit.description)
                .await?;
            self.resolver.register(&edit.node, &edit.info).await?;
            info!("Saved {} items at {} by {}", rows, edit.node, operator);
            revision
        };
        Ok(SaveResult {
            rows,
            revision: Some(revision),
        })
    }

    async fn write_items(
        &self,
        edit: &ItemEdit,
        def: &ConfigFileDefData,
        operator: &str,
    ) -> anyhow::Result<usize> {
        let prepared = self.prepare(edit, def).await?;
        self.commit(edit, &prepared, operator).await?;
        Ok(edit.items.len())
    }

    /// Validate an edit against definitions, locks, existing items and
    /// descendants without writing anything
    async fn prepare(&self, edit: &ItemEdit, def: &ConfigFileDefData) -> anyhow::Result<PreparedEdit> {
        let node = &edit.node;
        if !level_allowed(def, node.level_name) {
            return Err(DbConfigError::InputValidation(format!(
                "level {} is not allowed for conf file {}, expect one of {}",
                node.level_name, node.file, def.level_names
            ))
            .into());
        }

        let mut seen = HashSet::new();
        for op in &edit.items {
            if op.conf_name.trim().is_empty() {
                return Err(DbConfigError::InputValidation("conf_name is required".to_string()).into());
            }
            if !seen.insert(op.conf_name.as_str()) {
                return Err(DbConfigError::DomainConflict(format!(
                    "duplicate conf_name {} in one request",
                    op.conf_name
                ))
                .into());
            }
        }

        let name_defs = self.merger.name_defs(&node.file).await?;
        let defs: HashMap<&str, &ConfigNameDefData> =
            name_defs.iter().map(|d| (d.conf_name.as_str(), d)).collect();
        self.check_definitions(edit, def, &defs)?;

        let chain = ancestor_chain(node, &edit.info)?;
        let layers = self.merger.layers(&chain, &name_defs).await?;
        let (ancestors, own) = layers.split_at(layers.len() - 1);

        for op in &edit.items {
            if let Some(level) = locked_by(ancestors, &op.conf_name) {
                return Err(DbConfigError::DomainConflict(format!(
                    "conf_name {} is locked at level {}",
                    op.conf_name, level
                ))
                .into());
            }
        }

        let mut current: HashMap<&str, (String, bool)> = HashMap::new();
        for item in own.iter().flat_map(|l| l.items.iter()) {
            let value = self.crypto.decrypt(&item.conf_value, &node.level_value)?;
            current.insert(item.conf_name.as_str(), (value, item.flag_locked));
        }
        for op in edit.items.iter().filter(|op| op.op_type == OpType::Add) {
            if current.contains_key(op.conf_name.as_str()) {
                return Err(DbConfigError::DomainConflict(format!(
                    "conf_name {} already exists at {}",
                    op.conf_name, node
                ))
                .into());
            }
        }

        if edit.confirm {
            debug!("Descendant conflict check skipped for {} by confirm", node);
        } else {
            self.check_descendants(edit, &current).await?;
        }

        Ok(PreparedEdit { name_defs, layers })
    }

    /// Node item mutations of a non-plat edit, values encrypted as stored
    fn item_changes(
        &self,
        edit: &ItemEdit,
        prepared: &PreparedEdit,
        operator: &str,
    ) -> anyhow::Result<Vec<ItemChange>> {
        let defs = prepared.def_map();
        let mut changes = Vec::with_capacity(edit.items.len());
        for op in &edit.items {
            let change = match op.op_type {
                OpType::Remove => ItemChange::Remove(op.conf_name.clone()),
                OpType::Add | OpType::Update => {
                    let value = self.stored_value(op, active_def(&defs, &op.conf_name), &edit.node)?;
                    ItemChange::Upsert(op_to_item(op, value, operator))
                }
            };
            changes.push(change);
        }
        Ok(changes)
    }

    async fn commit(
        &self,
        edit: &ItemEdit,
        prepared: &PreparedEdit,
        operator: &str,
    ) -> anyhow::Result<()> {
        let node = &edit.node;
        if node.level_name == LevelName::Plat {
            self.write_plat(edit, &prepared.def_map(), operator).await?;
        } else {
            let changes = self.item_changes(edit, prepared, operator)?;
            self.store.item_apply_changes(&node.key(), &changes).await?;
            self.resolver.register(node, &edit.info).await?;
        }

        info!("Saved {} items at {} by {}", edit.items.len(), node, operator);
        Ok(())
    }

    fn check_definitions(
        &self,
        edit: &ItemEdit,
        def: &ConfigFileDefData,
        defs: &HashMap<&str, &ConfigNameDefData>,
    ) -> Result<(), DbConfigError> {
        let plat = edit.node.level_name == LevelName::Plat;
        for op in edit.items.iter().filter(|op| op.op_type != OpType::Remove) {
            let name_def = active_def(defs, &op.conf_name);

            // adding a name at plat defines it
            let defines = plat && op.op_type == OpType::Add;
            if def.conf_name_validate && name_def.is_none() && !defines {
                return Err(DbConfigError::InputValidation(format!(
                    "conf_name {} is not defined for {}",
                    op.conf_name, edit.node.file
                )));
            }

            if let Some(name_def) = name_def
                && def.value_type_strict
                && !op.conf_value.is_empty()
            {
                validate_value(
                    &op.conf_value,
                    &name_def.value_type,
                    &name_def.value_type_sub,
                    &name_def.value_allowed,
                )
                .map_err(|e| {
                    DbConfigError::InputValidation(format!("conf_name {}: {}", op.conf_name, e))
                })?;
            }
        }
        Ok(())
    }

    async fn check_descendants(
        &self,
        edit: &ItemEdit,
        current: &HashMap<&str, (String, bool)>,
    ) -> anyhow::Result<()> {
        let descendants = self.resolver.descendants(&edit.node, &edit.info).await?;
        let mut conflicts = Vec::new();

        for desc in &descendants {
            let items = self.store.item_list(&desc.key()).await?;
            for op in &edit.items {
                let Some(found) = items
                    .iter()
                    .find(|i| i.conf_name == op.conf_name && !i.flag_disable)
                else {
                    continue;
                };
                let descendant_value = self.crypto.decrypt(&found.conf_value, &desc.level_value)?;

                let change = PendingChange {
                    conf_name: &op.conf_name,
                    current: current
                        .get(op.conf_name.as_str())
                        .map(|(value, locked)| ValueState {
                            value,
                            locked: *locked,
                        }),
                    desired: (op.op_type != OpType::Remove).then_some(ValueState {
                        value: &op.conf_value,
                        locked: op.flag_locked,
                    }),
                };
                if self.predicate.conflicts(&change, &descendant_value) {
                    conflicts.push(format!("{}@{}={}", op.conf_name, desc.level_name, desc.level_value));
                }
            }
        }

        if conflicts.is_empty() {
            return Ok(());
        }
        Err(DbConfigError::DomainConflict(format!(
            "change alters values at lower levels, confirm to proceed: {}",
            conflicts.join(", ")
        ))
        .into())
    }

    /// Value as stored: encrypted with the node key when the name asks for it
    fn stored_value(
        &self,
        op: &ConfigItemOp,
        name_def: Option<&ConfigNameDefData>,
        node: &ConfigNode,
    ) -> Result<String, DbConfigError> {
        if name_def.is_some_and(|d| d.flag_encrypt) && !op.conf_value.is_empty() {
            self.crypto.encrypt(&op.conf_value, &node.level_value)
        } else {
            Ok(op.conf_value.clone())
        }
    }

    /// Plat items live in the name definitions
    async fn write_plat(
        &self,
        edit: &ItemEdit,
        defs: &HashMap<&str, &ConfigNameDefData>,
        operator: &str,
    ) -> anyhow::Result<()> {
        let node = &edit.node;
        let mut updated = Vec::with_capacity(edit.items.len());

        for op in &edit.items {
            let existing = defs.get(op.conf_name.as_str()).copied();
            let name_def = match (op.op_type, existing) {
                (OpType::Remove, None) => continue,
                (OpType::Remove, Some(d)) => ConfigNameDefData {
                    flag_status: NAME_STATUS_DELETED,
                    updated_by: operator.to_string(),
                    ..d.clone()
                },
                (_, Some(d)) => {
                    let value = self.stored_value(op, Some(d), node)?;
                    ConfigNameDefData {
                        value_default: value,
                        flag_locked: op.flag_locked,
                        flag_status: d.flag_status.max(1),
                        description: if op.description.is_empty() {
                            d.description.clone()
                        } else {
                            op.description.clone()
                        },
                        updated_by: operator.to_string(),
                        ..d.clone()
                    }
                }
                (_, None) => ConfigNameDefData {
                    namespace: node.file.namespace.clone(),
                    conf_type: node.file.conf_type.clone(),
                    conf_file: node.file.conf_file.clone(),
                    conf_name: op.conf_name.clone(),
                    value_type: "STRING".to_string(),
                    value_default: op.conf_value.clone(),
                    flag_locked: op.flag_locked,
                    flag_status: 1,
                    description: op.description.clone(),
                    updated_by: operator.to_string(),
                    ..Default::default()
                },
            };
            updated.push(name_def);
        }

        self.store.name_def_upsert(&updated).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Merged items of a node; a decryption failure is a hard error
    pub async fn merged(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        decrypt: bool,
    ) -> anyhow::Result<Vec<MergedItem>> {
        self.file_def(&node.file).await?;
        let mut items = self.merger.merged(node, info).await?;
        if decrypt {
            self.crypto.decrypt_items(&mut items)?;
        }
        Ok(items)
    }

    pub async fn query(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        format: OutputFormat,
        decrypt: bool,
    ) -> anyhow::Result<Value> {
        let items = self.merged(node, info, decrypt).await?;
        Ok(format_items(&items, format))
    }

    /// Decrypted reads of many nodes of one level; nodes failing to decrypt
    /// are reported per level_value instead of failing the batch
    pub async fn batch_get(&self, query: &BatchGetQuery) -> anyhow::Result<BatchGetResult> {
        self.file_def(&query.file).await?;
        let mut result = BatchGetResult::default();

        for level_value in &query.level_values {
            let node = ConfigNode::new(
                &query.bk_biz_id,
                query.file.clone(),
                query.level_name,
                level_value,
            )?;
            let mut items = self.merger.merged(&node, &query.info).await?;
            if !query.conf_names.is_empty() {
                items.retain(|i| query.conf_names.contains(&i.conf_name));
            }
            match self.crypto.decrypt_items(&mut items) {
                Ok(()) => {
                    result
                        .content
                        .insert(level_value.clone(), format_items(&items, query.format));
                }
                Err(e) => {
                    warn!("Batch read of {} failed to decrypt: {}", node, e);
                    result.errors.insert(level_value.clone(), e.to_string());
                }
            }
        }
        Ok(result)
    }
}

