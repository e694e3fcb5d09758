//! Conf file and conf name definitions

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use dbconfig_common::DbConfigError;
use dbconfig_persistence::{
    ConfigFileDefData, ConfigNameDefData, ConfigStore, DefinitionPersistence, FileKey,
};

use crate::model::LevelName;
use crate::validate::validate_value;

use super::encryption::EncryptionService;

/// A file definition with its name definitions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileDetail {
    pub conf_file_info: ConfigFileDefData,
    pub conf_names: Vec<ConfigNameDefData>,
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ConfigStore>,
    crypto: EncryptionService,
}

impl FileService {
    pub fn new(store: Arc<dyn ConfigStore>, crypto: EncryptionService) -> Self {
        Self { store, crypto }
    }

    pub async fn add(
        &self,
        def: ConfigFileDefData,
        names: Vec<ConfigNameDefData>,
        operator: &str,
    ) -> anyhow::Result<()> {
        let file = def.key();
        if self.store.file_def_find(&file).await?.is_some() {
            return Err(DbConfigError::DomainConflict(format!("conf file {} already exists", file)).into());
        }
        self.write(def, names, operator).await?;
        info!("Added conf file {} by {}", file, operator);
        Ok(())
    }

    pub async fn update(
        &self,
        def: ConfigFileDefData,
        names: Vec<ConfigNameDefData>,
        operator: &str,
    ) -> anyhow::Result<()> {
        let file = def.key();
        let existing = self
            .store
            .file_def_find(&file)
            .await?
            .ok_or_else(|| DbConfigError::NotFound(format!("conf file {}", file)))?;
        let def = ConfigFileDefData {
            created_at: existing.created_at,
            ..def
        };
        self.write(def, names, operator).await?;
        info!("Updated conf file {} by {}", file, operator);
        Ok(())
    }

    async fn write(
        &self,
        mut def: ConfigFileDefData,
        names: Vec<ConfigNameDefData>,
        operator: &str,
    ) -> anyhow::Result<()> {
        check_file_def(&def)?;
        let file = def.key();
        def.updated_by = operator.to_string();

        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(names.len());
        for mut name in names {
            if name.conf_name.trim().is_empty() {
                return Err(DbConfigError::InputValidation("conf_name is required".to_string()).into());
            }
            if !seen.insert(name.conf_name.clone()) {
                return Err(DbConfigError::DomainConflict(format!(
                    "duplicate conf_name {}",
                    name.conf_name
                ))
                .into());
            }
            if !name.value_default.is_empty() {
                validate_value(
                    &name.value_default,
                    &name.value_type,
                    &name.value_type_sub,
                    &name.value_allowed,
                )
                .map_err(|e| {
                    DbConfigError::InputValidation(format!(
                        "value_default of {}: {}",
                        name.conf_name, e
                    ))
                })?;
                if name.flag_encrypt {
                    name.value_default = self
                        .crypto
                        .encrypt(&name.value_default, dbconfig_common::PLAT_LEVEL_VALUE)?;
                }
            }
            name.namespace = file.namespace.clone();
            name.conf_type = file.conf_type.clone();
            name.conf_file = file.conf_file.clone();
            name.updated_by = operator.to_string();
            prepared.push(name);
        }

        self.store.file_def_upsert(&def, &prepared).await
    }

    pub async fn list(
        &self,
        namespace: &str,
        conf_type: Option<&str>,
    ) -> anyhow::Result<Vec<ConfigFileDefData>> {
        self.store.file_def_list(namespace, conf_type).await
    }

    pub async fn query(&self, file: &FileKey) -> anyhow::Result<FileDetail> {
        let conf_file_info = self
            .store
            .file_def_find(file)
            .await?
            .ok_or_else(|| DbConfigError::NotFound(format!("conf file {}", file)))?;
        let conf_names = self.store.name_def_list(file, false).await?;
        Ok(FileDetail {
            conf_file_info,
            conf_names,
        })
    }

    /// Name definitions of a file, optionally narrowed to names containing `conf_name`
    pub async fn list_names(
        &self,
        file: &FileKey,
        conf_name: Option<&str>,
        include_deleted: bool,
    ) -> anyhow::Result<Vec<ConfigNameDefData>> {
        let mut names = self.store.name_def_list(file, include_deleted).await?;
        if let Some(pattern) = conf_name.filter(|p| !p.is_empty()) {
            names.retain(|n| n.conf_name.contains(pattern));
        }
        Ok(names)
    }
}

fn check_file_def(def: &ConfigFileDefData) -> Result<(), DbConfigError> {
    if def.namespace.is_empty() || def.conf_type.is_empty() || def.conf_file.is_empty() {
        return Err(DbConfigError::InputValidation(
            "namespace, conf_type and conf_file are required".to_string(),
        ));
    }

    let levels = def
        .level_names
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(LevelName::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if !def.level_versioned.is_empty() {
        let versioned = LevelName::parse(&def.level_versioned)?;
        if !levels.contains(&versioned) {
            return Err(DbConfigError::InputValidation(format!(
                "level_versioned {} must be one of level_names {}",
                versioned, def.level_names
            )));
        }
    }
    if def.version_keep_limit < 0 {
        return Err(DbConfigError::InputValidation(
            "version_keep_limit must not be negative".to_string(),
        ));
    }
    Ok(())
}
