//! Value encryption service
//!
//! Wraps the value codec with per-node keys and drives key rotation over
//! the store one conf file at a time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dbconfig_common::crypto::is_encrypted;
use dbconfig_common::{DbConfigError, ValueCodec};
use dbconfig_persistence::{ConfigStore, DefinitionPersistence, FileKey, NodeKey, RekeyCount};

use crate::model::MergedItem;
use crate::model::version::{content_md5, decode_content, encode_content};

/// Encrypts values of `flag_encrypt` names with the key of the node holding them
#[derive(Clone, Debug)]
pub struct EncryptionService {
    codec: ValueCodec,
}

impl EncryptionService {
    pub fn new(codec: ValueCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn encrypt(&self, plaintext: &str, level_value: &str) -> Result<String, DbConfigError> {
        self.codec
            .encrypt(plaintext, level_value)
            .map_err(|e| DbConfigError::CryptoFailure(e.to_string()))
    }

    pub fn decrypt(&self, stored: &str, level_value: &str) -> Result<String, DbConfigError> {
        self.codec
            .decrypt(stored, level_value)
            .map_err(|e| DbConfigError::CryptoFailure(e.to_string()))
    }

    /// Decrypt every marked value in place using its source node's key
    pub fn decrypt_items(&self, items: &mut [MergedItem]) -> Result<(), DbConfigError> {
        for item in items.iter_mut().filter(|i| is_encrypted(&i.conf_value)) {
            item.conf_value = self.decrypt(&item.conf_value, &item.level_value).map_err(|e| {
                DbConfigError::CryptoFailure(format!("{}: {}", item.conf_name, e))
            })?;
        }
        Ok(())
    }
}

/// Rows rewritten for one conf file by a re-key run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyReport {
    pub namespace: String,
    pub conf_type: String,
    pub conf_file: String,
    pub rows: RekeyCount,
}

/// Re-encrypts stored values from one key prefix to another
pub struct Rekeyer {
    store: Arc<dyn ConfigStore>,
    from: ValueCodec,
    to: ValueCodec,
}

impl Rekeyer {
    pub fn new(store: Arc<dyn ConfigStore>, from: ValueCodec, to: ValueCodec) -> Self {
        Self { store, from, to }
    }

    fn rewrite_value(&self, level_value: &str, stored: &str) -> anyhow::Result<String> {
        if stored.is_empty() {
            return Ok(String::new());
        }
        let plaintext = self.from.decrypt(stored, level_value)?;
        Ok(self.to.encrypt(&plaintext, level_value)?)
    }

    fn rewrite_content(&self, content: &str) -> anyhow::Result<(String, String)> {
        let mut items = decode_content(content)?;
        for item in items
            .iter_mut()
            .filter(|i| i.flag_encrypt || is_encrypted(&i.conf_value))
        {
            item.conf_value = self.rewrite_value(&item.level_value, &item.conf_value)?;
        }
        let content = encode_content(&items)?;
        let md5 = content_md5(&content);
        Ok((content, md5))
    }

    /// Re-key one conf file in a single store transaction
    pub async fn rekey_file(&self, file: &FileKey) -> anyhow::Result<RekeyCount> {
        let encrypted_names: Vec<String> = self
            .store
            .name_def_list(file, true)
            .await?
            .into_iter()
            .filter(|d| d.flag_encrypt)
            .map(|d| d.conf_name)
            .collect();

        let rewrite_value =
            |node: &NodeKey, stored: &str| self.rewrite_value(&node.level_value, stored);
        let rewrite_content = |_: &NodeKey, content: &str| self.rewrite_content(content);

        self.store
            .rekey_file(file, &encrypted_names, &rewrite_value, &rewrite_content)
            .await
    }

    /// Re-key every conf file of `namespace` (all when empty), optionally
    /// narrowed to one conf_type. Stops at the first failing file; files
    /// already done stay re-keyed.
    pub async fn rekey_all(
        &self,
        namespace: &str,
        conf_type: Option<&str>,
    ) -> anyhow::Result<Vec<RekeyReport>> {
        let defs = self.store.file_def_list(namespace, conf_type).await?;
        let mut reports = Vec::with_capacity(defs.len());

        for def in defs {
            let file = def.key();
            let rows = match self.rekey_file(&file).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Re-key of {} failed and was rolled back: {}", file, e);
                    return Err(e);
                }
            };
            info!("Re-keyed {}: {} rows", file, rows.total());
            reports.push(RekeyReport {
                namespace: file.namespace,
                conf_type: file.conf_type,
                conf_file: file.conf_file,
                rows,
            });
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LevelName;

    #[test]
    fn test_decrypt_items_uses_source_key() {
        let service = EncryptionService::new(ValueCodec::new("dbconfig", false));
        let mut items = vec![
            MergedItem {
                conf_name: "password".into(),
                conf_value: service.encrypt("s3cret", "c1").unwrap(),
                level_name: Some(LevelName::Cluster),
                level_value: "c1".into(),
                flag_encrypt: true,
                ..Default::default()
            },
            MergedItem {
                conf_name: "port".into(),
                conf_value: "3306".into(),
                level_value: "0".into(),
                ..Default::default()
            },
        ];
        service.decrypt_items(&mut items).unwrap();
        assert_eq!(items[0].conf_value, "s3cret");
        assert_eq!(items[1].conf_value, "3306");
    }

    #[test]
    fn test_decrypt_items_wrong_key_is_crypto_failure() {
        let service = EncryptionService::new(ValueCodec::new("dbconfig", false));
        let mut items = vec![MergedItem {
            conf_name: "password".into(),
            conf_value: service.encrypt("s3cret", "c1").unwrap(),
            level_value: "c2".into(),
            ..Default::default()
        }];
        assert!(matches!(
            service.decrypt_items(&mut items),
            Err(DbConfigError::CryptoFailure(_))
        ));
    }
}
