//! Output formatting of merged items

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use dbconfig_common::DbConfigError;

use super::item::MergedItem;

/// Separator splitting composite names into `section` and `key`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Separator {
    Dot,
    Hash,
    Pipe,
}

impl Separator {
    pub fn as_char(&self) -> char {
        match self {
            Separator::Dot => '.',
            Separator::Hash => '#',
            Separator::Pipe => '|',
        }
    }
}

/// How merged items are rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Full item metadata
    #[default]
    List,
    /// conf_name -> conf_value
    FlatMap,
    /// section -> {key -> conf_value}
    SplitMap(Separator),
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::List => "list",
            OutputFormat::FlatMap => "map",
            OutputFormat::SplitMap(Separator::Dot) => "map.",
            OutputFormat::SplitMap(Separator::Hash) => "map#",
            OutputFormat::SplitMap(Separator::Pipe) => "map|",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = DbConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "list" => Ok(OutputFormat::List),
            "map" => Ok(OutputFormat::FlatMap),
            "map." => Ok(OutputFormat::SplitMap(Separator::Dot)),
            "map#" => Ok(OutputFormat::SplitMap(Separator::Hash)),
            "map|" => Ok(OutputFormat::SplitMap(Separator::Pipe)),
            _ => Err(DbConfigError::InputValidation(format!(
                "illegal format {}, expect one of list, map, map., map#, map|",
                s
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OutputFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Render merged items in the requested format
pub fn format_items(items: &[MergedItem], format: OutputFormat) -> Value {
    match format {
        OutputFormat::List => {
            Value::Array(items.iter().filter_map(|i| serde_json::to_value(i).ok()).collect())
        }
        OutputFormat::FlatMap => Value::Object(
            items
                .iter()
                .map(|i| (i.conf_name.clone(), Value::String(i.conf_value.clone())))
                .collect(),
        ),
        OutputFormat::SplitMap(sep) => {
            let mut sections: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
            let mut scalars: BTreeMap<String, String> = BTreeMap::new();

            for item in items {
                match item.conf_name.split_once(sep.as_char()) {
                    Some((section, key)) => {
                        sections
                            .entry(section.to_string())
                            .or_default()
                            .insert(key.to_string(), Value::String(item.conf_value.clone()));
                    }
                    None => {
                        scalars.insert(item.conf_name.clone(), item.conf_value.clone());
                    }
                }
            }

            let mut out: Map<String, Value> = sections
                .into_iter()
                .map(|(section, map)| (section, Value::Object(map)))
                .collect();
            for (name, value) in scalars {
                out.entry(name).or_insert(Value::String(value));
            }
            Value::Object(out)
        }
    }
}
