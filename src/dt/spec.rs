// src/dt/spec.rs

//! Data Transformer specifications.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::config::model::{RawDataTransformerSpecification, RawFilter};
use crate::errors::ItemError;

pub const ENTITY_CLASS_RENAME: &str = "entity_class_rename";
pub const PARAMETER_RENAME: &str = "parameter_rename";
pub const VALUE_TRANSFORMER: &str = "value_transformer";

/// What a Data Transformer does to the databases passing through it.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSettings {
    /// `old class name -> new class name`
    EntityClassRename { name_map: BTreeMap<String, String> },
    /// `class name -> (old parameter name -> new parameter name)`
    ParameterRename {
        name_map: BTreeMap<String, BTreeMap<String, String>>,
    },
    /// Per-class value transformation instructions, passed through as is.
    ValueTransformer { instructions: Map<String, Value> },
}

impl FilterSettings {
    pub fn filter_type(&self) -> &'static str {
        match self {
            FilterSettings::EntityClassRename { .. } => ENTITY_CLASS_RENAME,
            FilterSettings::ParameterRename { .. } => PARAMETER_RENAME,
            FilterSettings::ValueTransformer { .. } => VALUE_TRANSFORMER,
        }
    }

    /// The filter configuration understood by database consumers.
    pub fn filter_config(&self) -> Value {
        match self {
            FilterSettings::EntityClassRename { name_map } => json!({
                "type": "entity_class_renamer",
                "name_map": name_map,
            }),
            FilterSettings::ParameterRename { name_map } => json!({
                "type": "parameter_renamer",
                "name_map": name_map,
            }),
            FilterSettings::ValueTransformer { instructions } => json!({
                "type": "value_transformer",
                "instructions": instructions,
            }),
        }
    }

    fn from_raw(filter: &RawFilter) -> Result<Self, ItemError> {
        let field = |key: &str| filter.settings.get(key).cloned().unwrap_or(Value::Null);
        let parse = |key: &str| -> Result<Value, ItemError> {
            match field(key) {
                Value::Null => Ok(json!({})),
                value => Ok(value),
            }
        };
        let invalid = |key: &str, err: serde_json::Error| {
            let type_ = &filter.type_;
            ItemError::InvalidSpecification(format!("invalid '{key}' in {type_} filter: {err}"))
        };

        match filter.type_.as_str() {
            ENTITY_CLASS_RENAME => {
                let key = "entity_class_name_map";
                let name_map = serde_json::from_value(parse(key)?).map_err(|e| invalid(key, e))?;
                Ok(FilterSettings::EntityClassRename { name_map })
            }
            PARAMETER_RENAME => {
                let key = "parameter_name_map";
                let name_map = serde_json::from_value(parse(key)?).map_err(|e| invalid(key, e))?;
                Ok(FilterSettings::ParameterRename { name_map })
            }
            VALUE_TRANSFORMER => {
                let key = "instructions";
                let instructions =
                    serde_json::from_value(parse(key)?).map_err(|e| invalid(key, e))?;
                Ok(FilterSettings::ValueTransformer { instructions })
            }
            other => Err(ItemError::InvalidSpecification(format!(
                "unknown filter type '{other}'"
            ))),
        }
    }

    fn to_raw(&self) -> RawFilter {
        let settings = match self {
            FilterSettings::EntityClassRename { name_map } => {
                json!({ "entity_class_name_map": name_map })
            }
            FilterSettings::ParameterRename { name_map } => {
                json!({ "parameter_name_map": name_map })
            }
            FilterSettings::ValueTransformer { instructions } => {
                json!({ "instructions": instructions })
            }
        };
        RawFilter {
            type_: self.filter_type().to_string(),
            settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTransformerSpecification {
    name: String,
    description: String,
    settings: Option<FilterSettings>,
}

impl DataTransformerSpecification {
    pub fn new(name: impl Into<String>, settings: Option<FilterSettings>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn settings(&self) -> Option<&FilterSettings> {
        self.settings.as_ref()
    }

    pub fn to_raw(&self) -> RawDataTransformerSpecification {
        RawDataTransformerSpecification {
            name: self.name.clone(),
            item_type: crate::dt::item::ITEM_TYPE.to_string(),
            description: self.description.clone(),
            filter: self.settings.as_ref().map(FilterSettings::to_raw),
        }
    }
}

impl TryFrom<RawDataTransformerSpecification> for DataTransformerSpecification {
    type Error = ItemError;

    fn try_from(raw: RawDataTransformerSpecification) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(ItemError::InvalidSpecification(
                "Data Transformer specification has no name".to_string(),
            ));
        }
        let settings = raw.filter.as_ref().map(FilterSettings::from_raw).transpose()?;
        Ok(Self {
            name: raw.name,
            description: raw.description,
            settings,
        })
    }
}
