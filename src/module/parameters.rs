//! Typed, documented component parameters.

use std::collections::BTreeMap;

use crate::description::{ConversionError, ConverterRegistry, FromParam, FromValue, ParamValue, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("Unknown parameter `{0}`")]
    NotFound(String),

    #[error("Parameter `{name}` holds a {found} value")]
    TypeMismatch { name: String, found: &'static str },

    #[error("Invalid value for parameter `{name}`: {source}")]
    Conversion {
        name: String,
        #[source]
        source: ConversionError,
    },
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    type_name: &'static str,
    description: String,
    default: ParamValue,
    value: Option<ParamValue>,
}

impl Parameter {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    /// Configured value, or the default.
    pub fn value(&self) -> &ParamValue {
        self.value.as_ref().unwrap_or(&self.default)
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// Parameters declared by a factory, filled from a module description.
///
/// # Examples
/// ```
/// use vplatform::module::Parameters;
///
/// let params = Parameters::new().declare::<u64>("size", "Memory size in bytes", 4096);
/// assert_eq!(params.get::<u64>("size").unwrap(), 4096);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: BTreeMap<String, Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter of type `T` with its default value.
    pub fn declare<T>(mut self, name: &str, description: &str, default: T) -> Self
    where
        T: FromValue + Into<ParamValue>,
    {
        self.entries.insert(
            name.to_string(),
            Parameter {
                type_name: T::TYPE_NAME,
                description: description.to_string(),
                default: default.into(),
                value: None,
            },
        );
        self
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fill the declared parameters from the keys of `descr`.
    ///
    /// Keys that are not declared are left alone; they show up later as
    /// unused configuration.
    pub fn fill(&mut self, descr: &Value, registry: &ConverterRegistry) -> Result<(), ParameterError> {
        if !descr.is_map() {
            return Ok(());
        }
        for (name, param) in self.entries.iter_mut() {
            let node = descr.get(name);
            if node.is_nil() {
                continue;
            }
            let value = registry
                .decode(param.type_name, &node)
                .map_err(|source| ParameterError::Conversion {
                    name: name.clone(),
                    source,
                })?;
            param.value = Some(value);
        }
        Ok(())
    }

    pub fn get<T: FromParam>(&self, name: &str) -> Result<T, ParameterError> {
        let param = self
            .entries
            .get(name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))?;
        T::from_param(param.value()).ok_or_else(|| ParameterError::TypeMismatch {
            name: name.to_string(),
            found: param.value().kind_name(),
        })
    }
}
