//! Platform description parser.
//!
//! Turns the description of one platform into a [`PlatformNode`]: the
//! platform fields, its components, backends and plugins, and the
//! bindings declared by components and backends. Module types are checked
//! against the [`ModuleRegistry`] and module parameters are filled from
//! the description. Peer references are resolved once every module of the
//! platform is known.

pub mod binding;

pub use binding::{BindingNode, PeerRef};

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::description::{ConversionError, FromValue, Origin, Value};
use crate::module::{ModuleRegistry, Namespace, ParameterError, Parameters};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Missing field `{field}` at {origin}")]
    MissingField { field: String, origin: Origin },

    #[error("Invalid type for field `{field}`. Expected `{expected}` at {origin}")]
    InvalidFieldType {
        field: String,
        expected: &'static str,
        origin: Origin,
    },

    #[error("{message} at {origin}")]
    InvalidNode { message: String, origin: Origin },

    #[error("Module type `{namespace}.{type_name}` not found at {origin}")]
    ModuleTypeNotFound {
        namespace: Namespace,
        type_name: String,
        origin: Origin,
    },

    #[error("Implementation `{implementation}` of `{type_name}` not found at {origin}")]
    ImplementationNotFound {
        type_name: String,
        implementation: String,
        origin: Origin,
    },

    #[error("Namespace `{name}` not found at {origin}")]
    NamespaceNotFound { name: String, origin: Origin },

    #[error("Module `{namespace}:{module}` not found at {origin}")]
    ModuleNotFound {
        namespace: Namespace,
        module: String,
        origin: Origin,
    },

    #[error("Port `{port}` not found on module `{namespace}:{module}` at {origin}")]
    PortNotFound {
        namespace: Namespace,
        module: String,
        port: String,
        origin: Origin,
    },

    #[error("No port found on module `{namespace}:{module}` at {origin}")]
    NoPortFound {
        namespace: Namespace,
        module: String,
        origin: Origin,
    },

    #[error("Port `{port}` of `{module}` is already bound at {origin}")]
    BindingAlreadyExists {
        module: String,
        port: String,
        origin: Origin,
    },
}

fn invalid_field<T: FromValue>(field: &str, node: &Value) -> ParseError {
    ParseError::InvalidFieldType {
        field: field.to_string(),
        expected: T::TYPE_NAME,
        origin: node.origin(),
    }
}

/// Required field `field` of `descr`.
fn required<T: FromValue>(descr: &Value, field: &str) -> Result<T, ParseError> {
    let node = descr.get(field);
    if node.is_nil() || node.is_invalid() {
        return Err(ParseError::MissingField {
            field: field.to_string(),
            origin: descr.origin(),
        });
    }
    node.parse::<T>().map_err(|_| invalid_field::<T>(field, &node))
}

/// Optional field `field` of `descr`.
fn optional<T: FromValue>(descr: &Value, field: &str) -> Result<Option<T>, ParseError> {
    let node = descr.get(field);
    if node.is_nil() || node.is_invalid() {
        return Ok(None);
    }
    node.parse::<T>()
        .map(Some)
        .map_err(|_| invalid_field::<T>(field, &node))
}

/// Optional map of named sub nodes, e.g. `components`.
fn named_subnodes(descr: &Value, field: &str) -> Result<Vec<(String, Value)>, ParseError> {
    let node = descr.get(field);
    match node {
        Value::Nil(_) | Value::Invalid => Ok(Vec::new()),
        Value::Map(_) => Ok(node
            .keys()
            .map(|name| (name.to_string(), node.get(name)))
            .collect()),
        other => Err(ParseError::InvalidNode {
            message: format!("Expected a map of named nodes for `{}`", field),
            origin: other.origin(),
        }),
    }
}

/// A parsed component, backend or plugin.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    name: String,
    namespace: Namespace,
    type_name: String,
    implementation: Option<String>,
    descr: Value,
    params: Parameters,
    bindings: BTreeMap<String, BindingNode>,
}

impl ModuleNode {
    fn parse(name: &str, namespace: Namespace, descr: &Value, registry: &ModuleRegistry) -> Result<Self, ParseError> {
        if !descr.is_map() {
            return Err(ParseError::InvalidNode {
                message: format!("Expected a map for {} `{}`", namespace, name),
                origin: descr.origin(),
            });
        }

        let type_name: String = required(descr, "type")?;
        if !registry.type_exists(namespace, &type_name) {
            return Err(ParseError::ModuleTypeNotFound {
                namespace,
                type_name,
                origin: descr.get("type").origin(),
            });
        }

        let implementation: Option<String> = match namespace {
            Namespace::Component => optional(descr, "implementation")?,
            _ => None,
        };

        let mut params = match namespace {
            Namespace::Plugin => registry
                .plugin_factory(&type_name)
                .map(|f| f.parameters())
                .unwrap_or_default(),
            _ => {
                let factory = registry
                    .component_factory(namespace, &type_name, implementation.as_deref())
                    .ok_or_else(|| ParseError::ImplementationNotFound {
                        type_name: type_name.clone(),
                        implementation: implementation.clone().unwrap_or_default(),
                        origin: descr.get("implementation").origin(),
                    })?;
                factory.parameters()
            }
        };
        params
            .fill(descr, registry.converters())
            .map_err(|e| match e {
                ParameterError::Conversion { name, source } => {
                    debug!("Parameter `{}` of `{}`: {}", name, descr.origin(), source);
                    ParseError::InvalidFieldType {
                        origin: descr.get(&name).origin(),
                        expected: params_type_name(&source),
                        field: name,
                    }
                }
                other => ParseError::InvalidNode {
                    message: other.to_string(),
                    origin: descr.origin(),
                },
            })?;

        Ok(ModuleNode {
            name: name.to_string(),
            namespace,
            type_name,
            implementation,
            descr: descr.clone(),
            params,
            bindings: BTreeMap::new(),
        })
    }

    /// Read the `bindings` map. Peers are checked against `known`.
    fn parse_bindings(&mut self, known: &BTreeSet<(Namespace, String)>) -> Result<(), ParseError> {
        for (local_port, descr) in named_subnodes(&self.descr, "bindings")? {
            let binding = BindingNode::parse(&local_port, &descr, self.namespace)?;
            let peer = binding.peer();
            if !peer.namespace.has_ports() || !known.contains(&(peer.namespace, peer.module.clone())) {
                return Err(ParseError::ModuleNotFound {
                    namespace: peer.namespace,
                    module: peer.module.clone(),
                    origin: descr.origin(),
                });
            }
            self.bindings.insert(local_port, binding);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    pub fn descr(&self) -> &Value {
        &self.descr
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn bindings(&self) -> impl Iterator<Item = &BindingNode> {
        self.bindings.values()
    }

    pub fn binding(&self, local_port: &str) -> Option<&BindingNode> {
        self.bindings.get(local_port)
    }

    /// Declare a binding of `local_port`. A port binds once.
    pub fn add_binding(&mut self, binding: BindingNode) -> Result<(), ParseError> {
        if self.bindings.contains_key(binding.local_port()) {
            return Err(ParseError::BindingAlreadyExists {
                module: self.name.clone(),
                port: binding.local_port().to_string(),
                origin: binding.descr().origin(),
            });
        }
        self.bindings.insert(binding.local_port().to_string(), binding);
        Ok(())
    }

    pub fn remove_binding(&mut self, local_port: &str) -> Option<BindingNode> {
        self.bindings.remove(local_port)
    }
}

fn params_type_name(source: &ConversionError) -> &'static str {
    match source {
        ConversionError::WrongKind { target, .. }
        | ConversionError::InvalidValue { target, .. }
        | ConversionError::OutOfRange { target, .. } => *target,
        ConversionError::NotIterable { .. } | ConversionError::UnknownType(_) => "value",
    }
}

/// A parsed platform.
#[derive(Debug, Clone)]
pub struct PlatformNode {
    name: String,
    descr: Value,
    description: String,
    generic: bool,
    inherit: Option<String>,
    components: BTreeMap<String, ModuleNode>,
    backends: BTreeMap<String, ModuleNode>,
    plugins: BTreeMap<String, ModuleNode>,
}

impl PlatformNode {
    /// Parse the description of platform `name`.
    pub fn parse(name: &str, descr: &Value, registry: &ModuleRegistry) -> Result<Self, ParseError> {
        if !descr.is_map() {
            return Err(ParseError::InvalidNode {
                message: format!("Expected a map for platform `{}`", name),
                origin: descr.origin(),
            });
        }

        let description: String = required(descr, "description")?;
        let generic = optional::<bool>(descr, "generic")?.unwrap_or(false);
        let inherit = optional::<String>(descr, "inherit")?.filter(|parent| !parent.is_empty());

        let mut platform = PlatformNode {
            name: name.to_string(),
            descr: descr.clone(),
            description,
            generic,
            inherit,
            components: BTreeMap::new(),
            backends: BTreeMap::new(),
            plugins: BTreeMap::new(),
        };

        for ns in Namespace::MODULES {
            let mut modules = BTreeMap::new();
            for (module_name, module_descr) in named_subnodes(descr, ns.description_key())? {
                let module = ModuleNode::parse(&module_name, ns, &module_descr, registry)?;
                modules.insert(module_name, module);
            }
            *platform.modules_mut(ns) = modules;
        }

        let known: BTreeSet<(Namespace, String)> = platform
            .components
            .keys()
            .map(|n| (Namespace::Component, n.clone()))
            .chain(platform.backends.keys().map(|n| (Namespace::Backend, n.clone())))
            .collect();
        for module in platform
            .components
            .values_mut()
            .chain(platform.backends.values_mut())
        {
            module.parse_bindings(&known)?;
        }

        debug!(
            "Parsed platform `{}`: {} components, {} backends, {} plugins",
            name,
            platform.components.len(),
            platform.backends.len(),
            platform.plugins.len()
        );
        Ok(platform)
    }

    fn modules_mut(&mut self, ns: Namespace) -> &mut BTreeMap<String, ModuleNode> {
        match ns {
            Namespace::Backend => &mut self.backends,
            Namespace::Plugin => &mut self.plugins,
            Namespace::Component | Namespace::Global => &mut self.components,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descr(&self) -> &Value {
        &self.descr
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_generic(&self) -> bool {
        self.generic
    }

    pub fn parent(&self) -> Option<&str> {
        self.inherit.as_deref()
    }

    pub fn components(&self) -> &BTreeMap<String, ModuleNode> {
        &self.components
    }

    pub fn backends(&self) -> &BTreeMap<String, ModuleNode> {
        &self.backends
    }

    pub fn plugins(&self) -> &BTreeMap<String, ModuleNode> {
        &self.plugins
    }

    /// Component or backend `name` of namespace `ns`.
    pub fn module_with_ports(&self, ns: Namespace, name: &str) -> Option<&ModuleNode> {
        match ns {
            Namespace::Component => self.components.get(name),
            Namespace::Backend => self.backends.get(name),
            Namespace::Global | Namespace::Plugin => None,
        }
    }

    /// Add a binding from `local_port` of module `module` to `peer`.
    pub fn add_binding(
        &mut self,
        ns: Namespace,
        module: &str,
        local_port: &str,
        peer: PeerRef,
        descr: Value,
    ) -> Result<(), ParseError> {
        if self.module_with_ports(peer.namespace, &peer.module).is_none() {
            return Err(ParseError::ModuleNotFound {
                namespace: peer.namespace,
                module: peer.module,
                origin: descr.origin(),
            });
        }
        let node = match ns {
            Namespace::Component => self.components.get_mut(module),
            Namespace::Backend => self.backends.get_mut(module),
            Namespace::Global | Namespace::Plugin => None,
        }
        .ok_or_else(|| ParseError::ModuleNotFound {
            namespace: ns,
            module: module.to_string(),
            origin: descr.origin(),
        })?;
        node.add_binding(BindingNode::new(local_port, peer, descr))
    }

    pub fn remove_binding(&mut self, ns: Namespace, module: &str, local_port: &str) -> Option<BindingNode> {
        match ns {
            Namespace::Component => self.components.get_mut(module),
            Namespace::Backend => self.backends.get_mut(module),
            Namespace::Global | Namespace::Plugin => None,
        }
        .and_then(|node| node.remove_binding(local_port))
    }
}
