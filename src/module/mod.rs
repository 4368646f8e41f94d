//! Module namespaces, factory traits and the module registry.
//!
//! Components and backends are built by a [`ComponentFactory`] in two
//! steps: `discover` runs for every module first and may leave
//! reservations in the [`DiscoveryContext`], then `create` builds the
//! component. Plugins are built by a [`PluginFactory`] and observe the
//! build stages.

pub mod parameters;
pub mod registry;

pub use parameters::{Parameter, ParameterError, Parameters};
pub use registry::ModuleRegistry;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::orchestrator::BuildStage;
use crate::parser::ModuleNode;
use crate::port::{CapabilityError, PortSet};

/// Kind of module a description entry declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Global,
    Component,
    Backend,
    Plugin,
}

impl Namespace {
    pub const MODULES: [Namespace; 3] = [Namespace::Component, Namespace::Backend, Namespace::Plugin];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Global => "global",
            Namespace::Component => "component",
            Namespace::Backend => "backend",
            Namespace::Plugin => "plugin",
        }
    }

    /// Key of the platform description listing modules of this namespace.
    pub fn description_key(&self) -> &'static str {
        match self {
            Namespace::Global => "global",
            Namespace::Component => "components",
            Namespace::Backend => "backends",
            Namespace::Plugin => "plugins",
        }
    }

    pub fn find_by_name(name: &str) -> Option<Namespace> {
        match name {
            "global" => Some(Namespace::Global),
            "component" => Some(Namespace::Component),
            "backend" => Some(Namespace::Backend),
            "plugin" => Some(Namespace::Plugin),
            _ => None,
        }
    }

    /// Whether modules of this namespace expose ports.
    pub fn has_ports(&self) -> bool {
        matches!(self, Namespace::Component | Namespace::Backend)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Invalid parameter `{name}` for {module}: {reason}")]
    InvalidParameter {
        module: String,
        name: String,
        reason: String,
    },

    #[error("Cannot forward port {child} of {module} to {parent}")]
    Hierarchy {
        module: String,
        child: String,
        parent: String,
    },
}

/// An instantiated component or backend.
pub trait Component {
    fn name(&self) -> &str;

    fn ports(&self) -> &PortSet;

    fn as_any(&self) -> &dyn Any;
}

/// Reservations left by components during discovery, read back at
/// creation.
#[derive(Debug, Default)]
pub struct DiscoveryContext {
    reservations: BTreeMap<(String, String), Vec<String>>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `by` needs one `attribute` slot on module `module`.
    pub fn reserve(&mut self, module: &str, attribute: &str, by: &str) {
        self.reservations
            .entry((module.to_string(), attribute.to_string()))
            .or_default()
            .push(by.to_string());
    }

    /// Modules that reserved `attribute` on `module`, in discovery order.
    pub fn reservations(&self, module: &str, attribute: &str) -> &[String] {
        self.reservations
            .get(&(module.to_string(), attribute.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub trait ComponentFactory {
    fn type_name(&self) -> &str;

    /// Name selected by the `implementation` key of a module.
    fn implementation(&self) -> &str {
        self.type_name()
    }

    fn description(&self) -> &str;

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn discover(&self, _node: &ModuleNode, _ctx: &mut DiscoveryContext) -> Result<(), FactoryError> {
        Ok(())
    }

    fn create(&self, node: &ModuleNode, ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError>;
}

/// What a plugin sees of the build at each stage.
#[derive(Debug)]
pub struct StageEvent<'a> {
    pub stage: BuildStage,
    pub platform: &'a str,
    pub components: Vec<&'a str>,
}

pub trait Plugin {
    fn name(&self) -> &str;

    fn on_stage(&mut self, event: &StageEvent<'_>);
}

pub trait PluginFactory {
    fn type_name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn create(&self, node: &ModuleNode) -> Result<Box<dyn Plugin>, FactoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names() {
        for ns in Namespace::MODULES {
            assert_eq!(Namespace::find_by_name(ns.name()), Some(ns));
        }
        assert_eq!(Namespace::Component.description_key(), "components");
        assert_eq!(Namespace::find_by_name("components"), None);
        assert!(!Namespace::Plugin.has_ports());
    }

    #[test]
    fn test_discovery_reservations() {
        let mut ctx = DiscoveryContext::new();
        ctx.reserve("bus", "initiators", "cpu0");
        ctx.reserve("bus", "initiators", "cpu1");

        assert_eq!(ctx.reservations("bus", "initiators"), ["cpu0", "cpu1"]);
        assert!(ctx.reservations("bus", "targets").is_empty());
    }
}
