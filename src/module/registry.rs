//! Registry of the module factories known to a build.

use crate::description::ConverterRegistry;

use super::{ComponentFactory, Namespace, PluginFactory};

/// Factories per namespace, plus the converters used to fill parameters.
///
/// The registry is an explicit context object handed to the parser and
/// the orchestrator.
#[derive(Default)]
pub struct ModuleRegistry {
    components: Vec<Box<dyn ComponentFactory>>,
    backends: Vec<Box<dyn ComponentFactory>>,
    plugins: Vec<Box<dyn PluginFactory>>,
    converters: ConverterRegistry,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component(&mut self, factory: Box<dyn ComponentFactory>) {
        self.components.push(factory);
    }

    pub fn register_backend(&mut self, factory: Box<dyn ComponentFactory>) {
        self.backends.push(factory);
    }

    pub fn register_plugin(&mut self, factory: Box<dyn PluginFactory>) {
        self.plugins.push(factory);
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    fn factories(&self, ns: Namespace) -> &[Box<dyn ComponentFactory>] {
        match ns {
            Namespace::Component => self.components.as_slice(),
            Namespace::Backend => self.backends.as_slice(),
            Namespace::Global | Namespace::Plugin => &[],
        }
    }

    pub fn type_exists(&self, ns: Namespace, type_name: &str) -> bool {
        match ns {
            Namespace::Plugin => self.plugin_factory(type_name).is_some(),
            _ => self
                .factories(ns)
                .iter()
                .any(|f| f.type_name() == type_name),
        }
    }

    /// Factory building modules of `type_name`.
    ///
    /// With an `implementation`, the factory of that implementation is
    /// selected, otherwise the first one registered for the type.
    pub fn component_factory(
        &self,
        ns: Namespace,
        type_name: &str,
        implementation: Option<&str>,
    ) -> Option<&dyn ComponentFactory> {
        let mut matching = self
            .factories(ns)
            .iter()
            .filter(|f| f.type_name() == type_name);
        let factory = match implementation {
            Some(implementation) => matching.find(|f| f.implementation() == implementation),
            None => matching.next(),
        };
        factory.map(|f| f.as_ref())
    }

    pub fn plugin_factory(&self, type_name: &str) -> Option<&dyn PluginFactory> {
        self.plugins
            .iter()
            .find(|f| f.type_name() == type_name)
            .map(|f| f.as_ref())
    }

    /// `(type, description)` of every factory of `ns`, for listings.
    pub fn types(&self, ns: Namespace) -> Vec<(&str, &str)> {
        match ns {
            Namespace::Plugin => self
                .plugins
                .iter()
                .map(|f| (f.type_name(), f.description()))
                .collect(),
            _ => self
                .factories(ns)
                .iter()
                .map(|f| (f.type_name(), f.description()))
                .collect(),
        }
    }
}
