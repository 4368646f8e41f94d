//! Platform orchestrator.
//!
//! Builds a [`Platform`] out of a parsed [`PlatformNode`]. Components first
//! go through a discovery pass, where they can leave reservations for
//! their peers, then are created for real. Once every component and
//! backend exists, the bindings declared in the description are resolved
//! and connected. Plugins observe each stage of the build.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::description::{Origin, Value};
use crate::module::{
    Component, ComponentFactory, DiscoveryContext, FactoryError, ModuleRegistry, Namespace, Plugin,
    StageEvent,
};
use crate::parser::{BindingNode, ModuleNode, ParseError, PlatformNode};
use crate::port::{BindingInfo, Port};

/// Build stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    BeforeBuild,
    AfterDiscovery,
    AfterInstantiation,
    AfterBindings,
    AfterBuild,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::BeforeBuild => "before build",
            BuildStage::AfterDiscovery => "after discovery",
            BuildStage::AfterInstantiation => "after instantiation",
            BuildStage::AfterBindings => "after bindings",
            BuildStage::AfterBuild => "after build",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Cannot build {namespace} `{module}`: {source}")]
    Factory {
        namespace: Namespace,
        module: String,
        #[source]
        source: FactoryError,
    },

    #[error("Port {port} is already connected at {origin}")]
    AlreadyConnected { port: String, origin: Origin },

    #[error("Cannot bind {local} to {peer} at {origin}")]
    BindingFailed {
        local: String,
        peer: String,
        origin: Origin,
    },
}

/// A binding resolved by the binding pass.
#[derive(Debug, Clone)]
pub struct BindingRecord {
    pub local: String,
    pub peer: String,
    pub capability: &'static str,
    pub info: BindingInfo,
}

impl fmt::Display for BindingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.local, self.peer, self.capability)?;
        for (key, value) in self.info.iter() {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// A built platform.
pub struct Platform {
    name: String,
    components: BTreeMap<String, Box<dyn Component>>,
    backends: BTreeMap<String, Box<dyn Component>>,
    plugins: Vec<Box<dyn Plugin>>,
    bindings: Vec<BindingRecord>,
    unused_keys: Vec<String>,
}

impl Platform {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self, name: &str) -> Option<&dyn Component> {
        self.components.get(name).map(|c| c.as_ref())
    }

    pub fn backend(&self, name: &str) -> Option<&dyn Component> {
        self.backends.get(name).map(|c| c.as_ref())
    }

    /// Component `name` as its concrete type.
    pub fn component_as<T: 'static>(&self, name: &str) -> Option<&T> {
        self.component(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name())
    }

    /// Port `port` of the component or backend `module`.
    pub fn port(&self, ns: Namespace, module: &str, port: &str) -> Option<&Rc<Port>> {
        modules(&self.components, &self.backends, ns)
            .and_then(|m| m.get(module))
            .and_then(|c| c.ports().get(port))
    }

    /// Bindings resolved by the build, in resolution order.
    pub fn bindings(&self) -> &[BindingRecord] {
        &self.bindings
    }

    /// Dotted paths of the description keys no module consumed.
    pub fn unused_keys(&self) -> &[String] {
        &self.unused_keys
    }
}

type Instances = BTreeMap<String, Box<dyn Component>>;

fn modules<'a>(components: &'a Instances, backends: &'a Instances, ns: Namespace) -> Option<&'a Instances> {
    match ns {
        Namespace::Component => Some(components),
        Namespace::Backend => Some(backends),
        Namespace::Global | Namespace::Plugin => None,
    }
}

/// Builds platforms from the factories of a [`ModuleRegistry`].
pub struct Orchestrator<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Build `node` into a platform.
    ///
    /// # Arguments
    /// * `node` - The parsed platform description
    ///
    /// # Returns
    /// * `Ok(Platform)` - Every module created and every binding connected
    /// * `Err(BuildError)` - The first module or binding that failed
    pub fn build(&self, node: &PlatformNode) -> Result<Platform, BuildError> {
        info!("Building platform `{}`", node.name());

        let mut plugins = self.create_plugins(node)?;
        let mut components = Instances::new();
        let mut backends = Instances::new();

        hook(&mut plugins, BuildStage::BeforeBuild, node.name(), &components);

        let mut ctx = DiscoveryContext::new();
        for module in node.components().values() {
            let factory = self.factory(module)?;
            factory
                .discover(module, &mut ctx)
                .map_err(|source| factory_error(module, source))?;
        }
        hook(&mut plugins, BuildStage::AfterDiscovery, node.name(), &components);

        for module in node.components().values() {
            components.insert(module.name().to_string(), self.create(module, &ctx)?);
        }
        for module in node.backends().values() {
            backends.insert(module.name().to_string(), self.create(module, &ctx)?);
        }
        hook(&mut plugins, BuildStage::AfterInstantiation, node.name(), &components);

        let mut bindings = Vec::new();
        for module in node.components().values().chain(node.backends().values()) {
            for binding in module.bindings() {
                let record = resolve_binding(&components, &backends, module, binding)?;
                debug!("Bound {}", record);
                bindings.push(record);
            }
        }
        info!("Resolved {} binding(s)", bindings.len());
        hook(&mut plugins, BuildStage::AfterBindings, node.name(), &components);

        hook(&mut plugins, BuildStage::AfterBuild, node.name(), &components);

        let unused_keys = report_unused_keys(node.descr());

        Ok(Platform {
            name: node.name().to_string(),
            components,
            backends,
            plugins,
            bindings,
            unused_keys,
        })
    }

    fn create_plugins(&self, node: &PlatformNode) -> Result<Vec<Box<dyn Plugin>>, BuildError> {
        let mut plugins = Vec::new();
        for module in node.plugins().values() {
            let factory = self
                .registry
                .plugin_factory(module.type_name())
                .ok_or_else(|| type_not_found(module))?;
            let plugin = factory
                .create(module)
                .map_err(|source| factory_error(module, source))?;
            debug!("Created plugin `{}` of type `{}`", module.name(), module.type_name());
            plugins.push(plugin);
        }
        Ok(plugins)
    }

    fn factory(&self, module: &ModuleNode) -> Result<&'a dyn ComponentFactory, BuildError> {
        self.registry
            .component_factory(module.namespace(), module.type_name(), module.implementation())
            .ok_or_else(|| type_not_found(module))
    }

    fn create(&self, module: &ModuleNode, ctx: &DiscoveryContext) -> Result<Box<dyn Component>, BuildError> {
        let factory = self.factory(module)?;
        let component = factory
            .create(module, ctx)
            .map_err(|source| factory_error(module, source))?;
        debug!(
            "Created {} `{}` of type `{}` with {} port(s)",
            module.namespace(),
            module.name(),
            module.type_name(),
            component.ports().len()
        );
        Ok(component)
    }
}

fn type_not_found(module: &ModuleNode) -> BuildError {
    BuildError::Parse(ParseError::ModuleTypeNotFound {
        namespace: module.namespace(),
        type_name: module.type_name().to_string(),
        origin: module.descr().get("type").origin(),
    })
}

fn factory_error(module: &ModuleNode, source: FactoryError) -> BuildError {
    BuildError::Factory {
        namespace: module.namespace(),
        module: module.name().to_string(),
        source,
    }
}

fn hook(plugins: &mut [Box<dyn Plugin>], stage: BuildStage, platform: &str, components: &Instances) {
    debug!("Stage: {}", stage);
    let event = StageEvent {
        stage,
        platform,
        components: components.keys().map(String::as_str).collect(),
    };
    for plugin in plugins.iter_mut() {
        plugin.on_stage(&event);
    }
}

/// Connect the local port of `binding` to its peer port.
fn resolve_binding(
    components: &Instances,
    backends: &Instances,
    module: &ModuleNode,
    binding: &BindingNode,
) -> Result<BindingRecord, BuildError> {
    let origin = binding.descr().origin();
    let peer = binding.peer();

    let local = modules(components, backends, module.namespace())
        .and_then(|m| m.get(module.name()))
        .and_then(|c| c.ports().get(binding.local_port()))
        .ok_or_else(|| ParseError::PortNotFound {
            namespace: module.namespace(),
            module: module.name().to_string(),
            port: binding.local_port().to_string(),
            origin: origin.clone(),
        })?;

    let peer_component = modules(components, backends, peer.namespace)
        .and_then(|m| m.get(&peer.module))
        .ok_or_else(|| ParseError::ModuleNotFound {
            namespace: peer.namespace,
            module: peer.module.clone(),
            origin: origin.clone(),
        })?;
    let remote = match &peer.port {
        Some(port) => peer_component.ports().get(port).ok_or_else(|| ParseError::PortNotFound {
            namespace: peer.namespace,
            module: peer.module.clone(),
            port: port.clone(),
            origin: origin.clone(),
        })?,
        None => peer_component.ports().first().ok_or_else(|| ParseError::NoPortFound {
            namespace: peer.namespace,
            module: peer.module.clone(),
            origin: origin.clone(),
        })?,
    };

    if let Some(taken) = [local, remote].into_iter().find(|port| port.is_busy()) {
        return Err(BuildError::AlreadyConnected {
            port: taken.full_name(),
            origin,
        });
    }

    let outcome = local
        .try_connect(remote, binding.descr())
        .ok_or_else(|| BuildError::BindingFailed {
            local: local.full_name(),
            peer: remote.full_name(),
            origin,
        })?;

    Ok(BindingRecord {
        local: local.full_name(),
        peer: remote.full_name(),
        capability: outcome.capability,
        info: outcome.info,
    })
}

/// Report the keys of the module subtrees of `descr` that nothing
/// converted.
fn report_unused_keys(descr: &Value) -> Vec<String> {
    let mut unused = Vec::new();
    for ns in Namespace::MODULES {
        let key = ns.description_key();
        descr.get(key).visit_non_converted(|path, value| {
            let full = format!("{}.{}", key, path);
            warn!("Unused configuration key `{}` at {}", full, value.origin());
            unused.push(full);
        });
    }
    unused
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;

    use super::*;
    use crate::components::{self, Bus, CharNullFactory, Cluster, Gpio, TraceFactory};
    use crate::description::loader;
    use crate::module::ComponentFactory;
    use crate::parser::PeerRef;
    use crate::port::{Direction, PortSet};

    struct Foo {
        name: String,
        ports: PortSet,
    }

    impl Component for Foo {
        fn name(&self) -> &str {
            &self.name
        }

        fn ports(&self) -> &PortSet {
            &self.ports
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct FooFactory;

    impl ComponentFactory for FooFactory {
        fn type_name(&self) -> &str {
            "foo"
        }

        fn description(&self) -> &str {
            "Two inout lines"
        }

        fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
            let mut ports = PortSet::new();
            ports.declare(Port::signal(node.name(), "port-a", Direction::InOut));
            ports.declare(Port::signal(node.name(), "port-b", Direction::InOut));
            Ok(Box::new(Foo {
                name: node.name().to_string(),
                ports,
            }))
        }
    }

    fn foo_registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register_component(Box::new(FooFactory));
        registry.register_backend(Box::new(CharNullFactory));
        registry
    }

    fn parse(yaml: &str, registry: &ModuleRegistry) -> PlatformNode {
        let descr = loader::from_yaml_str(yaml, Origin::Unknown).unwrap();
        PlatformNode::parse("test", &descr, registry).unwrap()
    }

    fn build(yaml: &str, registry: &ModuleRegistry) -> Result<Platform, BuildError> {
        Orchestrator::new(registry).build(&parse(yaml, registry))
    }

    const BOARD: &str = r#"
description: board
components:
  cpu:
    type: cpu
    bindings:
      mem: bus.cpu
  bus:
    type: bus
  ram:
    type: memory
    size: 0x1000
    bindings:
      mem:
        peer: bus.mem
        address: { 0x8000: 0x1000 }
"#;

    #[test]
    fn test_first_port_resolution() {
        let registry = foo_registry();
        let platform = build(
            r#"
description: Foo
components:
  c0:
    type: foo
    bindings:
      port-a: c1
  c1:
    type: foo
"#,
            &registry,
        )
        .unwrap();

        let a0 = platform.port(Namespace::Component, "c0", "port-a").unwrap();
        let a1 = platform.port(Namespace::Component, "c1", "port-a").unwrap();
        assert!(a0.is_connected());
        assert!(a1.is_connected());
        assert!(!platform.port(Namespace::Component, "c1", "port-b").unwrap().is_connected());

        let record = &platform.bindings()[0];
        assert_eq!(record.local, "c0.port-a");
        assert_eq!(record.peer, "c1.port-a");
        assert_eq!(record.capability, crate::port::capability::SIGNAL);
        assert!(platform.unused_keys().is_empty());
    }

    #[test]
    fn test_binding_to_backend() {
        let registry = foo_registry();
        let platform = build(
            r#"
description: Foo
components:
  c0:
    type: foo
    bindings:
      port-b: backend:term
backends:
  term:
    type: char-null
"#,
            &registry,
        )
        .unwrap();

        assert!(platform.port(Namespace::Backend, "term", "io").unwrap().is_connected());
        assert!(platform.backend("term").is_some());
        assert_eq!(platform.bindings()[0].peer, "term.io");
    }

    #[test]
    fn test_bus_platform() {
        let registry = components::stock_registry();
        let platform = build(BOARD, &registry).unwrap();

        let bus = platform.component_as::<Bus>("bus").unwrap();
        assert_eq!(bus.expected_initiators(), ["cpu".to_string()]);
        assert_eq!(bus.map().initiators(), vec!["cpu".to_string()]);
        assert_eq!(bus.map().decode(0x8010), Some("ram".to_string()));
        assert_eq!(bus.map().decode(0x10), None);

        let mapped = platform
            .bindings()
            .iter()
            .find(|b| b.local == "ram.mem")
            .unwrap();
        assert_eq!(mapped.peer, "bus.mem");
        assert_eq!(mapped.info.get("address range"), Some("0x8000..=0x8fff"));
        assert!(platform.component_as::<Gpio>("bus").is_none());
        assert_eq!(platform.component_names().collect::<Vec<_>>(), ["bus", "cpu", "ram"]);
        assert!(platform.unused_keys().is_empty());
    }

    #[test]
    fn test_unused_keys_reported() {
        let registry = components::stock_registry();
        let platform = build(&format!("{}    colour: red\n", BOARD), &registry).unwrap();
        assert_eq!(platform.unused_keys(), ["components.ram.colour".to_string()]);
    }

    #[test]
    fn test_unknown_peer_port() {
        let registry = components::stock_registry();
        let result = build(
            r#"
description: board
components:
  cpu:
    type: cpu
    bindings:
      mem: bus.nope
  bus:
    type: bus
"#,
            &registry,
        );
        match result {
            Err(BuildError::Parse(ParseError::PortNotFound { module, port, .. })) => {
                assert_eq!(module, "bus");
                assert_eq!(port, "nope");
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_unknown_local_port() {
        let registry = components::stock_registry();
        let result = build(
            r#"
description: board
components:
  cpu:
    type: cpu
    bindings:
      data: bus.cpu
  bus:
    type: bus
"#,
            &registry,
        );
        assert!(matches!(
            result,
            Err(BuildError::Parse(ParseError::PortNotFound { ref port, .. })) if port == "data"
        ));
    }

    #[test]
    fn test_missing_address_fails_binding() {
        let registry = components::stock_registry();
        let result = build(
            r#"
description: board
components:
  bus:
    type: bus
  ram:
    type: memory
    bindings:
      mem: bus.mem
"#,
            &registry,
        );
        match result {
            Err(BuildError::BindingFailed { local, peer, .. }) => {
                assert_eq!(local, "ram.mem");
                assert_eq!(peer, "bus.mem");
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_port_bound_twice() {
        let registry = components::stock_registry();
        let result = build(
            r#"
description: board
components:
  gpio:
    type: gpio
    bindings:
      out: pic.in
  pic:
    type: irq-controller
    bindings:
      in: gpio.out
"#,
            &registry,
        );
        assert!(matches!(
            result,
            Err(BuildError::AlreadyConnected { ref port, .. }) if port == "pic.in"
        ));
    }

    #[test]
    fn test_peer_port_bound_twice() {
        let registry = foo_registry();
        let result = build(
            r#"
description: Foo
components:
  a:
    type: foo
    bindings:
      port-a: c.port-a
  b:
    type: foo
    bindings:
      port-a: c.port-a
  c:
    type: foo
"#,
            &registry,
        );
        assert!(matches!(
            result,
            Err(BuildError::AlreadyConnected { ref port, .. }) if port == "c.port-a"
        ));
    }

    fn assert_send_sync<T: Send + Sync + 'static>() {}

    #[test]
    fn test_errors_are_send_sync() {
        assert_send_sync::<Origin>();
        assert_send_sync::<crate::description::ConversionError>();
        assert_send_sync::<crate::description::LoadError>();
        assert_send_sync::<ParseError>();
        assert_send_sync::<crate::config::ConfigError>();
        assert_send_sync::<FactoryError>();
        assert_send_sync::<BuildError>();
    }

    #[test]
    fn test_factory_error() {
        let registry = components::stock_registry();
        let result = build(
            r#"
description: board
components:
  ram:
    type: memory
    size: 0
"#,
            &registry,
        );
        assert!(matches!(
            result,
            Err(BuildError::Factory { ref module, .. }) if module == "ram"
        ));
    }

    #[test]
    fn test_cluster_forwards_interrupts() {
        let registry = components::stock_registry();
        let platform = build(
            r#"
description: board
components:
  gpio:
    type: gpio
    pins: 2
  cl:
    type: cluster
    bindings:
      irq: gpio
"#,
            &registry,
        )
        .unwrap();

        let gpio = platform.component_as::<Gpio>("gpio").unwrap();
        let cluster = platform.component_as::<Cluster>("cl").unwrap();
        assert!(gpio.set(1, 1));
        assert_eq!(cluster.core_irq(1), Some(1));
        assert_eq!(platform.bindings()[0].info.get("elements"), Some("2"));
    }

    #[test]
    fn test_plugins_observe_every_stage() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut registry = foo_registry();
        registry.register_plugin(Box::new(TraceFactory::with_journal(Rc::clone(&journal))));

        let platform = build(
            r#"
description: Foo
components:
  c0:
    type: foo
plugins:
  log:
    type: trace
"#,
            &registry,
        )
        .unwrap();

        assert_eq!(platform.plugin_names().collect::<Vec<_>>(), ["log"]);
        assert_eq!(
            journal.borrow().as_slice(),
            [
                "before build of `test` (0 component(s))",
                "after discovery of `test` (0 component(s))",
                "after instantiation of `test` (1 component(s))",
                "after bindings of `test` (1 component(s))",
                "after build of `test` (1 component(s))",
            ]
        );
    }

    #[test]
    fn test_programmatic_binding() {
        let registry = foo_registry();
        let mut node = parse(
            r#"
description: Foo
components:
  c0:
    type: foo
  c1:
    type: foo
"#,
            &registry,
        );
        let peer = PeerRef::parse("c1.port-b", Namespace::Component, &Value::nil()).unwrap();
        node.add_binding(Namespace::Component, "c0", "port-a", peer, Value::nil())
            .unwrap();

        let platform = Orchestrator::new(&registry).build(&node).unwrap();
        assert_eq!(platform.bindings()[0].peer, "c1.port-b");
        assert!(platform.port(Namespace::Component, "c1", "port-b").unwrap().is_connected());
    }
}
