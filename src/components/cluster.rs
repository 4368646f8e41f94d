//! Composite component grouping processor cores.
//!
//! The cores' interrupt inputs are forwarded to the cluster's own `irq`
//! vector port through a hierarchical binding made at creation.

use std::rc::Rc;

use log::debug;

use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError, Parameters};
use crate::parser::ModuleNode;
use crate::port::{BindResult, Direction, Port, PortSet};

pub struct Cluster {
    name: String,
    ports: PortSet,
    cores: Rc<Port>,
}

super::impl_component!(Cluster);

impl Cluster {
    pub fn new(name: &str, cores: usize) -> Result<Self, FactoryError> {
        let inner_owner = format!("{}.cores", name);
        let inner = Port::vector(&inner_owner, "irq", cores, |owner, line| {
            Port::signal(owner, line, Direction::In)
        });

        let mut ports = PortSet::new();
        let outer = ports.declare(Port::vector(name, "irq", cores, |owner, line| {
            Port::signal(owner, line, Direction::In)
        }));

        match inner.bind(&outer) {
            BindResult::Ok => debug!("Forwarded {} core interrupt(s) to {}", cores, outer.full_name()),
            _ => {
                return Err(FactoryError::Hierarchy {
                    module: name.to_string(),
                    child: inner.full_name(),
                    parent: outer.full_name(),
                })
            }
        }

        Ok(Self {
            name: name.to_string(),
            ports,
            cores: Rc::new(inner),
        })
    }

    pub fn core_count(&self) -> usize {
        self.cores.elements().len()
    }

    /// Level seen by core `index` on its interrupt input.
    pub fn core_irq(&self, index: usize) -> Option<u64> {
        self.cores
            .elements()
            .get(index)
            .and_then(|port| port.signal_end().ok())
            .and_then(|end| end.read())
    }
}

pub struct ClusterFactory;

impl ComponentFactory for ClusterFactory {
    fn type_name(&self) -> &str {
        "cluster"
    }

    fn description(&self) -> &str {
        "Group of cores sharing an interrupt vector"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<usize>("cores", "Number of cores", 2)
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let cores = node.params().get::<usize>("cores")?;
        if cores == 0 {
            return Err(FactoryError::InvalidParameter {
                module: node.name().to_string(),
                name: "cores".to_string(),
                reason: "a cluster needs at least one core".to_string(),
            });
        }
        Ok(Box::new(Cluster::new(node.name(), cores)?))
    }
}
