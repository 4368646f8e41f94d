//! RAM target.

use std::rc::Rc;

use log::{info, warn};

use super::DEFAULT_BUS_WIDTH;
use crate::description::AddressRange;
use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError, Parameters};
use crate::parser::ModuleNode;
use crate::port::{BusSide, Capability, Port, PortSet, SocketEnd, SocketRole, TargetBusEnd};

pub struct Memory {
    name: String,
    ports: PortSet,
    size: u64,
    target: Rc<TargetBusEnd>,
}

super::impl_component!(Memory);

impl Memory {
    pub fn new(name: &str, size: u64, width: u32) -> Self {
        let target = TargetBusEnd::new(width, BusSide::Endpoint(name.to_string()));
        let owner = name.to_string();
        target.register_mapped_listener(Rc::new(move |range: &AddressRange| {
            if range.size() > size {
                warn!(
                    "Memory `{}` of {} bytes mapped on a larger range {}",
                    owner, size, range
                );
            }
            info!("Memory `{}` mapped at {}", owner, range);
        }));

        let mut ports = PortSet::new();
        ports.declare(
            Port::new(name, "mem")
                .with_capability(Capability::InitiatorTarget(SocketEnd::new(
                    width,
                    SocketRole::Target,
                    name,
                )))
                .with_capability(Capability::TargetBus(Rc::clone(&target))),
        );

        Self {
            name: name.to_string(),
            ports,
            size,
            target,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Ranges this memory was mapped at.
    pub fn mapped(&self) -> Vec<AddressRange> {
        self.target.mapped()
    }
}

pub struct MemoryFactory;

impl ComponentFactory for MemoryFactory {
    fn type_name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Random access memory"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .declare::<u64>("size", "Memory size in bytes", 4096)
            .declare::<u32>("bus-width", "Data bus width in bits", DEFAULT_BUS_WIDTH)
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let size = node.params().get::<u64>("size")?;
        if size == 0 {
            return Err(FactoryError::InvalidParameter {
                module: node.name().to_string(),
                name: "size".to_string(),
                reason: "memory size must not be zero".to_string(),
            });
        }
        let width = node.params().get::<u32>("bus-width")?;
        Ok(Box::new(Memory::new(node.name(), size, width)))
    }
}
