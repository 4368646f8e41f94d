//! Processor model: a bus initiator with an interrupt input.

use std::rc::Rc;

use super::DEFAULT_BUS_WIDTH;
use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError, Namespace, Parameters};
use crate::parser::ModuleNode;
use crate::port::{BusSide, Capability, Direction, InitiatorBusEnd, Port, PortSet, SocketEnd, SocketRole};

pub struct Cpu {
    name: String,
    ports: PortSet,
    mem: Rc<Port>,
    irq: Rc<Port>,
    width: u32,
}

super::impl_component!(Cpu);

impl Cpu {
    pub fn new(name: &str, width: u32) -> Self {
        let mut ports = PortSet::new();
        let mem = ports.declare(
            Port::new(name, "mem")
                .with_capability(Capability::InitiatorTarget(SocketEnd::new(
                    width,
                    SocketRole::Initiator,
                    name,
                )))
                .with_capability(Capability::InitiatorBus(InitiatorBusEnd::new(
                    width,
                    BusSide::Endpoint(name.to_string()),
                ))),
        );
        let irq = ports.declare(Port::signal(name, "irq", Direction::In));

        Self {
            name: name.to_string(),
            ports,
            mem,
            irq,
            width,
        }
    }

    /// Target reached through a direct socket link, if any.
    pub fn socket_peer(&self) -> Option<String> {
        self.mem.socket(self.width).ok().and_then(|socket| socket.peer())
    }

    /// Current level of the interrupt line.
    pub fn irq_level(&self) -> Option<u64> {
        self.irq.signal_end().ok().and_then(|end| end.read())
    }
}

pub struct CpuFactory;

impl ComponentFactory for CpuFactory {
    fn type_name(&self) -> &str {
        "cpu"
    }

    fn description(&self) -> &str {
        "Processor with a memory port and an interrupt input"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<u32>("bus-width", "Data bus width in bits", DEFAULT_BUS_WIDTH)
    }

    /// Announce this initiator to the components its memory port binds to.
    fn discover(&self, node: &ModuleNode, ctx: &mut DiscoveryContext) -> Result<(), FactoryError> {
        for binding in node.bindings() {
            let peer = binding.peer();
            if binding.local_port() == "mem" && peer.namespace == Namespace::Component {
                ctx.reserve(&peer.module, "initiators", node.name());
            }
        }
        Ok(())
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let width = node.params().get::<u32>("bus-width")?;
        Ok(Box::new(Cpu::new(node.name(), width)))
    }
}
