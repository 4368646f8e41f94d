//! Memory-mapped bus.
//!
//! Targets are mapped through the `mem` port (one address range per
//! binding), initiators attach through the `cpu` port. Both ports accept
//! any number of peers.

use std::rc::Rc;

use log::debug;

use super::DEFAULT_BUS_WIDTH;
use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError, Parameters};
use crate::parser::ModuleNode;
use crate::port::{BusMap, BusSide, Capability, InitiatorBusEnd, Port, PortSet, TargetBusEnd};

pub struct Bus {
    name: String,
    ports: PortSet,
    map: Rc<BusMap>,
    expected_initiators: Vec<String>,
}

super::impl_component!(Bus);

impl Bus {
    pub fn new(name: &str, width: u32, expected_initiators: Vec<String>) -> Self {
        let map = BusMap::new(name);
        let mut ports = PortSet::new();
        ports.declare(
            Port::new(name, "mem")
                .with_capability(Capability::TargetBus(TargetBusEnd::new(
                    width,
                    BusSide::Bus(Rc::clone(&map)),
                )))
                .multi_bind(),
        );
        ports.declare(
            Port::new(name, "cpu")
                .with_capability(Capability::InitiatorBus(InitiatorBusEnd::new(
                    width,
                    BusSide::Bus(Rc::clone(&map)),
                )))
                .multi_bind(),
        );

        Self {
            name: name.to_string(),
            ports,
            map,
            expected_initiators,
        }
    }

    pub fn map(&self) -> &Rc<BusMap> {
        &self.map
    }

    /// Initiators that announced themselves during discovery.
    pub fn expected_initiators(&self) -> &[String] {
        &self.expected_initiators
    }
}

pub struct BusFactory;

impl ComponentFactory for BusFactory {
    fn type_name(&self) -> &str {
        "bus"
    }

    fn description(&self) -> &str {
        "Memory-mapped interconnect"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<u32>("bus-width", "Data bus width in bits", DEFAULT_BUS_WIDTH)
    }

    fn create(&self, node: &ModuleNode, ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let width = node.params().get::<u32>("bus-width")?;
        let initiators = ctx.reservations(node.name(), "initiators").to_vec();
        debug!(
            "Bus `{}` expects {} initiator(s): {:?}",
            node.name(),
            initiators.len(),
            initiators
        );
        Ok(Box::new(Bus::new(node.name(), width, initiators)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Cpu, Memory};
    use crate::description::{loader, AddressRange, Origin, Value};

    fn at(address: &str) -> Value {
        loader::from_yaml_str(&format!("address: {{ {} }}", address), Origin::Unknown).unwrap()
    }

    #[test]
    fn test_targets_are_decoded() {
        let bus = Bus::new("bus", 32, Vec::new());
        let ram = Memory::new("ram", 0x1000, 32);
        let rom = Memory::new("rom", 0x100, 32);

        let bus_mem = bus.ports().get("mem").unwrap();
        assert!(ram.ports().get("mem").unwrap().connect(bus_mem, &at("0x0: 0x1000")));
        assert!(rom.ports().get("mem").unwrap().connect(bus_mem, &at("0x8000: 0x100")));

        assert_eq!(bus.map().decode(0x10), Some("ram".to_string()));
        assert_eq!(bus.map().decode(0x80ff), Some("rom".to_string()));
        assert_eq!(bus.map().decode(0x4000), None);
        assert_eq!(ram.mapped(), vec![AddressRange::new(0, 0x1000)]);
    }

    #[test]
    fn test_overlapping_target_rejected() {
        let bus = Bus::new("bus", 32, Vec::new());
        let ram = Memory::new("ram", 0x1000, 32);
        let rom = Memory::new("rom", 0x1000, 32);

        let bus_mem = bus.ports().get("mem").unwrap();
        assert!(ram.ports().get("mem").unwrap().connect(bus_mem, &at("0x0: 0x1000")));
        assert!(!rom.ports().get("mem").unwrap().connect(bus_mem, &at("0x800: 0x1000")));
        assert!(!rom.ports().get("mem").unwrap().is_connected());
        assert_eq!(bus.map().targets().len(), 1);
    }

    #[test]
    fn test_target_without_address_rejected() {
        let bus = Bus::new("bus", 32, Vec::new());
        let ram = Memory::new("ram", 0x1000, 32);
        assert!(!ram
            .ports()
            .get("mem")
            .unwrap()
            .connect(bus.ports().get("mem").unwrap(), &Value::nil()));
    }

    #[test]
    fn test_initiators_attach() {
        let bus = Bus::new("bus", 32, vec!["cpu0".to_string()]);
        let cpu = Cpu::new("cpu0", 32);

        let outcome = cpu
            .ports()
            .get("mem")
            .unwrap()
            .try_connect(bus.ports().get("cpu").unwrap(), &Value::nil())
            .unwrap();
        assert_eq!(outcome.capability, crate::port::capability::TLM_INITIATOR_BUS);
        assert_eq!(bus.map().initiators(), vec!["cpu0".to_string()]);
        assert_eq!(bus.expected_initiators(), ["cpu0".to_string()]);
    }

    #[test]
    fn test_width_mismatch_finds_no_candidate() {
        let bus = Bus::new("bus", 64, Vec::new());
        let ram = Memory::new("ram", 0x1000, 32);
        assert!(!ram
            .ports()
            .get("mem")
            .unwrap()
            .connect(bus.ports().get("mem").unwrap(), &at("0x0: 0x1000")));
    }
}
