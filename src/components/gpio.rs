//! GPIO bank and interrupt controller, both exposing vector ports.

use std::rc::Rc;

use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError, Parameters};
use crate::parser::ModuleNode;
use crate::port::{Direction, Port, PortSet};

fn positive_count(node: &ModuleNode, param: &str) -> Result<usize, FactoryError> {
    let count = node.params().get::<usize>(param)?;
    if count == 0 {
        return Err(FactoryError::InvalidParameter {
            module: node.name().to_string(),
            name: param.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(count)
}

/// Bank of output pins, exposed as the `out` vector port.
pub struct Gpio {
    name: String,
    ports: PortSet,
    out: Rc<Port>,
}

super::impl_component!(Gpio);

impl Gpio {
    pub fn new(name: &str, pins: usize) -> Self {
        let mut ports = PortSet::new();
        let out = ports.declare(Port::vector(name, "out", pins, |owner, pin| {
            Port::signal(owner, pin, Direction::Out)
        }));
        Self {
            name: name.to_string(),
            ports,
            out,
        }
    }

    /// Drive pin `pin`. Returns `false` when the pin does not exist or is
    /// not connected.
    pub fn set(&self, pin: usize, level: u64) -> bool {
        self.out
            .elements()
            .get(pin)
            .and_then(|port| port.signal_end().ok())
            .map(|end| end.write(level))
            .unwrap_or(false)
    }
}

pub struct GpioFactory;

impl ComponentFactory for GpioFactory {
    fn type_name(&self) -> &str {
        "gpio"
    }

    fn description(&self) -> &str {
        "Bank of general purpose outputs"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<usize>("pins", "Number of output pins", 8)
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let pins = positive_count(node, "pins")?;
        Ok(Box::new(Gpio::new(node.name(), pins)))
    }
}

/// Interrupt controller: `in` vector of interrupt sources and an `irq`
/// output raised while any source is high.
pub struct IrqController {
    name: String,
    ports: PortSet,
    inputs: Rc<Port>,
    irq: Rc<Port>,
}

super::impl_component!(IrqController);

impl IrqController {
    pub fn new(name: &str, inputs: usize) -> Self {
        let mut ports = PortSet::new();
        let input_port = ports.declare(Port::vector(name, "in", inputs, |owner, line| {
            Port::signal(owner, line, Direction::In)
        }));
        let irq = ports.declare(Port::signal(name, "irq", Direction::Out));
        Self {
            name: name.to_string(),
            ports,
            inputs: input_port,
            irq,
        }
    }

    /// Indices of the input lines currently high.
    pub fn pending(&self) -> Vec<usize> {
        self.inputs
            .elements()
            .iter()
            .enumerate()
            .filter(|(_, port)| {
                port.signal_end()
                    .ok()
                    .and_then(|end| end.read())
                    .is_some_and(|level| level != 0)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Propagate the input lines to the `irq` output.
    pub fn update(&self) -> bool {
        let level = u64::from(!self.pending().is_empty());
        self.irq
            .signal_end()
            .map(|end| end.write(level))
            .unwrap_or(false)
    }
}

pub struct IrqControllerFactory;

impl ComponentFactory for IrqControllerFactory {
    fn type_name(&self) -> &str {
        "irq-controller"
    }

    fn description(&self) -> &str {
        "Interrupt controller multiplexing interrupt sources"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<usize>("inputs", "Number of interrupt inputs", 8)
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        let inputs = positive_count(node, "inputs")?;
        Ok(Box::new(IrqController::new(node.name(), inputs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::Value;

    #[test]
    fn test_gpio_drives_controller() {
        let gpio = Gpio::new("gpio", 4);
        let pic = IrqController::new("pic", 4);
        let cpu = crate::components::Cpu::new("cpu", 32);

        let out = gpio.ports().get("out").unwrap();
        assert_eq!(out.elements().len(), 4);
        assert_eq!(out.elements()[2].name(), "out2");
        assert!(out.connect(pic.ports().get("in").unwrap(), &Value::nil()));
        assert!(pic
            .ports()
            .get("irq")
            .unwrap()
            .connect(cpu.ports().get("irq").unwrap(), &Value::nil()));

        assert!(pic.pending().is_empty());
        assert!(gpio.set(2, 1));
        assert_eq!(pic.pending(), vec![2]);
        assert!(pic.update());
        assert_eq!(cpu.irq_level(), Some(1));

        assert!(gpio.set(2, 0));
        assert!(pic.update());
        assert_eq!(cpu.irq_level(), Some(0));
    }

    #[test]
    fn test_gpio_set_out_of_range() {
        let gpio = Gpio::new("gpio", 2);
        assert!(!gpio.set(0, 1));
        assert!(!gpio.set(5, 1));
    }

    #[test]
    fn test_size_mismatch() {
        let gpio = Gpio::new("gpio", 2);
        let pic = IrqController::new("pic", 3);
        assert!(!gpio
            .ports()
            .get("out")
            .unwrap()
            .connect(pic.ports().get("in").unwrap(), &Value::nil()));
    }
}
