//! Character backend discarding everything written to it.

use std::rc::Rc;

use crate::module::{Component, ComponentFactory, DiscoveryContext, FactoryError};
use crate::parser::ModuleNode;
use crate::port::{Direction, Port, PortSet};

pub struct CharNull {
    name: String,
    ports: PortSet,
    io: Rc<Port>,
}

super::impl_component!(CharNull);

impl CharNull {
    pub fn new(name: &str) -> Self {
        let mut ports = PortSet::new();
        let io = ports.declare(Port::signal(name, "io", Direction::InOut));
        Self {
            name: name.to_string(),
            ports,
            io,
        }
    }

    /// Level last driven on the line by the frontend.
    pub fn last_level(&self) -> Option<u64> {
        self.io.signal_end().ok().and_then(|end| end.read())
    }
}

pub struct CharNullFactory;

impl ComponentFactory for CharNullFactory {
    fn type_name(&self) -> &str {
        "char-null"
    }

    fn description(&self) -> &str {
        "Character backend with no input and discarded output"
    }

    fn create(&self, node: &ModuleNode, _ctx: &DiscoveryContext) -> Result<Box<dyn Component>, FactoryError> {
        Ok(Box::new(CharNull::new(node.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::Value;

    #[test]
    fn test_inout_lines_share_a_wire() {
        let a = CharNull::new("a");
        let b = CharNull::new("b");
        let io_a = a.ports().get("io").unwrap();
        assert!(io_a.connect(b.ports().get("io").unwrap(), &Value::nil()));

        let wire = io_a.signal_end().unwrap().wire().unwrap();
        assert!(wire.many_writers());
        assert!(io_a.signal_end().unwrap().write(7));
        assert_eq!(b.last_level(), Some(7));
    }
}
