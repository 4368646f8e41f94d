//! Vectors of ports bound element-wise.

use std::rc::Rc;

use log::{error, warn};

use super::{BindResult, BindingInfo, Port};
use crate::description::Value;

/// `vector` capability: the element ports of a vector port.
#[derive(Debug)]
pub struct VectorCapability {
    ports: Vec<Rc<Port>>,
}

impl VectorCapability {
    pub fn new(ports: Vec<Rc<Port>>) -> Rc<Self> {
        Rc::new(Self { ports })
    }

    pub fn ports(&self) -> &[Rc<Port>] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Connect elements pairwise. A failing element is reported and the
    /// remaining elements are still connected.
    pub(crate) fn bind_peer(&self, other: &VectorCapability, info: &mut BindingInfo, context: &Value) -> BindResult {
        if self.len() != other.len() {
            error!(
                "Cannot bind vectors of different sizes ({} and {})",
                self.len(),
                other.len()
            );
            return BindResult::Error;
        }

        for (mine, theirs) in self.ports.iter().zip(&other.ports) {
            if !mine.connect(theirs, context) {
                warn!(
                    "Vector element {} is not connectable to {}",
                    mine.full_name(),
                    theirs.full_name()
                );
            }
        }
        info.add("elements", self.len());
        BindResult::Ok
    }

    pub(crate) fn bind_hierarchical(&self, parent: &VectorCapability, info: &mut BindingInfo) -> BindResult {
        if self.len() != parent.len() {
            error!(
                "Cannot forward a vector of {} elements to a vector of {} elements",
                self.len(),
                parent.len()
            );
            return BindResult::Error;
        }

        for (child, up) in self.ports.iter().zip(&parent.ports) {
            if child.bind(up) != BindResult::Ok {
                warn!(
                    "Vector element {} is not forwardable to {}",
                    child.full_name(),
                    up.full_name()
                );
            }
        }
        info.add("elements", self.len());
        BindResult::Ok
    }
}
