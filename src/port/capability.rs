//! The closed set of connection capabilities a port can expose.

use std::rc::Rc;

use log::error;

use super::signal::SignalEnd;
use super::tlm::{InitiatorBusEnd, SocketEnd, TargetBusEnd};
use super::vector::VectorCapability;
use super::{BindResult, BindingInfo};
use crate::description::Value;

pub const SIGNAL: &str = "signal";
pub const TLM_INITIATOR_TARGET: &str = "tlm-initiator-target";
pub const TLM_TARGET_BUS: &str = "tlm-target-bus";
pub const TLM_INITIATOR_BUS: &str = "tlm-initiator-bus";
pub const VECTOR: &str = "vector";

/// A typed connection endpoint.
///
/// Two capabilities are compatible when they are of the same kind and,
/// for memory-mapped kinds, of the same bus width.
#[derive(Debug, Clone)]
pub enum Capability {
    Signal(Rc<SignalEnd>),
    InitiatorTarget(Rc<SocketEnd>),
    TargetBus(Rc<TargetBusEnd>),
    InitiatorBus(Rc<InitiatorBusEnd>),
    Vector(Rc<VectorCapability>),
}

impl Capability {
    pub fn kind_id(&self) -> &'static str {
        match self {
            Capability::Signal(_) => SIGNAL,
            Capability::InitiatorTarget(_) => TLM_INITIATOR_TARGET,
            Capability::TargetBus(_) => TLM_TARGET_BUS,
            Capability::InitiatorBus(_) => TLM_INITIATOR_BUS,
            Capability::Vector(_) => VECTOR,
        }
    }

    /// Bus width of memory-mapped capabilities.
    pub fn bus_width(&self) -> Option<u32> {
        match self {
            Capability::InitiatorTarget(end) => Some(end.width()),
            Capability::TargetBus(end) => Some(end.width()),
            Capability::InitiatorBus(end) => Some(end.width()),
            Capability::Signal(_) | Capability::Vector(_) => None,
        }
    }

    pub fn is_compatible_with(&self, other: &Capability) -> bool {
        self.kind_id() == other.kind_id() && self.bus_width() == other.bus_width()
    }

    /// Bind to a capability of a sibling port.
    ///
    /// `context` is the description of the binding (e.g. its `address`).
    pub fn bind_peer(&self, other: &Capability, info: &mut BindingInfo, context: &Value) -> BindResult {
        match (self, other) {
            (Capability::Signal(a), Capability::Signal(b)) => a.bind_peer(b),
            (Capability::InitiatorTarget(a), Capability::InitiatorTarget(b)) => a.bind_peer(b, info),
            (Capability::TargetBus(a), Capability::TargetBus(b)) => a.bind_peer(b, info, context),
            (Capability::InitiatorBus(a), Capability::InitiatorBus(b)) => a.bind_peer(b, info),
            (Capability::Vector(a), Capability::Vector(b)) => a.bind_peer(b, info, context),
            _ => {
                error!(
                    "Cannot peer bind a `{}` capability to a `{}` capability",
                    self.kind_id(),
                    other.kind_id()
                );
                BindResult::Error
            }
        }
    }

    /// Forward this capability into the same capability of a parent port.
    pub fn bind_hierarchical(&self, parent: &Capability, info: &mut BindingInfo) -> BindResult {
        match (self, parent) {
            (Capability::Signal(a), Capability::Signal(b)) => a.bind_hierarchical(b),
            (Capability::InitiatorTarget(a), Capability::InitiatorTarget(b)) => a.bind_hierarchical(b),
            (Capability::TargetBus(a), Capability::TargetBus(b)) => a.bind_hierarchical(b),
            (Capability::InitiatorBus(a), Capability::InitiatorBus(b)) => a.bind_hierarchical(b),
            (Capability::Vector(a), Capability::Vector(b)) => a.bind_hierarchical(b, info),
            _ => BindResult::HierarchicalTypeMismatch,
        }
    }
}
