//! Memory-mapped transaction capabilities.
//!
//! Three capabilities cover the memory-mapped world:
//! - `tlm-initiator-target`: a direct initiator to target socket link
//! - `tlm-target-bus`: a target mapped into a bus at an address range
//! - `tlm-initiator-bus`: an initiator attached to a bus
//!
//! Every capability carries a bus width; ends of different widths never
//! bind.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, error};

use super::{BindResult, BindingInfo};
use crate::description::{AddressRange, Value};

/// Address decoding table of a bus.
#[derive(Debug)]
pub struct BusMap {
    name: String,
    targets: RefCell<Vec<(String, AddressRange)>>,
    initiators: RefCell<Vec<String>>,
}

impl BusMap {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            targets: RefCell::new(Vec::new()),
            initiators: RefCell::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map `target` at `range`. On overlap, returns the mapping that is in
    /// the way.
    pub fn map_target(&self, target: &str, range: AddressRange) -> Result<(), (String, AddressRange)> {
        let mut targets = self.targets.borrow_mut();
        if let Some((other, existing)) = targets.iter().find(|(_, r)| r.overlaps(&range)) {
            return Err((other.clone(), *existing));
        }
        targets.push((target.to_string(), range));
        Ok(())
    }

    pub fn attach_initiator(&self, initiator: &str) {
        self.initiators.borrow_mut().push(initiator.to_string());
    }

    pub fn targets(&self) -> Vec<(String, AddressRange)> {
        self.targets.borrow().clone()
    }

    pub fn initiators(&self) -> Vec<String> {
        self.initiators.borrow().clone()
    }

    /// Name of the target mapped at `addr`.
    pub fn decode(&self, addr: u64) -> Option<String> {
        self.targets
            .borrow()
            .iter()
            .find(|(_, range)| range.contains(addr))
            .map(|(name, _)| name.clone())
    }
}

/// Which side of a bus link an end sits on.
#[derive(Debug, Clone)]
pub enum BusSide {
    /// The bus itself.
    Bus(Rc<BusMap>),
    /// A component talking to a bus, named after its owner.
    Endpoint(String),
}

impl BusSide {
    fn is_bus(&self) -> bool {
        matches!(self, BusSide::Bus(_))
    }
}

/// Callback run when a target gets mapped on a bus.
pub trait MappedListener {
    fn target_mapped(&self, range: &AddressRange);
}

impl<F: Fn(&AddressRange)> MappedListener for F {
    fn target_mapped(&self, range: &AddressRange) {
        self(range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Initiator,
    Target,
}

impl fmt::Display for SocketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketRole::Initiator => f.write_str("initiator"),
            SocketRole::Target => f.write_str("target"),
        }
    }
}

/// `tlm-initiator-target` end.
#[derive(Debug)]
pub struct SocketEnd {
    width: u32,
    role: SocketRole,
    owner: String,
    peer: RefCell<Option<String>>,
    parent: RefCell<Option<Rc<SocketEnd>>>,
}

impl SocketEnd {
    pub fn new(width: u32, role: SocketRole, owner: &str) -> Rc<Self> {
        Rc::new(Self {
            width,
            role,
            owner: owner.to_string(),
            peer: RefCell::new(None),
            parent: RefCell::new(None),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }

    /// Owner of the socket at the other end, looking through parents.
    pub fn peer(&self) -> Option<String> {
        if let Some(peer) = self.peer.borrow().clone() {
            return Some(peer);
        }
        self.parent.borrow().as_ref().and_then(|parent| parent.peer())
    }

    pub(crate) fn bind_peer(&self, other: &SocketEnd, info: &mut BindingInfo) -> BindResult {
        if self.width != other.width {
            error!("Cannot bind sockets of widths {} and {}", self.width, other.width);
            return BindResult::Error;
        }
        if self.role == other.role {
            error!("Cannot bind a tlm {} to a tlm {}", self.role, other.role);
            return BindResult::Error;
        }

        *self.peer.borrow_mut() = Some(other.owner.clone());
        *other.peer.borrow_mut() = Some(self.owner.clone());
        info.add("bus width", self.width);
        BindResult::Ok
    }

    pub(crate) fn bind_hierarchical(&self, parent: &Rc<SocketEnd>) -> BindResult {
        if self.role != parent.role {
            return BindResult::HierarchicalTypeMismatch;
        }
        if self.width != parent.width {
            error!("Cannot forward a {} bit socket to a {} bit socket", self.width, parent.width);
            return BindResult::Error;
        }
        *self.parent.borrow_mut() = Some(Rc::clone(parent));
        BindResult::Ok
    }
}

/// `tlm-target-bus` end.
pub struct TargetBusEnd {
    width: u32,
    side: BusSide,
    mapped: RefCell<Vec<AddressRange>>,
    listeners: RefCell<Vec<Rc<dyn MappedListener>>>,
}

impl fmt::Debug for TargetBusEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetBusEnd")
            .field("width", &self.width)
            .field("side", &self.side)
            .field("mapped", &self.mapped)
            .finish_non_exhaustive()
    }
}

impl TargetBusEnd {
    pub fn new(width: u32, side: BusSide) -> Rc<Self> {
        Rc::new(Self {
            width,
            side,
            mapped: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn side(&self) -> &BusSide {
        &self.side
    }

    /// Ranges this target was mapped at.
    pub fn mapped(&self) -> Vec<AddressRange> {
        self.mapped.borrow().clone()
    }

    pub fn register_mapped_listener(&self, listener: Rc<dyn MappedListener>) {
        self.listeners.borrow_mut().push(listener);
    }

    fn dispatch_mapped(&self, range: AddressRange) {
        self.mapped.borrow_mut().push(range);
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener.target_mapped(&range);
        }
    }

    /// Map the target end into the bus end. `context` is the binding
    /// description and must hold an `address` range.
    pub(crate) fn bind_peer(&self, other: &TargetBusEnd, info: &mut BindingInfo, context: &Value) -> BindResult {
        if self.width != other.width {
            error!("Cannot bind bus ends of widths {} and {}", self.width, other.width);
            return BindResult::Error;
        }

        let (bus, target_name, target) = match (&self.side, &other.side) {
            (BusSide::Bus(bus), BusSide::Endpoint(name)) => (bus, name, other),
            (BusSide::Endpoint(name), BusSide::Bus(bus)) => (bus, name, self),
            (BusSide::Bus(_), BusSide::Bus(_)) => {
                error!("Cannot bind a bus to a bus (at {})", context.origin());
                return BindResult::Error;
            }
            (BusSide::Endpoint(_), BusSide::Endpoint(_)) => {
                error!("Cannot bind a tlm target to a tlm target (at {})", context.origin());
                return BindResult::Error;
            }
        };

        let address = context.get("address");
        if !address.is_map() {
            error!("Missing address for binding at {}", context.origin());
            return BindResult::Error;
        }
        let range = match address.parse::<AddressRange>() {
            Ok(range) => range,
            Err(e) => {
                error!("Invalid address for binding: {}", e);
                return BindResult::Error;
            }
        };

        if let Err((other_target, existing)) = bus.map_target(target_name, range) {
            error!(
                "Address range {} of `{}` overlaps `{}` at {} on bus `{}`",
                range,
                target_name,
                other_target,
                existing,
                bus.name()
            );
            return BindResult::Error;
        }

        debug!("Mapped `{}` at {} on bus `{}`", target_name, range, bus.name());
        target.dispatch_mapped(range);
        info.add("address range", range);
        BindResult::Ok
    }

    /// Bus ends are bound by the peer pass of the outer port; a matching
    /// side only lets the search go on.
    pub(crate) fn bind_hierarchical(&self, parent: &TargetBusEnd) -> BindResult {
        if self.side.is_bus() != parent.side.is_bus() {
            return BindResult::HierarchicalTypeMismatch;
        }
        BindResult::TryNext
    }
}

/// `tlm-initiator-bus` end.
#[derive(Debug)]
pub struct InitiatorBusEnd {
    width: u32,
    side: BusSide,
}

impl InitiatorBusEnd {
    pub fn new(width: u32, side: BusSide) -> Rc<Self> {
        Rc::new(Self { width, side })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn side(&self) -> &BusSide {
        &self.side
    }

    pub(crate) fn bind_peer(&self, other: &InitiatorBusEnd, info: &mut BindingInfo) -> BindResult {
        if self.width != other.width {
            error!("Cannot bind bus ends of widths {} and {}", self.width, other.width);
            return BindResult::Error;
        }

        match (&self.side, &other.side) {
            (BusSide::Bus(bus), BusSide::Endpoint(name)) | (BusSide::Endpoint(name), BusSide::Bus(bus)) => {
                bus.attach_initiator(name);
                info.add("bus", bus.name());
                BindResult::Ok
            }
            (BusSide::Bus(_), BusSide::Bus(_)) => {
                error!("Cannot bind a bus to a bus");
                BindResult::Error
            }
            (BusSide::Endpoint(_), BusSide::Endpoint(_)) => {
                error!("Cannot bind a tlm initiator to a tlm initiator");
                BindResult::Error
            }
        }
    }

    pub(crate) fn bind_hierarchical(&self, parent: &InitiatorBusEnd) -> BindResult {
        if self.side.is_bus() != parent.side.is_bus() {
            return BindResult::HierarchicalTypeMismatch;
        }
        BindResult::TryNext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{loader, Origin};

    fn address_context(yaml: &str) -> Value {
        loader::from_yaml_str(yaml, Origin::Unknown).unwrap()
    }

    #[test]
    fn test_target_mapped_on_bus() {
        let bus = BusMap::new("bus");
        let bus_end = TargetBusEnd::new(32, BusSide::Bus(Rc::clone(&bus)));
        let mem_end = TargetBusEnd::new(32, BusSide::Endpoint("mem".into()));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        mem_end.register_mapped_listener(Rc::new(move |r: &AddressRange| sink.borrow_mut().push(*r)));

        let mut info = BindingInfo::default();
        let ctx = address_context("address: { 0x1000: 0x100 }");
        assert_eq!(mem_end.bind_peer(&bus_end, &mut info, &ctx), BindResult::Ok);

        assert_eq!(bus.decode(0x1080), Some("mem".to_string()));
        assert_eq!(bus.decode(0x2000), None);
        assert_eq!(*seen.borrow(), vec![AddressRange::new(0x1000, 0x100)]);
        assert_eq!(info.get("address range"), Some("0x1000..=0x10ff"));
    }

    #[test]
    fn test_target_bus_requires_address() {
        let bus = BusMap::new("bus");
        let bus_end = TargetBusEnd::new(32, BusSide::Bus(bus));
        let mem_end = TargetBusEnd::new(32, BusSide::Endpoint("mem".into()));
        let mut info = BindingInfo::default();

        assert_eq!(
            bus_end.bind_peer(&mem_end, &mut info, &Value::nil()),
            BindResult::Error
        );
        let ctx = address_context("address: 0x1000");
        assert_eq!(bus_end.bind_peer(&mem_end, &mut info, &ctx), BindResult::Error);
        assert!(mem_end.mapped().is_empty());
    }

    #[test]
    fn test_target_bus_overlap_and_same_side() {
        let bus = BusMap::new("bus");
        let bus_end = TargetBusEnd::new(32, BusSide::Bus(Rc::clone(&bus)));
        let a = TargetBusEnd::new(32, BusSide::Endpoint("a".into()));
        let b = TargetBusEnd::new(32, BusSide::Endpoint("b".into()));
        let mut info = BindingInfo::default();

        let ctx = address_context("address: { 0: 4K }");
        assert_eq!(bus_end.bind_peer(&a, &mut info, &ctx), BindResult::Ok);
        let ctx = address_context("address: { 2K: 4K }");
        assert_eq!(bus_end.bind_peer(&b, &mut info, &ctx), BindResult::Error);
        assert_eq!(a.bind_peer(&b, &mut info, &ctx), BindResult::Error);
        assert_eq!(bus.targets().len(), 1);
    }

    #[test]
    fn test_width_mismatch() {
        let bus_end = TargetBusEnd::new(64, BusSide::Bus(BusMap::new("bus")));
        let mem_end = TargetBusEnd::new(32, BusSide::Endpoint("mem".into()));
        let ctx = address_context("address: { 0: 1 }");

        let mut info = BindingInfo::default();
        assert_eq!(bus_end.bind_peer(&mem_end, &mut info, &ctx), BindResult::Error);
    }

    #[test]
    fn test_initiator_bus() {
        let bus = BusMap::new("bus");
        let bus_end = InitiatorBusEnd::new(32, BusSide::Bus(Rc::clone(&bus)));
        let cpu_end = InitiatorBusEnd::new(32, BusSide::Endpoint("cpu".into()));
        let mut info = BindingInfo::default();

        assert_eq!(cpu_end.bind_peer(&bus_end, &mut info), BindResult::Ok);
        assert_eq!(bus.initiators(), vec!["cpu".to_string()]);
        assert_eq!(cpu_end.bind_peer(&cpu_end, &mut info), BindResult::Error);
    }

    #[test]
    fn test_socket_roles() {
        let cpu = SocketEnd::new(32, SocketRole::Initiator, "cpu");
        let mem = SocketEnd::new(32, SocketRole::Target, "mem");
        let other = SocketEnd::new(32, SocketRole::Initiator, "dma");
        let mut info = BindingInfo::default();

        assert_eq!(cpu.bind_peer(&other, &mut info), BindResult::Error);
        assert_eq!(cpu.bind_peer(&mem, &mut info), BindResult::Ok);
        assert_eq!(cpu.peer(), Some("mem".to_string()));
        assert_eq!(mem.peer(), Some("cpu".to_string()));
    }

    #[test]
    fn test_hierarchical_bus_sides() {
        let bus_end = TargetBusEnd::new(32, BusSide::Bus(BusMap::new("bus")));
        let a = TargetBusEnd::new(32, BusSide::Endpoint("a".into()));
        let b = TargetBusEnd::new(32, BusSide::Endpoint("b".into()));

        assert_eq!(a.bind_hierarchical(&bus_end), BindResult::HierarchicalTypeMismatch);
        assert_eq!(a.bind_hierarchical(&b), BindResult::TryNext);
    }

    #[test]
    fn test_socket_hierarchical_forwarding() {
        let inner = SocketEnd::new(32, SocketRole::Target, "cluster.mem");
        let outer = SocketEnd::new(32, SocketRole::Target, "cluster");
        let cpu = SocketEnd::new(32, SocketRole::Initiator, "cpu");
        let mut info = BindingInfo::default();

        assert_eq!(inner.bind_hierarchical(&outer), BindResult::Ok);
        assert_eq!(cpu.bind_peer(&outer, &mut info), BindResult::Ok);
        assert_eq!(inner.peer(), Some("cpu".to_string()));
        assert_eq!(inner.bind_hierarchical(&cpu), BindResult::HierarchicalTypeMismatch);
    }
}
