//! Ports and the capability based binding resolver.
//!
//! A [`Port`] owns an ordered list of [`Capability`] values. Binding two
//! ports searches the compatible capability pairs in declaration order
//! (the first port's capabilities form the outer loop) and stops at the
//! first pair that binds.
//!
//! Failures of a single pair are normal outcomes of that search and are
//! reported as [`BindResult`] values, never as errors.

pub mod capability;
pub mod signal;
pub mod tlm;
pub mod vector;

pub use capability::Capability;
pub use signal::{Direction, SignalEnd};
pub use tlm::{BusMap, BusSide, InitiatorBusEnd, SocketEnd, SocketRole, TargetBusEnd};
pub use vector::VectorCapability;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use crate::description::Value;

/// Outcome of one capability pair binding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindResult {
    Ok,
    /// This pair does not handle the binding, try the next one.
    TryNext,
    Error,
    /// Hierarchical binding between ends that cannot be unified.
    HierarchicalTypeMismatch,
}

/// Key/value facts collected while binding, e.g. the mapped address range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingInfo {
    entries: Vec<(String, String)>,
}

impl BindingInfo {
    pub fn add(&mut self, key: &str, value: impl fmt::Display) {
        self.entries.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Peer,
    Hierarchical,
}

/// Emitted on both ports of a successful peer binding, and on the child
/// port of a successful hierarchical binding.
#[derive(Debug)]
pub struct BindingEvent<'a> {
    pub port: &'a Port,
    pub other: &'a Port,
    pub relation: Relation,
    pub capability: &'static str,
    pub info: &'a BindingInfo,
}

pub trait BindingObserver {
    fn binding_observed(&self, event: &BindingEvent<'_>);
}

impl<F: Fn(&BindingEvent<'_>)> BindingObserver for F {
    fn binding_observed(&self, event: &BindingEvent<'_>) {
        self(event)
    }
}

/// Errors of typed capability lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("Port {port} exposes `{kind}` with bus width {actual}, requested {expected}")]
    WidthMismatch {
        port: String,
        kind: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Port {port} exposes no `{kind}` capability")]
    NotFound { port: String, kind: &'static str },
}

/// A successful peer binding.
#[derive(Debug, Clone)]
pub struct BindingOutcome {
    pub capability: &'static str,
    pub info: BindingInfo,
}

/// A named connection point of a component.
pub struct Port {
    owner: String,
    name: String,
    capabilities: Vec<Capability>,
    multi: bool,
    connected: Cell<bool>,
    bound_kind: Cell<Option<&'static str>>,
    observers: RefCell<Vec<Rc<dyn BindingObserver>>>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.full_name())
            .field("capabilities", &self.capabilities)
            .field("connected", &self.connected.get())
            .finish_non_exhaustive()
    }
}

impl Port {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            capabilities: Vec::new(),
            multi: false,
            connected: Cell::new(false),
            bound_kind: Cell::new(None),
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Append a capability. Declaration order is the search order.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Let the port accept several peers, as bus ports do.
    pub fn multi_bind(mut self) -> Self {
        self.multi = true;
        self
    }

    /// A port with a single signal capability.
    pub fn signal(owner: &str, name: &str, direction: Direction) -> Self {
        Self::new(owner, name).with_capability(Capability::Signal(SignalEnd::new(direction)))
    }

    /// A vector port of `count` elements named `<name>0`, `<name>1`, ...
    pub fn vector<F>(owner: &str, name: &str, count: usize, element: F) -> Self
    where
        F: Fn(&str, &str) -> Port,
    {
        let ports = (0..count)
            .map(|i| Rc::new(element(owner, &format!("{}{}", name, i))))
            .collect();
        Self::new(owner, name).with_capability(Capability::Vector(VectorCapability::new(ports)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn full_name(&self) -> String {
        if self.owner.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.owner, self.name)
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Kind of the capability that completed the first binding.
    pub fn bound_capability(&self) -> Option<&'static str> {
        self.bound_kind.get()
    }

    pub fn register_observer(&self, observer: Rc<dyn BindingObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Element ports of a vector port.
    pub fn elements(&self) -> &[Rc<Port>] {
        self.capabilities
            .iter()
            .find_map(|cap| match cap {
                Capability::Vector(vector) => Some(vector.ports()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn signal_end(&self) -> Result<&Rc<SignalEnd>, CapabilityError> {
        self.capabilities
            .iter()
            .find_map(|cap| match cap {
                Capability::Signal(end) => Some(end),
                _ => None,
            })
            .ok_or_else(|| CapabilityError::NotFound {
                port: self.full_name(),
                kind: capability::SIGNAL,
            })
    }

    pub fn socket(&self, width: u32) -> Result<&Rc<SocketEnd>, CapabilityError> {
        self.typed(capability::TLM_INITIATOR_TARGET, width, |cap| match cap {
            Capability::InitiatorTarget(end) => Some((end, end.width())),
            _ => None,
        })
    }

    pub fn target_bus(&self, width: u32) -> Result<&Rc<TargetBusEnd>, CapabilityError> {
        self.typed(capability::TLM_TARGET_BUS, width, |cap| match cap {
            Capability::TargetBus(end) => Some((end, end.width())),
            _ => None,
        })
    }

    pub fn initiator_bus(&self, width: u32) -> Result<&Rc<InitiatorBusEnd>, CapabilityError> {
        self.typed(capability::TLM_INITIATOR_BUS, width, |cap| match cap {
            Capability::InitiatorBus(end) => Some((end, end.width())),
            _ => None,
        })
    }

    /// First capability picked by `pick` with the requested bus width.
    fn typed<'a, T, F>(&'a self, kind: &'static str, width: u32, pick: F) -> Result<&'a T, CapabilityError>
    where
        F: Fn(&'a Capability) -> Option<(&'a T, u32)>,
    {
        let mut other_width = None;
        for cap in &self.capabilities {
            if let Some((end, actual)) = pick(cap) {
                if actual == width {
                    return Ok(end);
                }
                other_width.get_or_insert(actual);
            }
        }
        match other_width {
            Some(actual) => Err(CapabilityError::WidthMismatch {
                port: self.full_name(),
                kind,
                expected: width,
                actual,
            }),
            None => Err(CapabilityError::NotFound {
                port: self.full_name(),
                kind,
            }),
        }
    }

    /// Compatible capability pairs, `self` as the outer loop.
    fn kinds(&self) -> String {
        self.capabilities
            .iter()
            .map(|c| c.kind_id())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn candidates<'a>(&'a self, other: &'a Port) -> Vec<(&'a Capability, &'a Capability)> {
        let mut candidates = Vec::new();
        for mine in &self.capabilities {
            for theirs in &other.capabilities {
                if mine.is_compatible_with(theirs) {
                    candidates.push((mine, theirs));
                }
            }
        }
        candidates
    }

    /// Connected, and not accepting further peers.
    pub fn is_busy(&self) -> bool {
        self.connected.get() && !self.multi
    }

    fn mark_connected(&self, kind: &'static str) {
        self.connected.set(true);
        if self.bound_kind.get().is_none() {
            self.bound_kind.set(Some(kind));
        }
    }

    fn notify(&self, other: &Port, relation: Relation, capability: &'static str, info: &BindingInfo) {
        let event = BindingEvent {
            port: self,
            other,
            relation,
            capability,
            info,
        };
        let observers = self.observers.borrow().clone();
        for observer in observers {
            observer.binding_observed(&event);
        }
    }

    /// Peer bind `self` and `peer`.
    ///
    /// Returns `false` when no compatible capability pair binds.
    pub fn connect(&self, peer: &Port, context: &Value) -> bool {
        self.try_connect(peer, context).is_some()
    }

    /// Like [`Port::connect`], returning the capability that bound and the
    /// facts it collected.
    pub fn try_connect(&self, peer: &Port, context: &Value) -> Option<BindingOutcome> {
        for port in [self, peer] {
            if port.is_busy() {
                warn!("Port {} is already connected", port.full_name());
                return None;
            }
        }

        let candidates = self.candidates(peer);
        if candidates.is_empty() {
            debug!(
                "{} has no capability compatible with {}",
                self.full_name(),
                peer.full_name()
            );
            return None;
        }

        for (mine, theirs) in candidates {
            let mut info = BindingInfo::default();
            match mine.bind_peer(theirs, &mut info, context) {
                BindResult::Ok => {
                    let kind = mine.kind_id();
                    self.mark_connected(kind);
                    peer.mark_connected(kind);
                    self.notify(peer, Relation::Peer, kind, &info);
                    peer.notify(self, Relation::Peer, kind, &info);
                    return Some(BindingOutcome { capability: kind, info });
                }
                BindResult::TryNext => debug!(
                    "`{}` binding of {} to {} deferred to the next capability",
                    mine.kind_id(),
                    self.full_name(),
                    peer.full_name()
                ),
                BindResult::Error | BindResult::HierarchicalTypeMismatch => warn!(
                    "Failed to bind {} to {} through `{}`",
                    self.full_name(),
                    peer.full_name(),
                    mine.kind_id()
                ),
            }
        }
        None
    }

    /// Forward `self` into `parent`, a port of the enclosing component.
    pub fn bind(&self, parent: &Port) -> BindResult {
        if self.connected.get() {
            warn!("Port {} is already bound", self.full_name());
            return BindResult::Error;
        }

        let candidates = self.candidates(parent);
        if candidates.is_empty() {
            if parent.capabilities.is_empty() || self.capabilities.is_empty() {
                warn!(
                    "{} is not hierarchically connectable to {}",
                    self.full_name(),
                    parent.full_name()
                );
                return BindResult::Error;
            }
            warn!(
                "Cannot forward {} ({}) to {} ({}): capability kinds differ",
                self.full_name(),
                self.kinds(),
                parent.full_name(),
                parent.kinds()
            );
            return BindResult::HierarchicalTypeMismatch;
        }

        for (mine, theirs) in candidates {
            let mut info = BindingInfo::default();
            match mine.bind_hierarchical(theirs, &mut info) {
                BindResult::Ok => {
                    let kind = mine.kind_id();
                    self.mark_connected(kind);
                    self.notify(parent, Relation::Hierarchical, kind, &info);
                    return BindResult::Ok;
                }
                BindResult::HierarchicalTypeMismatch => {
                    warn!(
                        "`{}` of {} cannot be forwarded to {}",
                        mine.kind_id(),
                        self.full_name(),
                        parent.full_name()
                    );
                    return BindResult::HierarchicalTypeMismatch;
                }
                BindResult::TryNext => debug!(
                    "`{}` forwarding of {} deferred to the next capability",
                    mine.kind_id(),
                    self.full_name()
                ),
                BindResult::Error => warn!(
                    "Failed to forward {} to {} through `{}`",
                    self.full_name(),
                    parent.full_name(),
                    mine.kind_id()
                ),
            }
        }
        BindResult::Error
    }
}

/// The ports of a component, in declaration order.
#[derive(Debug, Default)]
pub struct PortSet {
    ports: Vec<Rc<Port>>,
}

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a port and return a handle to it.
    pub fn declare(&mut self, port: Port) -> Rc<Port> {
        let port = Rc::new(port);
        self.ports.push(Rc::clone(&port));
        port
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Port>> {
        self.ports.iter().find(|port| port.name() == name)
    }

    pub fn first(&self) -> Option<&Rc<Port>> {
        self.ports.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Port>> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
