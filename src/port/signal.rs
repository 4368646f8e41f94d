//! Signal capability: a single wire between an output and an input.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::error;

use super::BindResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::InOut => "inout",
        };
        f.write_str(name)
    }
}

/// The wire shared by two peer-bound signal ends.
#[derive(Debug)]
pub struct Wire {
    many_writers: bool,
    level: Cell<u64>,
}

impl Wire {
    fn new(many_writers: bool) -> Self {
        Self {
            many_writers,
            level: Cell::new(0),
        }
    }

    pub fn many_writers(&self) -> bool {
        self.many_writers
    }

    pub fn read(&self) -> u64 {
        self.level.get()
    }

    pub fn write(&self, level: u64) {
        self.level.set(level);
    }
}

#[derive(Debug)]
enum Route {
    Unbound,
    Wire(Rc<Wire>),
    Parent(Rc<SignalEnd>),
}

/// One end of a signal.
///
/// A child end that was hierarchically bound reaches its wire through the
/// parent end.
#[derive(Debug)]
pub struct SignalEnd {
    direction: Direction,
    route: RefCell<Route>,
}

impl SignalEnd {
    pub fn new(direction: Direction) -> Rc<Self> {
        Rc::new(Self {
            direction,
            route: RefCell::new(Route::Unbound),
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn wire(&self) -> Option<Rc<Wire>> {
        match &*self.route.borrow() {
            Route::Unbound => None,
            Route::Wire(wire) => Some(Rc::clone(wire)),
            Route::Parent(parent) => parent.wire(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(&*self.route.borrow(), Route::Unbound)
    }

    /// Current level of the wire, `None` while unbound.
    pub fn read(&self) -> Option<u64> {
        self.wire().map(|wire| wire.read())
    }

    /// Drive the wire. Returns `false` for input ends and unbound ends.
    pub fn write(&self, level: u64) -> bool {
        if self.direction == Direction::In {
            return false;
        }
        match self.wire() {
            Some(wire) => {
                wire.write(level);
                true
            }
            None => false,
        }
    }

    pub(crate) fn bind_peer(&self, other: &SignalEnd) -> BindResult {
        if self.direction == Direction::Out && other.direction == Direction::Out {
            error!("Cannot bind two signal outputs together");
            return BindResult::Error;
        }

        let many_writers = self.direction == Direction::InOut && other.direction == Direction::InOut;
        let wire = Rc::new(Wire::new(many_writers));
        *self.route.borrow_mut() = Route::Wire(Rc::clone(&wire));
        *other.route.borrow_mut() = Route::Wire(wire);
        BindResult::Ok
    }

    pub(crate) fn bind_hierarchical(&self, parent: &Rc<SignalEnd>) -> BindResult {
        if self.direction != parent.direction {
            error!(
                "Cannot forward a signal {} to a signal {}",
                self.direction, parent.direction
            );
            return BindResult::HierarchicalTypeMismatch;
        }
        *self.route.borrow_mut() = Route::Parent(Rc::clone(parent));
        BindResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_binding_shares_a_wire() {
        let out = SignalEnd::new(Direction::Out);
        let input = SignalEnd::new(Direction::In);

        assert_eq!(out.bind_peer(&input), BindResult::Ok);
        assert!(out.write(1));
        assert_eq!(input.read(), Some(1));
        assert!(!input.write(0));
        assert!(!input.wire().unwrap().many_writers());
    }

    #[test]
    fn test_inout_pair_has_many_writers() {
        let a = SignalEnd::new(Direction::InOut);
        let b = SignalEnd::new(Direction::InOut);

        assert_eq!(a.bind_peer(&b), BindResult::Ok);
        assert!(a.wire().unwrap().many_writers());
    }

    #[test]
    fn test_two_outputs_rejected() {
        let a = SignalEnd::new(Direction::Out);
        let b = SignalEnd::new(Direction::Out);

        assert_eq!(a.bind_peer(&b), BindResult::Error);
        assert!(!a.is_bound());
    }

    #[test]
    fn test_hierarchical_follows_parent() {
        let parent = SignalEnd::new(Direction::In);
        let child = SignalEnd::new(Direction::In);
        let driver = SignalEnd::new(Direction::Out);

        assert_eq!(child.bind_hierarchical(&parent), BindResult::Ok);
        assert_eq!(child.read(), None);

        driver.bind_peer(&parent);
        driver.write(7);
        assert_eq!(child.read(), Some(7));
    }

    #[test]
    fn test_hierarchical_direction_mismatch() {
        let parent = SignalEnd::new(Direction::Out);
        let child = SignalEnd::new(Direction::In);

        assert_eq!(
            child.bind_hierarchical(&parent),
            BindResult::HierarchicalTypeMismatch
        );
        assert!(!child.is_bound());
    }
}
