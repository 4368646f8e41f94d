//! Stock components, backends and plugins.
//!
//! A small library covering every capability kind, used by the binary and
//! by the tests:
//! - `bus`: memory-mapped interconnect
//! - `memory`: RAM target
//! - `cpu`: bus initiator with an interrupt input
//! - `gpio` / `irq-controller`: vectors of signal outputs and inputs
//! - `cluster`: a composite forwarding its cores' interrupt inputs
//! - `char-null` backend and `trace` plugin

/// Default bus width of the memory-mapped stock components.
pub const DEFAULT_BUS_WIDTH: u32 = 32;

/// Implement [`crate::module::Component`] for a struct with `name` and
/// `ports` fields.
macro_rules! impl_component {
    ($ty:ty) => {
        impl $crate::module::Component for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn ports(&self) -> &$crate::port::PortSet {
                &self.ports
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

pub(crate) use impl_component;

pub mod bus;
pub mod char_null;
pub mod cluster;
pub mod cpu;
pub mod gpio;
pub mod memory;
pub mod trace;

pub use bus::{Bus, BusFactory};
pub use char_null::{CharNull, CharNullFactory};
pub use cluster::{Cluster, ClusterFactory};
pub use cpu::{Cpu, CpuFactory};
pub use gpio::{Gpio, GpioFactory, IrqController, IrqControllerFactory};
pub use memory::{Memory, MemoryFactory};
pub use trace::TraceFactory;

use crate::module::ModuleRegistry;

/// A registry holding every stock module.
pub fn stock_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_component(Box::new(BusFactory));
    registry.register_component(Box::new(MemoryFactory));
    registry.register_component(Box::new(CpuFactory));
    registry.register_component(Box::new(GpioFactory));
    registry.register_component(Box::new(IrqControllerFactory));
    registry.register_component(Box::new(ClusterFactory));
    registry.register_backend(Box::new(CharNullFactory));
    registry.register_plugin(Box::new(TraceFactory::default()));
    registry
}
