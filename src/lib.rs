//! # vplatform - Virtual platform description and assembly
//!
//! This library turns a layered, hierarchical description of a virtual
//! platform (components, backends, plugins and the bindings between their
//! ports) into a wired set of component instances.
//!
//! ## Overview
//!
//! A platform is described in YAML or JSON files, optionally overridden on
//! the command line. The description is parsed into a tree of typed
//! nodes, checked against the registered module factories, and then built
//! in two phases (discovery, then creation) before every declared binding
//! is resolved through the ports' capabilities.
//!
//! ## Key Features
//!
//! - **Layered descriptions**: command line over files over platform defaults
//! - **Origins**: every configuration error points at its file, line and column
//! - **Capability binding**: signals, memory-mapped sockets, buses and vectors
//! - **Hierarchical ports**: composites forward inner ports to their own ports
//! - **Unused key detection**: keys no module consumed are reported
//!
//! ## Architecture
//!
//! - `description`: The description tree, its input adapters and converters
//! - `port`: Ports, capabilities and the binding search
//! - `module`: Namespaces, factories, parameters and the module registry
//! - `parser`: Platform description parser
//! - `orchestrator`: Two-phase build and binding pass
//! - `config`: Configuration layering and platform selection
//! - `components`: Stock components, backends and plugins
//!
//! ## Example Usage
//!
//! ```rust
//! use vplatform::components::stock_registry;
//! use vplatform::config::ConfigManager;
//! use vplatform::orchestrator::Orchestrator;
//! use vplatform::parser::PlatformNode;
//!
//! let mut config = ConfigManager::new();
//! config.add_yaml(r#"
//! platforms:
//!   board:
//!     description: "Minimal board"
//!     components:
//!       cpu:
//!         type: cpu
//!         bindings:
//!           mem: ram
//!       ram:
//!         type: memory
//!         size: 64K
//! "#)?;
//!
//! let registry = stock_registry();
//! let descr = config.apply_platform("board")?;
//! let node = PlatformNode::parse("board", &descr, &registry)?;
//! let platform = Orchestrator::new(&registry).build(&node)?;
//! assert_eq!(platform.bindings().len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Each failure domain has its own `thiserror` enum. Configuration errors
//! carry the origin of the offending node; expected outcomes of the
//! binding search are plain values. The binary reports errors through
//! `color_eyre`.

pub mod components;
pub mod config;
pub mod description;
pub mod module;
pub mod orchestrator;
pub mod parser;
pub mod port;
