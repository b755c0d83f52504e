//! # Sentinel Registry
//!
//! Component lifecycle and capability lookup. The registry exclusively
//! owns every component's lifetime; the rest of the system holds
//! [`ComponentId`] handles and goes through the registry for access.
//!
//! Lifecycle: `Offline → Initializing → Online` on successful
//! registration; `Online → Degraded` on a recoverable update fault;
//! `Degraded → Error` once the fault tolerance is exhausted (the entry
//! leaves the update rotation but stays registered for diagnostics);
//! any state `→ Offline` on shutdown.

mod component;
mod factory;
mod registry;

pub use component::{Component, ComponentDescriptor, ComponentId, LifecycleState};
pub use factory::ComponentFactory;
pub use registry::{ComponentInfo, ComponentRegistry, RegistryError};
