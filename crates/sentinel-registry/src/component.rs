//! Component trait and lifecycle states

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use sentinel_core::SentinelError;

/// Stable handle to a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Offline,
    Initializing,
    Online,
    /// Recoverable fault observed; still in the update rotation.
    Degraded,
    /// Unrecoverable; out of rotation, handle retained for diagnostics.
    Error,
    /// Manually parked; out of rotation.
    Maintenance,
}

impl LifecycleState {
    /// States that receive `update(dt)` ticks.
    pub fn in_rotation(self) -> bool {
        matches!(self, LifecycleState::Online | LifecycleState::Degraded)
    }
}

/// Identity and capability set a component announces at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub name: String,
    /// Primary type tag used for `by_type` lookup.
    pub type_tag: String,
    /// Additional capability tags.
    pub capabilities: BTreeSet<String>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    /// True when the descriptor's type tag or any capability matches.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.type_tag == tag || self.capabilities.contains(tag)
    }
}

/// A named, stateful participant driven by the registry.
#[async_trait]
pub trait Component: Send + Sync {
    fn descriptor(&self) -> ComponentDescriptor;

    async fn initialize(&mut self) -> Result<(), SentinelError>;

    /// One cooperative tick. `dt` is the elapsed time since the previous
    /// tick of the update loop.
    async fn update(&mut self, dt: Duration) -> Result<(), SentinelError>;

    async fn shutdown(&mut self) -> Result<(), SentinelError>;
}
