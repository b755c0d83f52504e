//! Component registry
//!
//! Registration order is preserved so shutdown can walk it in reverse.
//! The registry map is mutated only by register/unregister, which are
//! synchronous relative to the update loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use sentinel_core::{Clock, Event, EventPayload, EventSink, Priority, SentinelError};

use crate::component::{Component, ComponentDescriptor, ComponentId, LifecycleState};

/// Consecutive update faults tolerated before `Degraded` becomes
/// `Error`. The hardware recovery policy may raise this per component.
const DEFAULT_FAULT_TOLERANCE: u32 = 2;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),
    #[error("component {name} failed to initialize: {source}")]
    InitializeFailed {
        name: String,
        #[source]
        source: SentinelError,
    },
}

/// Diagnostic snapshot of one entry.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub descriptor: ComponentDescriptor,
    pub state: LifecycleState,
    pub consecutive_faults: u32,
}

struct Entry {
    id: ComponentId,
    descriptor: ComponentDescriptor,
    state: LifecycleState,
    consecutive_faults: u32,
    fault_tolerance: u32,
    component: Box<dyn Component>,
}

pub struct ComponentRegistry {
    entries: Vec<Entry>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl ComponentRegistry {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            entries: Vec::new(),
            clock,
            sink,
        }
    }

    /// Register and initialize a component. On success the component is
    /// Online and in the update rotation.
    pub async fn register(
        &mut self,
        mut component: Box<dyn Component>,
    ) -> Result<ComponentId, RegistryError> {
        let descriptor = component.descriptor();
        let id = ComponentId::fresh();

        if let Err(source) = component.initialize().await {
            warn!(name = %descriptor.name, "component failed to initialize");
            return Err(RegistryError::InitializeFailed {
                name: descriptor.name,
                source,
            });
        }

        info!(name = %descriptor.name, %id, "component online");
        self.emit(
            Priority::Normal,
            EventPayload::ComponentRegistered {
                component_id: id.to_string(),
                component_type: descriptor.type_tag.clone(),
            },
        );
        self.emit(
            Priority::Normal,
            EventPayload::ComponentInitialized {
                component_id: id.to_string(),
            },
        );

        self.entries.push(Entry {
            id,
            descriptor,
            state: LifecycleState::Online,
            consecutive_faults: 0,
            fault_tolerance: DEFAULT_FAULT_TOLERANCE,
            component,
        });
        Ok(id)
    }

    /// Shut a component down and drop it.
    pub async fn unregister(&mut self, id: ComponentId) -> Result<(), RegistryError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(RegistryError::UnknownComponent(id))?;
        let mut entry = self.entries.remove(idx);
        entry.state = LifecycleState::Offline;
        if let Err(err) = entry.component.shutdown().await {
            warn!(name = %entry.descriptor.name, %err, "shutdown fault during unregister");
        }
        self.emit(
            Priority::Normal,
            EventPayload::ComponentUnregistered {
                component_id: id.to_string(),
            },
        );
        Ok(())
    }

    /// Diagnostic view of one component.
    pub fn get(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.entries.iter().find(|e| e.id == id).map(Entry::info)
    }

    /// All components whose type tag or capability set matches `tag`.
    pub fn by_type(&self, tag: &str) -> Vec<ComponentInfo> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.has_tag(tag))
            .map(Entry::info)
            .collect()
    }

    pub fn iter_info(&self) -> impl Iterator<Item = ComponentInfo> + '_ {
        self.entries.iter().map(Entry::info)
    }

    /// Park or unpark a component for maintenance.
    pub fn set_maintenance(&mut self, id: ComponentId, parked: bool) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RegistryError::UnknownComponent(id))?;
        entry.state = if parked {
            LifecycleState::Maintenance
        } else {
            LifecycleState::Online
        };
        Ok(())
    }

    /// Raise the consecutive-fault tolerance for a component (hardware
    /// recovery policy).
    pub fn set_fault_tolerance(
        &mut self,
        id: ComponentId,
        tolerance: u32,
    ) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RegistryError::UnknownComponent(id))?;
        entry.fault_tolerance = tolerance.max(1);
        Ok(())
    }

    /// Tick every component in the rotation. Faults degrade and
    /// eventually park the offender; they never abort the loop.
    pub async fn update_all(&mut self, dt: Duration) -> Vec<SentinelError> {
        let mut faults = Vec::new();
        for entry in &mut self.entries {
            if !entry.state.in_rotation() {
                continue;
            }
            match entry.component.update(dt).await {
                Ok(()) => {
                    if entry.state == LifecycleState::Degraded {
                        info!(name = %entry.descriptor.name, "component recovered");
                        entry.state = LifecycleState::Online;
                    }
                    entry.consecutive_faults = 0;
                }
                Err(err) => {
                    entry.consecutive_faults += 1;
                    if entry.consecutive_faults >= entry.fault_tolerance {
                        warn!(
                            name = %entry.descriptor.name,
                            faults = entry.consecutive_faults,
                            "component out of rotation"
                        );
                        entry.state = LifecycleState::Error;
                        self.sink.emit(Event::new(
                            entry.descriptor.name.clone(),
                            self.clock.now_ns(),
                            Priority::High,
                            EventPayload::MaintenanceAlert {
                                component_id: entry.id.to_string(),
                                message: format!(
                                    "update failed {} consecutive times",
                                    entry.consecutive_faults
                                ),
                            },
                        ));
                    } else {
                        entry.state = LifecycleState::Degraded;
                    }
                    faults.push(
                        err.with_origin(entry.descriptor.name.clone())
                            .with_frame("registry.update_all"),
                    );
                }
            }
        }
        faults
    }

    /// Shut down every component in reverse registration order.
    pub async fn shutdown_all(&mut self) {
        while let Some(mut entry) = self.entries.pop() {
            entry.state = LifecycleState::Offline;
            if let Err(err) = entry.component.shutdown().await {
                warn!(name = %entry.descriptor.name, %err, "shutdown fault");
            }
            self.emit(
                Priority::Normal,
                EventPayload::ComponentUnregistered {
                    component_id: entry.id.to_string(),
                },
            );
        }
    }

    fn emit(&self, priority: Priority, payload: EventPayload) {
        self.sink.emit(Event::new(
            "component-registry",
            self.clock.now_ns(),
            priority,
            payload,
        ));
    }
}

impl Entry {
    fn info(&self) -> ComponentInfo {
        ComponentInfo {
            id: self.id,
            descriptor: self.descriptor.clone(),
            state: self.state,
            consecutive_faults: self.consecutive_faults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::event::NullSink;
    use sentinel_core::{ErrorCategory, ErrorSeverity, ManualClock};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Probe {
        name: String,
        fail_updates: u32,
        updates: Arc<AtomicU32>,
        shutdown_log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn new(name: &str, fail_updates: u32, log: Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                fail_updates,
                updates: Arc::new(AtomicU32::new(0)),
                shutdown_log: log,
            })
        }
    }

    #[async_trait]
    impl Component for Probe {
        fn descriptor(&self) -> ComponentDescriptor {
            ComponentDescriptor::new(&self.name, "probe").with_capability("diagnostics")
        }

        async fn initialize(&mut self) -> Result<(), SentinelError> {
            Ok(())
        }

        async fn update(&mut self, _dt: Duration) -> Result<(), SentinelError> {
            let n = self.updates.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_updates {
                return Err(SentinelError::new(
                    "probe fault",
                    ErrorCategory::Hardware,
                    ErrorSeverity::Error,
                ));
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), SentinelError> {
            self.shutdown_log.lock().unwrap().push(self.name.clone());
            Ok(())
        }
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(ManualClock::new(0), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = reg.register(Probe::new("imu", 0, log)).await.unwrap();

        let info = reg.get(id).unwrap();
        assert_eq!(info.state, LifecycleState::Online);
        assert_eq!(reg.by_type("probe").len(), 1);
        assert_eq!(reg.by_type("diagnostics").len(), 1);
        assert!(reg.by_type("navigation").is_empty());
    }

    #[tokio::test]
    async fn test_degrade_then_error_leaves_handle() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = reg.register(Probe::new("flaky", 5, log)).await.unwrap();

        reg.update_all(Duration::from_millis(40)).await;
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Degraded);

        reg.update_all(Duration::from_millis(40)).await;
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Error);

        // Out of rotation but still visible for diagnostics.
        let before = reg.get(id).unwrap().consecutive_faults;
        reg.update_all(Duration::from_millis(40)).await;
        assert_eq!(reg.get(id).unwrap().consecutive_faults, before);
    }

    #[tokio::test]
    async fn test_recovery_resets_fault_count() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = reg.register(Probe::new("wobbly", 1, log)).await.unwrap();

        reg.update_all(Duration::from_millis(40)).await;
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Degraded);

        reg.update_all(Duration::from_millis(40)).await;
        let info = reg.get(id).unwrap();
        assert_eq!(info.state, LifecycleState::Online);
        assert_eq!(info.consecutive_faults, 0);
    }

    #[tokio::test]
    async fn test_fault_tolerance_override() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = reg.register(Probe::new("hardy", 4, log)).await.unwrap();
        reg.set_fault_tolerance(id, 5).unwrap();

        for _ in 0..4 {
            reg.update_all(Duration::from_millis(40)).await;
        }
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Degraded);

        reg.update_all(Duration::from_millis(40)).await;
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Online);
    }

    #[tokio::test]
    async fn test_maintenance_leaves_rotation() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = reg.register(Probe::new("parked", 9, log)).await.unwrap();
        reg.set_maintenance(id, true).unwrap();

        let faults = reg.update_all(Duration::from_millis(40)).await;
        assert!(faults.is_empty());
        assert_eq!(reg.get(id).unwrap().state, LifecycleState::Maintenance);
    }

    #[tokio::test]
    async fn test_shutdown_reverse_order() {
        let mut reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        reg.register(Probe::new("first", 0, log.clone())).await.unwrap();
        reg.register(Probe::new("second", 0, log.clone())).await.unwrap();
        reg.register(Probe::new("third", 0, log.clone())).await.unwrap();

        reg.shutdown_all().await;
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(reg.iter_info().count(), 0);
    }
}
