//! Component factory
//!
//! Maps type tags to constructors so the runtime can instantiate
//! components from configuration. Plugin discovery fills this table at
//! startup; everything after that is an ordinary typed lookup.

use std::collections::BTreeMap;

use crate::component::Component;

type Constructor = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;

#[derive(Default)]
pub struct ComponentFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a type tag, replacing any previous
    /// one.
    pub fn register_type(
        &mut self,
        type_tag: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Component> + Send + Sync + 'static,
    ) {
        self.constructors
            .insert(type_tag.into(), Box::new(constructor));
    }

    /// Instantiate one component of the given type.
    pub fn create(&self, type_tag: &str) -> Option<Box<dyn Component>> {
        self.constructors.get(type_tag).map(|ctor| ctor())
    }

    /// Registered type tags, sorted.
    pub fn known_types(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDescriptor;
    use async_trait::async_trait;
    use sentinel_core::SentinelError;
    use std::time::Duration;

    struct Dummy(&'static str);

    #[async_trait]
    impl Component for Dummy {
        fn descriptor(&self) -> ComponentDescriptor {
            ComponentDescriptor::new(self.0, "dummy")
        }
        async fn initialize(&mut self) -> Result<(), SentinelError> {
            Ok(())
        }
        async fn update(&mut self, _dt: Duration) -> Result<(), SentinelError> {
            Ok(())
        }
        async fn shutdown(&mut self) -> Result<(), SentinelError> {
            Ok(())
        }
    }

    #[test]
    fn test_create_by_tag() {
        let mut factory = ComponentFactory::new();
        factory.register_type("imu", || Box::new(Dummy("imu-0")));
        factory.register_type("beacon", || Box::new(Dummy("beacon-0")));

        let component = factory.create("imu").expect("registered tag");
        assert_eq!(component.descriptor().name, "imu-0");
        assert!(factory.create("radar").is_none());
        assert_eq!(factory.known_types(), vec!["beacon", "imu"]);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut factory = ComponentFactory::new();
        factory.register_type("imu", || Box::new(Dummy("old")));
        factory.register_type("imu", || Box::new(Dummy("new")));
        assert_eq!(factory.len(), 1);
        assert_eq!(factory.create("imu").unwrap().descriptor().name, "new");
    }
}
