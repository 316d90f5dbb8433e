use ferrous_services::{
    global, AsyncOperationService, BuiltinServices, Capabilities, Component, DiError, Lifetime,
    Resolver,
};
use serial_test::serial;
use std::sync::Arc;

trait Settings: Send + Sync {
    fn name(&self) -> &str;
}

struct StaticSettings;
impl Settings for StaticSettings {
    fn name(&self) -> &str {
        "production"
    }
}
impl Component for StaticSettings {
    fn construct() -> Self {
        StaticSettings
    }
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn Settings>(|this| this);
    }
}

#[test]
#[serial]
fn test_configure_then_resolve() {
    global::reset();
    global::configure(|c| c.register::<dyn Settings, StaticSettings>(Lifetime::Singleton)).unwrap();

    let first = global::container().resolve::<dyn Settings>().unwrap();
    let second = global::container().resolve::<dyn Settings>().unwrap();
    assert_eq!(first.name(), "production");
    assert!(Arc::ptr_eq(&first, &second));

    global::reset();
}

#[test]
#[serial]
fn test_reset_drops_registrations() {
    global::reset();
    global::configure(|c| c.discover(&BuiltinServices).map(|_| ())).unwrap();
    assert!(global::container().has_registration::<dyn AsyncOperationService>());

    global::reset();
    assert!(!global::container().has_registration::<dyn AsyncOperationService>());
    assert!(matches!(
        global::container().resolve::<dyn AsyncOperationService>().map(|_| ()),
        Err(DiError::NotFound(_))
    ));
}

#[test]
#[serial]
fn test_configure_propagates_errors() {
    global::reset();
    global::configure(|c| c.register::<dyn Settings, StaticSettings>(Lifetime::Transient)).unwrap();

    let duplicate =
        global::configure(|c| c.register::<dyn Settings, StaticSettings>(Lifetime::Singleton));
    assert!(matches!(duplicate, Err(DiError::DuplicateIdentity(_))));

    global::container_mut().clear();
    assert!(global::container().registry().is_empty());
}
