//! Registry and reference behaviour as seen by plugins.

use std::sync::Arc;

use modhost_core::{ServiceKind, ServiceProvider, ServiceRegistry};

#[test]
fn short_name_ties_go_to_the_latest_provider() {
    let mut registry = ServiceRegistry::new();
    let by_short = registry.dynamic_reference("mysql");
    let by_prefix = registry.dynamic_reference("sql");

    let primary = ServiceProvider::data("m_mysql", "sql/mysql", "primary");
    registry.add_service(Arc::clone(&primary)).unwrap();
    assert!(Arc::ptr_eq(&by_short.get().unwrap(), &primary));
    assert!(Arc::ptr_eq(&by_prefix.get().unwrap(), &primary));

    let shadow = ServiceProvider::data("m_shadow", "mysql", "shadow");
    registry.add_service(Arc::clone(&shadow)).unwrap();

    let exact = registry
        .find_service(ServiceKind::Data, "sql/mysql")
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&exact, &primary));
    assert!(Arc::ptr_eq(&by_short.get().unwrap(), &shadow));
    assert!(Arc::ptr_eq(&by_prefix.get().unwrap(), &primary));

    registry.del_service(&shadow).unwrap();
    assert!(Arc::ptr_eq(&by_short.get().unwrap(), &primary));

    registry.del_service(&primary).unwrap();
    assert!(by_short.get().is_none());
    assert!(by_prefix.get().is_none());
    assert!(registry.is_empty());
}

#[test]
fn references_can_target_modes() {
    use modhost_core::{ModeAction, ModeHandler, ModeType, SessionObject};

    struct Secret;

    impl ModeHandler for Secret {
        fn on_change(
            &self,
            _source: &dyn SessionObject,
            _target: &dyn SessionObject,
            _adding: bool,
            _parameter: Option<&str>,
        ) -> ModeAction {
            ModeAction::Deny
        }
    }

    let mut registry = ServiceRegistry::new();
    let mode = ServiceProvider::mode("m_secret", "secret", 's', ModeType::Channel, Arc::new(Secret));
    registry.add_service(Arc::clone(&mode)).unwrap();

    let reference = registry.dynamic_reference("mode/secret");
    let found = reference.get().unwrap();
    assert_eq!(found.as_mode().map(|m| m.letter), Some('s'));

    let counts = registry.count_by_kind();
    assert_eq!(counts.get(&ServiceKind::Mode), Some(&1));
    assert_eq!(registry.len(), 1);
}
