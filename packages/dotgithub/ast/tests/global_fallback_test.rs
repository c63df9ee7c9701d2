use dotgithub_ast::{ONLY_DOCS, PathFilterError, PathFilterRegistry, WITHOUT_DOCS, global};
use pretty_assertions::assert_eq;

#[test_log::test]
fn test_reading_global_first_freezes_the_builtins() {
    let builtins = global();
    assert_eq!(builtins.len(), 2);
    assert!(builtins.get(ONLY_DOCS).is_some());
    assert!(builtins.get(WITHOUT_DOCS).is_some());

    let mut registry = PathFilterRegistry::with_builtins();
    registry
        .define("api", vec!["api/**".to_string()], vec![])
        .unwrap();

    assert!(matches!(
        registry.install_global(),
        Err(PathFilterError::AlreadyInstalled)
    ));
    assert!(global().get("api").is_none());
}
