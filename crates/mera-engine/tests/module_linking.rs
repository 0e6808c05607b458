//! Integration tests for linking: import resolution, star-export closures,
//! ambiguity, indirect chains, and namespace construction.

use mera_engine::{
    Declarations, EvalError, Expr, Identity, LinkError, LoaderOptions, MemoryHost, ModuleId,
    ModuleLoader, ModuleState, Value,
};

fn loader_with(modules: Vec<(&str, Declarations)>) -> ModuleLoader<MemoryHost> {
    let mut host = MemoryHost::new();
    for (identity, declarations) in modules {
        host.insert(identity, declarations);
    }
    ModuleLoader::new(host)
}

fn lookup(loader: &ModuleLoader<MemoryHost>, identity: &str) -> ModuleId {
    loader
        .graph()
        .lookup(&Identity::new(identity))
        .expect("module is loaded")
}

fn exporting_value(name: &str, value: i32) -> Declarations {
    Declarations::new()
        .with_let(name)
        .with_init(name, Expr::value(value))
        .with_export(name)
}

#[test]
fn test_link_simple_import() {
    let mut loader = loader_with(vec![
        ("lib", exporting_value("x", 1)),
        ("main", Declarations::new().with_import("lib", &[("x", "x")])),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();

    assert_eq!(loader.state(root), ModuleState::Linked);
    assert_eq!(loader.state(lookup(&loader, "lib")), ModuleState::Linked);

    // The alias is installed but its slot is still in the dead zone.
    assert!(matches!(
        loader.record(root).scope().read("x"),
        Err(EvalError::Uninitialized(_))
    ));
}

#[test]
fn test_link_is_idempotent() {
    let mut loader = loader_with(vec![
        ("lib", exporting_value("x", 1)),
        ("main", Declarations::new().with_import("lib", &[("x", "x")])),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();
    loader.link(root).unwrap();
    assert_eq!(loader.state(root), ModuleState::Linked);
}

#[test]
fn test_link_cycle() {
    let mut loader = loader_with(vec![
        (
            "a",
            exporting_value("x", 1).with_import("b", &[("y", "y")]),
        ),
        (
            "b",
            exporting_value("y", 2).with_import("a", &[("x", "x")]),
        ),
    ]);

    let root = loader.resolve_graph("a").unwrap();
    loader.link(root).unwrap();
    assert_eq!(loader.state(root), ModuleState::Linked);
    assert_eq!(loader.state(lookup(&loader, "b")), ModuleState::Linked);
}

#[test]
fn test_unresolved_export() {
    let mut loader = loader_with(vec![
        ("lib", exporting_value("x", 1)),
        (
            "main",
            Declarations::new().with_import("lib", &[("nope", "nope")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    match loader.link(root) {
        Err(LinkError::UnresolvedExport { name, module }) => {
            assert_eq!(name, "nope");
            assert_eq!(module.as_str(), "lib");
        }
        other => panic!("expected unresolved export, got {other:?}"),
    }

    // The offender is poisoned; the dependency it pointed at stays linked.
    assert_eq!(loader.state(root), ModuleState::Errored);
    assert_eq!(loader.state(lookup(&loader, "lib")), ModuleState::Linked);
}

#[test]
fn test_aliased_import_and_export() {
    let mut loader = loader_with(vec![
        (
            "lib",
            Declarations::new()
                .with_let("internal")
                .with_init("internal", Expr::value(5))
                .with_export_as("internal", "external"),
        ),
        (
            "main",
            Declarations::new().with_import("lib", &[("external", "renamed")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();
    loader.evaluate(root).unwrap();
    assert_eq!(
        loader.record(root).scope().read("renamed").unwrap(),
        Value::from(5)
    );
}

#[test]
fn test_indirect_export_chain() {
    let mut loader = loader_with(vec![
        ("origin", exporting_value("x", 7)),
        (
            "relay",
            Declarations::new().with_export_from("x", "origin", "x"),
        ),
        (
            "main",
            Declarations::new().with_import("relay", &[("x", "x")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();
    loader.evaluate(root).unwrap();

    // The chain bottoms out in origin's slot.
    assert_eq!(
        loader.record(root).scope().read("x").unwrap(),
        Value::from(7)
    );
    let relay = lookup(&loader, "relay");
    let ns = loader.namespace(relay).unwrap();
    assert!(ns.has("x"));
}

#[test]
fn test_cyclic_indirect_export() {
    let mut loader = loader_with(vec![
        ("a", Declarations::new().with_export_from("x", "b", "x")),
        ("b", Declarations::new().with_export_from("x", "a", "x")),
        ("main", Declarations::new().with_import("a", &[("x", "x")])),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    assert!(matches!(
        loader.link(root),
        Err(LinkError::CyclicIndirectExport { .. })
    ));
    assert_eq!(loader.state(root), ModuleState::Errored);
}

#[test]
fn test_star_export_closure() {
    let mut loader = loader_with(vec![
        ("p", exporting_value("a", 1)),
        ("q", exporting_value("b", 2)),
        (
            "x",
            Declarations::new()
                .with_export_star("p")
                .with_export_star("q"),
        ),
    ]);

    let root = loader.resolve_graph("x").unwrap();
    loader.link(root).unwrap();

    let ns = loader.namespace(root).unwrap();
    let keys: Vec<_> = ns.keys().map(str::to_string).collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn test_star_export_cycle_terminates() {
    let mut loader = loader_with(vec![
        (
            "x",
            exporting_value("a", 1).with_export_star("y"),
        ),
        (
            "y",
            exporting_value("b", 2).with_export_star("x"),
        ),
    ]);

    let root = loader.resolve_graph("x").unwrap();
    loader.link(root).unwrap();

    let ns_x = loader.namespace(root).unwrap();
    assert_eq!(ns_x.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    let y = lookup(&loader, "y");
    let ns_y = loader.namespace(y).unwrap();
    assert_eq!(ns_y.keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn test_star_ambiguity_is_not_a_member() {
    let mut loader = loader_with(vec![
        ("p", exporting_value("shared", 1)),
        ("q", exporting_value("shared", 2)),
        (
            "x",
            Declarations::new()
                .with_export_star("p")
                .with_export_star("q"),
        ),
    ]);

    let root = loader.resolve_graph("x").unwrap();
    loader.link(root).unwrap();

    let ns = loader.namespace(root).unwrap();
    assert!(!ns.has("shared"));
    assert!(ns.keys().next().is_none());
    // Ambiguous names read as non-members.
    assert_eq!(ns.get("shared").unwrap(), Value::Undefined);
}

#[test]
fn test_star_ambiguity_fails_direct_import() {
    let mut loader = loader_with(vec![
        ("p", exporting_value("shared", 1)),
        ("q", exporting_value("shared", 2)),
        (
            "x",
            Declarations::new()
                .with_export_star("p")
                .with_export_star("q"),
        ),
        (
            "main",
            Declarations::new().with_import("x", &[("shared", "shared")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    match loader.link(root) {
        Err(LinkError::AmbiguousBinding { name, module }) => {
            assert_eq!(name, "shared");
            assert_eq!(module.as_str(), "x");
        }
        other => panic!("expected ambiguous binding, got {other:?}"),
    }
}

#[test]
fn test_local_export_overrides_star_ambiguity() {
    let mut loader = loader_with(vec![
        ("p", exporting_value("shared", 1)),
        ("q", exporting_value("shared", 2)),
        (
            "x",
            exporting_value("shared", 3)
                .with_export_star("p")
                .with_export_star("q"),
        ),
        (
            "main",
            Declarations::new().with_import("x", &[("shared", "shared")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();
    loader.evaluate(root).unwrap();
    assert_eq!(
        loader.record(root).scope().read("shared").unwrap(),
        Value::from(3)
    );
}

#[test]
fn test_same_slot_through_two_star_paths_is_unambiguous() {
    // Both stars reach the same origin slot; that is not an ambiguity.
    let mut loader = loader_with(vec![
        ("origin", exporting_value("x", 9)),
        (
            "relay",
            Declarations::new().with_export_from("x", "origin", "x"),
        ),
        (
            "hub",
            Declarations::new()
                .with_export_star("origin")
                .with_export_star("relay"),
        ),
    ]);

    let root = loader.resolve_graph("hub").unwrap();
    loader.link(root).unwrap();
    assert!(loader.namespace(root).unwrap().has("x"));
}

#[test]
fn test_default_export_is_not_a_namespace_member() {
    let mut loader = loader_with(vec![(
        "lib",
        Declarations::new()
            .with_let("default")
            .with_init("default", Expr::value(1))
            .with_export("default")
            .with_let("named")
            .with_init("named", Expr::value(2))
            .with_export("named"),
    )]);

    let root = loader.resolve_graph("lib").unwrap();
    loader.link(root).unwrap();

    let ns = loader.namespace(root).unwrap();
    assert!(!ns.has("default"));
    assert_eq!(ns.keys().collect::<Vec<_>>(), vec!["named"]);
}

#[test]
fn test_default_import_resolves_as_named_binding() {
    let mut loader = loader_with(vec![
        (
            "lib",
            Declarations::new()
                .with_let("default")
                .with_init("default", Expr::value(4))
                .with_export("default"),
        ),
        (
            "main",
            Declarations::new().with_import("lib", &[("default", "d")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();
    loader.evaluate(root).unwrap();
    assert_eq!(
        loader.record(root).scope().read("d").unwrap(),
        Value::from(4)
    );
}

#[test]
fn test_default_does_not_flow_through_star() {
    let mut loader = loader_with(vec![
        (
            "lib",
            Declarations::new()
                .with_let("default")
                .with_init("default", Expr::value(4))
                .with_export("default"),
        ),
        ("hub", Declarations::new().with_export_star("lib")),
        (
            "main",
            Declarations::new().with_import("hub", &[("default", "d")]),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    assert!(matches!(
        loader.link(root),
        Err(LinkError::UnresolvedExport { .. })
    ));
}

#[test]
fn test_namespace_import_is_initialized_at_link() {
    let mut loader = loader_with(vec![
        ("lib", exporting_value("x", 1)),
        (
            "main",
            Declarations::new().with_import_namespace("lib", "ns"),
        ),
    ]);

    let root = loader.resolve_graph("main").unwrap();
    loader.link(root).unwrap();

    // Namespace bindings are never in the dead zone.
    let value = loader.record(root).scope().read("ns").unwrap();
    let ns = value.as_namespace().expect("namespace value");
    assert!(ns.has("x"));
    assert!(ns.get("x").is_err());
}

#[test]
fn test_namespace_has_vs_get_before_evaluation() {
    let mut loader = loader_with(vec![("lib", exporting_value("x", 1))]);

    let root = loader.resolve_graph("lib").unwrap();
    loader.link(root).unwrap();

    let ns = loader.namespace(root).unwrap();
    // Declared but uninitialized: a member whose read fails.
    assert!(ns.has("x"));
    assert!(ns.get("x").is_err());

    loader.evaluate(root).unwrap();
    assert_eq!(ns.get("x").unwrap(), Value::from(1));
}

#[test]
fn test_namespace_is_frozen() {
    let mut loader = loader_with(vec![("lib", exporting_value("x", 1))]);

    let root = loader.resolve_graph("lib").unwrap();
    loader.link(root).unwrap();

    let ns = loader.namespace(root).unwrap();
    assert!(ns.set("x", Value::from(2)).is_err());
    assert!(ns.set("brand_new", Value::from(2)).is_err());
    assert!(ns.delete("x").is_err());
}

#[test]
fn test_lazy_namespace_option() {
    let mut loader = loader_with(vec![("lib", exporting_value("x", 1))]).with_options(
        LoaderOptions {
            eager_namespaces: false,
        },
    );

    let root = loader.resolve_graph("lib").unwrap();
    loader.link(root).unwrap();

    assert!(loader.record(root).namespace().is_none());
    let ns = loader.namespace(root).unwrap();
    assert!(ns.has("x"));
    // Built once, cached on the record.
    assert!(loader.record(root).namespace().is_some());
}

#[test]
fn test_sibling_subgraph_stays_linked_after_failure() {
    let mut loader = loader_with(vec![
        ("good", exporting_value("x", 1)),
        ("lib", exporting_value("y", 2)),
        (
            "bad",
            Declarations::new().with_import("lib", &[("nope", "nope")]),
        ),
        (
            "root",
            Declarations::new()
                .with_import("good", &[("x", "x")])
                .with_import("bad", &[("nope", "nope")]),
        ),
    ]);

    let root = loader.resolve_graph("root").unwrap();
    assert!(matches!(
        loader.link(root),
        Err(LinkError::UnresolvedExport { .. })
    ));

    // The sibling that linked before the failure is untouched.
    assert_eq!(loader.state(lookup(&loader, "good")), ModuleState::Linked);
    assert_eq!(loader.state(lookup(&loader, "lib")), ModuleState::Linked);
    assert_eq!(loader.state(lookup(&loader, "bad")), ModuleState::Errored);
    assert_eq!(loader.state(root), ModuleState::Errored);
}
