#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! Parse Cargo.toml and check that the panic-free lint set, the feature
//! layout and the demo registrations stay in place.

use std::path::PathBuf;

use toml::{Table, Value};

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn manifest() -> Table {
    let path = project_root().join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read '{}': {e}", path.display()));
    text.parse::<Table>()
        .unwrap_or_else(|e| panic!("Cargo.toml does not parse: {e}"))
}

fn table<'a>(root: &'a Table, key: &str) -> &'a Table {
    root.get(key)
        .and_then(Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing [{key}]"))
}

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn every_panic_lint_is_denied() {
        let root = manifest();
        let clippy = table(table(&root, "lints"), "clippy");
        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(Value::as_str),
                Some("deny"),
                "[lints.clippy] must set `{lint} = \"deny\"` to keep library code panic-free"
            );
        }
    }
}

mod feature_policy {
    use super::*;

    fn feature_list(features: &Table, name: &str) -> Vec<String> {
        features
            .get(name)
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("feature `{name}` is missing"))
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn websocket_is_the_default_transport() {
        let root = manifest();
        let features = table(&root, "features");
        assert_eq!(feature_list(features, "default"), vec!["transport-websocket"]);
    }

    #[test]
    fn websocket_feature_pulls_in_runtime() {
        let root = manifest();
        let features = table(&root, "features");
        let ws = feature_list(features, "transport-websocket");
        for required in ["dep:tokio-tungstenite", "dep:futures-util", "tokio-runtime"] {
            assert!(
                ws.iter().any(|f| f == required),
                "transport-websocket must enable `{required}`"
            );
        }
    }

    #[test]
    fn optional_dependencies_stay_optional() {
        let root = manifest();
        let deps = table(&root, "dependencies");
        for name in ["tokio-tungstenite", "futures-util"] {
            let optional = deps
                .get(name)
                .and_then(Value::as_table)
                .and_then(|t| t.get("optional"))
                .and_then(Value::as_bool);
            assert_eq!(optional, Some(true), "`{name}` must be optional");
        }
    }
}

mod demo_policy {
    use super::*;

    #[test]
    fn every_registered_demo_exists() {
        let root = manifest();
        let demos = root
            .get("example")
            .and_then(Value::as_array)
            .expect("Cargo.toml registers demos as [[example]]");
        assert!(!demos.is_empty());
        for demo in demos {
            let path = demo
                .get("path")
                .and_then(Value::as_str)
                .expect("[[example]] entries need an explicit path");
            assert!(path.starts_with("demos/"), "{path} should live under demos/");
            assert!(
                project_root().join(path).is_file(),
                "registered demo '{path}' does not exist"
            );
        }
    }
}
