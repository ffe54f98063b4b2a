//! Black-box `Includes`/glob loader tests against real temp-directory
//! fixtures (the loader's own `#[cfg(test)]` module covers the same ground
//! at the unit level; these exercise it through the public `load_definitions`
//! entry point only).

use std::io::Write;

use licentia::definitions::load_definitions;
use licentia::error::EngineError;

#[test]
fn includes_merge_list_extend_and_map_update() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    let shared = dir.path().join("shared.json");

    std::fs::write(
        &shared,
        r#"{ "Licenses": { "MIT": { "T1": true } }, "Rules": [{ "key": "SHARED" }] }"#,
    )
    .unwrap();

    std::fs::write(
        &base,
        r#"{
            "Includes": ["shared.json"],
            "Licenses": { "GPL-2.0-only": { "T1": true } },
            "Rules": [{ "key": "BASE" }]
        }"#,
    )
    .unwrap();

    let kb = load_definitions(&[base]).unwrap();
    assert!(kb.licenses.contains_key("MIT"));
    assert!(kb.licenses.contains_key("GPL-2.0-only"));
    let keys: Vec<_> = kb.rules.iter().filter_map(|r| r.key.clone()).collect();
    assert!(keys.contains(&"SHARED".to_string()));
    assert!(keys.contains(&"BASE".to_string()));
}

#[test]
fn star_glob_include_expands_every_match() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");

    for name in ["licenses-a.json", "licenses-b.json", "licenses-c.json"] {
        let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
        write!(f, r#"{{ "Licenses": {{ "{name}": {{}} }} }}"#).unwrap();
    }
    std::fs::write(&base, r#"{ "Includes": ["licenses-*.json"] }"#).unwrap();

    let kb = load_definitions(&[base]).unwrap();
    assert_eq!(kb.licenses.len(), 3);
}

#[test]
fn malformed_includes_shape_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    std::fs::write(&base, r#"{ "Includes": "not-an-array" }"#).unwrap();

    let err = load_definitions(&[base]).unwrap_err();
    assert!(matches!(err, EngineError::Json { .. }));
}
