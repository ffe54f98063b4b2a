//! serde model of the knowledge-base JSON/TOML-free definition format (§6)
//! and the module input format, plus the `Includes`/glob loader.
//!
//! This is a lean, single-purpose reader — not the full OSADL
//! checklist/NL-transformer pipeline, which is out of scope (§1).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// CNF/DNF as the wire format sees it: a list of clauses, each a list of
/// dotted-key atom strings (optionally `!`-negated). Validated lazily by
/// `constraints::Builder` — a malformed shape is a definition-error warning,
/// not a parse-time failure, per §4.2's error policy.
pub type RawClauses = Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeBaseDef {
    #[serde(default, rename = "Includes")]
    pub includes: Vec<String>,
    #[serde(default, rename = "Licenses")]
    pub licenses: IndexMap<String, LicenseDef>,
    #[serde(default, rename = "Constraints")]
    pub constraints: ConstraintsDef,
    #[serde(default, rename = "Rules")]
    pub rules: Vec<RuleDef>,
}

/// `{ constraint_key: bool | { "value": bool } }`
pub type LicenseDef = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstraintsDef {
    #[serde(default, rename = "Rights")]
    pub rights: IndexMap<String, Value>,
    #[serde(default, rename = "Terms")]
    pub terms: IndexMap<String, Value>,
    #[serde(default, rename = "Obligations")]
    pub obligations: IndexMap<String, ObligationDef>,
    #[serde(default, rename = "Variants")]
    pub variants: IndexMap<String, VariantDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObligationDef {
    #[serde(default)]
    pub setting: RawClauses,
    #[serde(default)]
    pub value: Option<RawClauses>,
    #[serde(default)]
    pub variants: Option<IndexMap<String, ObligationVariantDef>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObligationVariantDef {
    #[serde(default)]
    pub setting: Option<RawClauses>,
    #[serde(default)]
    pub value: Option<RawClauses>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantDef {
    #[serde(default)]
    pub setting: RawClauses,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub setting: RawClauses,
    #[serde(default)]
    pub require: Option<RawClauses>,
}

/// Extracts a boolean `value` whether written as a bare bool or as
/// `{"value": bool}` — the two shapes `Licenses` entries may take (§6).
pub fn bool_or_value_object(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Object(map) => map.get("value").and_then(Value::as_bool),
        _ => None,
    }
}

/// Load a knowledge base from one or more root files, resolving `Includes`
/// (list-extend / map-update; a type mismatch between an included and
/// including section is an error) and `*` glob expansion relative to the
/// including file.
///
/// Traversal uses a FIFO-from-the-back work queue, exactly mirroring the
/// source's `while len(_paths) > 0: _paths.pop()` (Python's `list.pop()`
/// pops the *last* element), and a visited-set so circular includes are
/// harmless.
pub fn load_definitions(paths: &[PathBuf]) -> EngineResult<KnowledgeBaseDef> {
    let mut merged = KnowledgeBaseDef::default();
    let mut queue: VecDeque<PathBuf> = paths.iter().cloned().collect();
    let mut visited: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();

    while let Some(path) = queue.pop_back() {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !visited.insert(canonical) {
            continue;
        }

        let text = std::fs::read_to_string(&path).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        let def: KnowledgeBaseDef =
            serde_json::from_str(&text).map_err(|source| EngineError::Json {
                path: path.clone(),
                source,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for include in &def.includes {
            for resolved in resolve_include(base_dir, include)? {
                queue.push_back(resolved);
            }
        }

        merge_into(&mut merged, def);
    }

    Ok(merged)
}

fn resolve_include(base_dir: &Path, pattern: &str) -> EngineResult<Vec<PathBuf>> {
    if pattern.contains('*') {
        let full_pattern = base_dir.join(pattern);
        let pattern_str = full_pattern.to_string_lossy().to_string();
        let mut out = Vec::new();
        for entry in glob::glob(&pattern_str).map_err(|source| EngineError::Glob {
            pattern: pattern_str.clone(),
            source,
        })? {
            if let Ok(p) = entry {
                out.push(p);
            }
        }
        Ok(out)
    } else {
        Ok(vec![base_dir.join(pattern)])
    }
}

/// Merge `incoming` into `merged`: lists extend, maps update (later entries
/// win on key collision), matching the source's dict merge semantics.
fn merge_into(merged: &mut KnowledgeBaseDef, incoming: KnowledgeBaseDef) {
    merged.licenses.extend(incoming.licenses);
    merged.rules.extend(incoming.rules);

    merged.constraints.rights.extend(incoming.constraints.rights);
    merged.constraints.terms.extend(incoming.constraints.terms);
    merged
        .constraints
        .obligations
        .extend(incoming.constraints.obligations);
    merged
        .constraints
        .variants
        .extend(incoming.constraints.variants);
}

/// The module input format (§6): a key, arbitrary boolean properties, and a
/// `components` map. Parsed by hand (not `#[derive(Deserialize)]`) because
/// module-level properties are an open bag of booleans interleaved with the
/// fixed `key`/`components` fields.
#[derive(Debug, Clone)]
pub struct ModuleDef {
    pub key: String,
    pub properties: std::collections::BTreeMap<String, bool>,
    pub components: IndexMap<String, ComponentDef>,
}

#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub licenses: Vec<String>,
    pub properties: std::collections::BTreeMap<String, bool>,
}

impl<'de> Deserialize<'de> for ModuleDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        module_def_from_value(value).map_err(serde::de::Error::custom)
    }
}

fn module_def_from_value(value: Value) -> Result<ModuleDef, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "module must be a JSON object".to_string())?;

    let key = obj
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| "module is missing string \"key\"".to_string())?
        .to_string();

    let mut components = IndexMap::new();
    if let Some(comps) = obj.get("components") {
        let comps = comps
            .as_object()
            .ok_or_else(|| "\"components\" must be an object".to_string())?;
        for (comp_key, comp_value) in comps {
            components.insert(comp_key.clone(), component_def_from_value(comp_value)?);
        }
    }

    let mut properties = std::collections::BTreeMap::new();
    for (k, v) in obj {
        if k == "key" || k == "components" {
            continue;
        }
        let b = v
            .as_bool()
            .ok_or_else(|| format!("module property \"{k}\" must be a boolean"))?;
        properties.insert(k.clone(), b);
    }

    Ok(ModuleDef {
        key,
        properties,
        components,
    })
}

fn component_def_from_value(value: &Value) -> Result<ComponentDef, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "component must be a JSON object".to_string())?;

    let licenses = match obj.get("licenses") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "component license entry must be a string".to_string())
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err("\"licenses\" must be an array of strings".to_string()),
        None => Vec::new(),
    };

    let mut properties = std::collections::BTreeMap::new();
    for (k, v) in obj {
        if k == "licenses" {
            continue;
        }
        let b = v
            .as_bool()
            .ok_or_else(|| format!("component property \"{k}\" must be a boolean"))?;
        properties.insert(k.clone(), b);
    }

    Ok(ComponentDef {
        licenses,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merge_extends_lists_and_updates_maps() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let included = dir.path().join("more.json");

        std::fs::write(
            &included,
            r#"{ "Rules": [{"key": "R2", "setting": [], "require": []}] }"#,
        )
        .unwrap();

        std::fs::write(
            &base,
            format!(
                r#"{{ "Includes": ["more.json"], "Rules": [{{"key": "R1", "setting": [], "require": []}}] }}"#,
            ),
        )
        .unwrap();

        let kb = load_definitions(&[base]).unwrap();
        let keys: Vec<_> = kb.rules.iter().filter_map(|r| r.key.clone()).collect();
        assert!(keys.contains(&"R1".to_string()));
        assert!(keys.contains(&"R2".to_string()));
    }

    #[test]
    fn circular_includes_are_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");

        std::fs::write(
            &a,
            r#"{ "Includes": ["b.json"], "Rules": [{"key": "A"}] }"#,
        )
        .unwrap();
        std::fs::write(
            &b,
            r#"{ "Includes": ["a.json"], "Rules": [{"key": "B"}] }"#,
        )
        .unwrap();

        let kb = load_definitions(&[a]).unwrap();
        let keys: Vec<_> = kb.rules.iter().filter_map(|r| r.key.clone()).collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn glob_include_expands_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let mut f1 = std::fs::File::create(dir.path().join("rules-a.json")).unwrap();
        write!(f1, r#"{{ "Rules": [{{"key": "A"}}] }}"#).unwrap();
        let mut f2 = std::fs::File::create(dir.path().join("rules-b.json")).unwrap();
        write!(f2, r#"{{ "Rules": [{{"key": "B"}}] }}"#).unwrap();

        std::fs::write(&base, r#"{ "Includes": ["rules-*.json"] }"#).unwrap();

        let kb = load_definitions(&[base]).unwrap();
        assert_eq!(kb.rules.len(), 2);
    }

    #[test]
    fn module_def_rejects_non_boolean_property() {
        let json = br#"{"key": "m", "D_op": "yes", "components": {}}"#;
        let err = serde_json::from_slice::<ModuleDef>(json).unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }
}
