//! Subject-level domain types: the concrete `Module`/`Component` a check is
//! run against, as opposed to the knowledge-base definitions that describe
//! licenses/rules/obligations in the abstract (see [`crate::definitions`]).

use std::collections::BTreeMap;

use crate::definitions::ModuleDef;
use crate::error::{EngineError, EngineResult};

/// A software distribution unit: a key, a set of boolean distribution-mode
/// properties, and the components it is made of.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub key: String,
    pub properties: BTreeMap<String, bool>,
    pub components: BTreeMap<String, Component>,
}

/// A reusable piece of a module: a key, its own boolean properties, and the
/// ordered list of license keys it is offered under.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub key: String,
    pub properties: BTreeMap<String, bool>,
    pub licenses: Vec<String>,
}

impl Module {
    /// Parse the module JSON input format (§6) and derive `dist_obj`/
    /// `dist_src` on every component from the module's own properties.
    ///
    /// A non-boolean property value or a non-string license entry is a
    /// subject error (§7): it aborts parsing rather than being silently
    /// dropped, because unlike a knowledge-base definition the subject is
    /// the thing under test — guessing its shape would invalidate the
    /// check, not merely narrow it.
    pub fn from_json(bytes: &[u8]) -> EngineResult<Module> {
        let def: ModuleDef = serde_json::from_slice(bytes).map_err(|source| EngineError::Json {
            path: "<module input>".into(),
            source,
        })?;
        Module::from_def(def)
    }

    pub fn from_def(def: ModuleDef) -> EngineResult<Module> {
        let properties = def.properties;

        let mut components = BTreeMap::new();
        for (comp_key, comp_def) in def.components {
            let mut props = comp_def.properties;
            derive_component_properties(&properties, &mut props);
            components.insert(
                comp_key.clone(),
                Component {
                    key: comp_key,
                    properties: props,
                    licenses: comp_def.licenses,
                },
            );
        }

        Ok(Module {
            key: def.key,
            properties,
            components,
        })
    }

    pub fn property(&self, name: &str) -> bool {
        *self.properties.get(name).unwrap_or(&false)
    }
}

impl Component {
    pub fn property(&self, name: &str) -> bool {
        *self.properties.get(name).unwrap_or(&false)
    }
}

/// `resolveComponentsProperties`: derive `dist_obj`/`dist_src` for a
/// component from its module's distribution-mode properties.
///
/// `dist_obj = D_op ∨ D_ipoa ∨ D_xa ∨ (D_sslib ∧ ¬OM_SaaS)`
/// `dist_src = D_cslib`
///
/// A component that already declares these keys explicitly keeps its own
/// value — the derivation only fills in what the module didn't override.
fn derive_component_properties(module_props: &BTreeMap<String, bool>, comp_props: &mut BTreeMap<String, bool>) {
    let mget = |k: &str| *module_props.get(k).unwrap_or(&false);

    let dist_obj =
        mget("D_op") || mget("D_ipoa") || mget("D_xa") || (mget("D_sslib") && !mget("OM_SaaS"));
    let dist_src = mget("D_cslib");

    comp_props.entry("dist_obj".to_string()).or_insert(dist_obj);
    comp_props.entry("dist_src".to_string()).or_insert(dist_src);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_dist_obj_from_d_op() {
        let mut module_props = BTreeMap::new();
        module_props.insert("D_op".to_string(), true);
        let mut comp_props = BTreeMap::new();
        derive_component_properties(&module_props, &mut comp_props);
        assert_eq!(comp_props.get("dist_obj"), Some(&true));
        assert_eq!(comp_props.get("dist_src"), Some(&false));
    }

    #[test]
    fn sslib_without_saas_derives_dist_obj() {
        let mut module_props = BTreeMap::new();
        module_props.insert("D_sslib".to_string(), true);
        let mut comp_props = BTreeMap::new();
        derive_component_properties(&module_props, &mut comp_props);
        assert_eq!(comp_props.get("dist_obj"), Some(&true));
    }

    #[test]
    fn sslib_with_saas_suppresses_dist_obj() {
        let mut module_props = BTreeMap::new();
        module_props.insert("D_sslib".to_string(), true);
        module_props.insert("OM_SaaS".to_string(), true);
        let mut comp_props = BTreeMap::new();
        derive_component_properties(&module_props, &mut comp_props);
        assert_eq!(comp_props.get("dist_obj"), Some(&false));
    }

    #[test]
    fn explicit_component_value_is_not_overridden() {
        let module_props = BTreeMap::new();
        let mut comp_props = BTreeMap::new();
        comp_props.insert("dist_obj".to_string(), true);
        derive_component_properties(&module_props, &mut comp_props);
        assert_eq!(comp_props.get("dist_obj"), Some(&true));
    }

    #[test]
    fn from_json_parses_module_and_components() {
        let json = br#"{
            "key": "acme-widget",
            "D_op": true,
            "components": {
                "libfoo": { "licenses": ["GPL-2.0-only"], "src_disclosed": false }
            }
        }"#;
        let module = Module::from_json(json).unwrap();
        assert_eq!(module.key, "acme-widget");
        assert!(module.property("D_op"));
        let comp = module.components.get("libfoo").unwrap();
        assert_eq!(comp.licenses, vec!["GPL-2.0-only".to_string()]);
        assert!(comp.property("dist_obj"));
        assert!(!comp.property("src_disclosed"));
    }
}
