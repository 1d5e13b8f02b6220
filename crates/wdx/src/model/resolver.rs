// SPDX-License-Identifier: MPL-2.0

//! Multi-inheritance resolution.
//!
//! Override precedence, per overridable field:
//!
//! 1. An override in a more specific class wins (a candidate that is a
//!    strict ancestor of another candidate is discarded).
//! 2. Among remaining unrelated candidates, the one whose class occurs
//!    earlier in the first-occurrence left-to-right include order wins.
//! 3. Rule 1 beats Rule 2.
//! 4. `AdditionalClasses` of an instantiation behave as if appended to the
//!    primary class's includes.
//! 5. WDD-global overrides beat class resolution.
//! 6. WDD per-instance overrides beat everything.
//!
//! Resolution is a pure function from `(classes, include chains)` to a
//! resolved-parameter-definitions list; instances whose effective
//! overrideables equal the declared ones share the declared allocation.

use std::collections::HashSet;
use std::sync::Arc;

use crate::model::definitions::{
    ClassDefinition, ClassInstantiationInternal, FeatureDefinition, OverrideField, Overrideables,
    ParameterDefinition, ParameterOverride, ResolvedClassSet,
};
use crate::model::device_model::DeviceModel;

/// Outcome of walking an include chain against the live model.
pub struct ChainResolution {
    /// Chain classes, first-occurrence pre-order (most derived first).
    pub classes: Vec<Arc<ClassDefinition>>,
    /// Referenced class names absent from the model.
    pub missing: Vec<String>,
}

impl ChainResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Walks `class_names` and their transitive includes in first-occurrence
/// pre-order.
pub fn collect_chain(model: &DeviceModel, class_names: &[String]) -> ChainResolution {
    let mut seen: HashSet<String> = HashSet::new();
    let mut classes = Vec::new();
    let mut missing = Vec::new();

    fn visit(
        model: &DeviceModel,
        name: &str,
        seen: &mut HashSet<String>,
        classes: &mut Vec<Arc<ClassDefinition>>,
        missing: &mut Vec<String>,
    ) {
        if !seen.insert(name.to_string()) {
            return;
        }
        match model.find_class_definition(name) {
            Some(class) => {
                let includes = class.includes.clone();
                classes.push(class);
                for include in &includes {
                    visit(model, include, seen, classes, missing);
                }
            }
            None => missing.push(name.to_string()),
        }
    }

    for name in class_names {
        visit(model, name, &mut seen, &mut classes, &mut missing);
    }
    ChainResolution { classes, missing }
}

/// Transitive include closure names (the chain without its first root).
pub fn resolved_includes_of(chain: &ChainResolution, root: &str) -> Vec<String> {
    chain
        .classes
        .iter()
        .map(|c| c.name.clone())
        .filter(|n| n != root)
        .collect()
}

fn override_for(class: &ClassDefinition, id: u32, field: OverrideField) -> Option<&ParameterOverride> {
    class
        .overrides
        .iter()
        .find(|o| o.id == id && o.touches(field))
}

/// Resolves the effective overrideables for one parameter over a chain.
fn resolve_overrideables(
    declared: &Overrideables,
    id: u32,
    chain: &[Arc<ClassDefinition>],
) -> Overrideables {
    let mut effective = declared.clone();

    for field in OverrideField::ALL {
        let candidates: Vec<&Arc<ClassDefinition>> = chain
            .iter()
            .filter(|class| override_for(class, id, field).is_some())
            .collect();
        if candidates.is_empty() {
            continue;
        }
        // Rule 1: drop candidates that are strict ancestors of another
        // candidate; Rule 2: earliest survivor in chain order wins.
        let mut winner: Option<&Arc<ClassDefinition>> = None;
        'candidates: for (i, candidate) in candidates.iter().enumerate() {
            for (j, other) in candidates.iter().enumerate() {
                if i != j && other.has_ancestor(&candidate.name) {
                    continue 'candidates;
                }
            }
            winner = Some(*candidate);
            break;
        }
        if let Some(winner) = winner {
            if let Some(ov) = override_for(winner, id, field) {
                apply_field(&mut effective, ov, field);
            }
        }
    }
    effective
}

fn apply_field(target: &mut Overrideables, ov: &ParameterOverride, field: OverrideField) {
    match field {
        OverrideField::DefaultValue => target.default_value = ov.default_value.clone(),
        OverrideField::Pattern => target.pattern = ov.pattern.clone(),
        OverrideField::AllowedValues => target.allowed_values = ov.allowed_values.clone(),
        OverrideField::Min => target.min = ov.min,
        OverrideField::Max => target.max = ov.max,
        OverrideField::Inactive => {
            if let Some(inactive) = ov.inactive {
                target.inactive = inactive;
            }
        }
    }
}

/// Effective definitions for a chain: every parameter declared by a chain
/// class (first declaration wins), class-rule overrides applied, then the
/// `extra` layers in order (WDD global first, per-instance last).
///
/// A definition whose effective overrideables equal the declared ones is
/// returned as the declared `Arc` itself, so unchanged instances share it.
pub fn effective_definitions(
    chain: &[Arc<ClassDefinition>],
    extra: &[&[ParameterOverride]],
) -> Vec<Arc<ParameterDefinition>> {
    let mut result: Vec<Arc<ParameterDefinition>> = Vec::new();
    let mut seen_ids: HashSet<u32> = HashSet::new();

    for class in chain {
        for declared in &class.parameter_definitions {
            if declared.id != 0 && !seen_ids.insert(declared.id) {
                continue;
            }
            let mut effective = resolve_overrideables(&declared.overrideables, declared.id, chain);
            for layer in extra {
                if let Some(ov) = layer.iter().find(|o| o.id == declared.id) {
                    ov.apply_to(&mut effective);
                }
            }
            if effective == declared.overrideables {
                result.push(Arc::clone(declared));
            } else {
                let mut cloned = (**declared).clone();
                cloned.overrideables = effective;
                result.push(Arc::new(cloned));
            }
        }
    }
    result
}

/// Applies override layers to definitions outside any class chain (feature
/// scalars). Unchanged definitions share their allocation.
pub fn apply_override_layers(
    definitions: &[Arc<ParameterDefinition>],
    layers: &[&[ParameterOverride]],
) -> Vec<Arc<ParameterDefinition>> {
    definitions
        .iter()
        .map(|declared| {
            let mut effective = declared.overrideables.clone();
            for layer in layers {
                if let Some(ov) = layer.iter().find(|o| o.id == declared.id) {
                    ov.apply_to(&mut effective);
                }
            }
            if effective == declared.overrideables {
                Arc::clone(declared)
            } else {
                let mut cloned = (**declared).clone();
                cloned.overrideables = effective;
                Arc::new(cloned)
            }
        })
        .collect()
}

/// Re-resolves a class instantiation's collected classes against the live
/// model. Returns false when referenced classes are missing from the model.
pub fn prepare_class_instantiation(
    instantiation: &mut ClassInstantiationInternal,
    model: &DeviceModel,
    apply_instance_overrides: bool,
) -> bool {
    let chain = collect_chain(model, &instantiation.classes);
    let definitions = if apply_instance_overrides {
        effective_definitions(&chain.classes, &[&instantiation.overrides])
    } else {
        effective_definitions(&chain.classes, &[])
    };
    instantiation.collected_classes = ResolvedClassSet {
        class_names: chain.classes.iter().map(|c| c.name.clone()).collect(),
        parameter_definitions: definitions,
    };
    chain.is_complete()
}

/// Resolves every class of the model in place: include closures, effective
/// definitions, synthetic instantiations parameters.
pub fn resolve_model_classes(model: &mut DeviceModel) {
    // pass 1: include closures (needed for ancestor checks in pass 2)
    let mut closures: Vec<Vec<String>> = Vec::with_capacity(model.classes.len());
    for class in &model.classes {
        let mut roots = vec![class.name.clone()];
        roots.extend(class.includes.iter().cloned());
        let chain = collect_chain(model, &roots);
        closures.push(resolved_includes_of(&chain, &class.name));
    }
    let mut updated: Vec<Arc<ClassDefinition>> = Vec::with_capacity(model.classes.len());
    for (class, resolved_includes) in model.classes.iter().zip(closures) {
        let mut cloned = (**class).clone();
        cloned.resolved_includes = resolved_includes;
        updated.push(Arc::new(cloned));
    }
    model.classes = updated;

    // pass 2: effective definitions over the closed chains
    let mut resolved: Vec<Arc<ClassDefinition>> = Vec::with_capacity(model.classes.len());
    for class in &model.classes {
        let mut roots = vec![class.name.clone()];
        roots.extend(class.includes.iter().cloned());
        let chain = collect_chain(model, &roots);
        let mut cloned = (**class).clone();
        cloned.resolved_parameter_definitions = effective_definitions(&chain.classes, &[]);
        if cloned.instantiations_parameter.is_none() {
            cloned.build_instantiations_parameter();
        }
        cloned.is_resolved = true;
        resolved.push(Arc::new(cloned));
    }
    model.classes = resolved;

    // expose instantiations parameters through the definitions catalog
    for class in &model.classes {
        if let Some(param) = &class.instantiations_parameter {
            if param.id != 0 && model.find_definition(param.id).is_none() {
                model.definitions.push(Arc::clone(param));
            }
        }
    }
}

/// Resolves every feature: include closure plus the union of its own
/// parameters, its classes' resolved parameters and included features'
/// parameters, deduplicated by id.
pub fn resolve_model_features(model: &mut DeviceModel) {
    let features = model.features.clone();
    let mut resolved: Vec<Arc<FeatureDefinition>> = Vec::with_capacity(features.len());

    for feature in &features {
        let mut include_order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        collect_feature_includes(model, &feature.name, &mut seen, &mut include_order);
        include_order.retain(|n| !crate::model::device_model::names_equal(n, &feature.name));

        let mut params: Vec<Arc<ParameterDefinition>> = Vec::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();
        let mut push_param = |param: &Arc<ParameterDefinition>,
                              params: &mut Vec<Arc<ParameterDefinition>>| {
            if param.id == 0 || seen_ids.insert(param.id) {
                params.push(Arc::clone(param));
            }
        };

        let mut feature_names = vec![feature.name.clone()];
        feature_names.extend(include_order.iter().cloned());
        for name in &feature_names {
            let Some(def) = model.find_feature_definition(name) else {
                continue;
            };
            for param in &def.parameter_definitions {
                push_param(param, &mut params);
            }
            for class_name in &def.classes {
                if let Some(class) = model.find_class_definition(class_name) {
                    for param in &class.resolved_parameter_definitions {
                        push_param(param, &mut params);
                    }
                    if let Some(param) = &class.instantiations_parameter {
                        push_param(param, &mut params);
                    }
                }
            }
        }

        let mut cloned = (**feature).clone();
        cloned.resolved_includes = include_order;
        cloned.resolved_parameter_definitions = params;
        resolved.push(Arc::new(cloned));
    }
    model.features = resolved;
}

fn collect_feature_includes(
    model: &DeviceModel,
    name: &str,
    seen: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if !seen.insert(name.to_ascii_lowercase()) {
        return;
    }
    order.push(name.to_string());
    if let Some(feature) = model.find_feature_definition(name) {
        for include in &feature.includes {
            collect_feature_includes(model, include, seen, order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definitions::ValueType;
    use crate::model::value::ParameterValue;

    fn class(
        name: &str,
        includes: &[&str],
        default_override: Option<&str>,
        pattern_override: Option<&str>,
    ) -> Arc<ClassDefinition> {
        let overrides = if default_override.is_some() || pattern_override.is_some() {
            vec![ParameterOverride {
                id: 11,
                default_value: default_override.map(|v| ParameterValue::String(v.into())),
                pattern: pattern_override.map(String::from),
                ..ParameterOverride::default()
            }]
        } else {
            Vec::new()
        };
        Arc::new(ClassDefinition {
            name: name.into(),
            includes: includes.iter().map(|s| (*s).to_string()).collect(),
            overrides,
            ..ClassDefinition::default()
        })
    }

    /// The O / A / B-C / D diamond used throughout the override rules.
    fn diamond_model() -> DeviceModel {
        let mut root_param = ParameterDefinition::new(11, "Param", ValueType::String);
        root_param.overrideables.default_value = Some(ParameterValue::String("O".into()));
        root_param.overrideables.pattern = Some("O".into());
        root_param.class_name = Some("O".into());
        root_param.class_base_path = Some("Tests".into());

        let mut o = ClassDefinition {
            name: "O".into(),
            base_id: 1,
            base_path: "Tests".into(),
            parameter_definitions: vec![Arc::new(root_param)],
            ..ClassDefinition::default()
        };
        o.build_instantiations_parameter();

        let mut model = DeviceModel::new();
        model.classes = vec![
            Arc::new(o),
            class("A", &["O"], Some("A"), Some("A")),
            class("B", &["A"], Some("B"), None),
            class("C", &["A"], Some("C"), Some("C")),
            class("D", &["B"], Some("D"), None),
            class("X_CD", &["C", "D"], None, None),
            class("X_DC", &["D", "C"], None, None),
            class("X_BD", &["B", "D"], None, None),
        ];
        resolve_model_classes(&mut model);
        model
    }

    fn defaults_for(model: &DeviceModel, roots: &[&str]) -> (String, String) {
        let names: Vec<String> = roots.iter().map(|s| (*s).to_string()).collect();
        let chain = collect_chain(model, &names);
        assert!(chain.is_complete());
        let defs = effective_definitions(&chain.classes, &[]);
        let def = defs.iter().find(|d| d.id == 11).expect("param 11");
        let default = match def.overrideables.default_value.as_ref() {
            Some(ParameterValue::String(s)) => s.clone(),
            other => panic!("unexpected default {other:?}"),
        };
        let pattern = def.overrideables.pattern.clone().expect("pattern");
        (default, pattern)
    }

    #[test]
    fn test_specific_class_beats_ancestor() {
        let model = diamond_model();
        assert_eq!(defaults_for(&model, &["B"]), ("B".into(), "A".into()));
        assert_eq!(defaults_for(&model, &["D"]), ("D".into(), "A".into()));
    }

    #[test]
    fn test_earlier_include_beats_later_among_unrelated() {
        let model = diamond_model();
        assert_eq!(defaults_for(&model, &["X_CD"]), ("C".into(), "C".into()));
        assert_eq!(defaults_for(&model, &["X_DC"]), ("D".into(), "C".into()));
    }

    #[test]
    fn test_rule_one_beats_rule_two() {
        // B listed first, but D is more specific than B
        let model = diamond_model();
        assert_eq!(defaults_for(&model, &["X_BD"]), ("D".into(), "A".into()));
    }

    #[test]
    fn test_additional_classes_extend_chain() {
        let model = diamond_model();
        assert_eq!(defaults_for(&model, &["O", "C", "D"]), ("C".into(), "C".into()));
        assert_eq!(defaults_for(&model, &["O", "D", "B"]), ("D".into(), "A".into()));
    }

    #[test]
    fn test_instance_override_layer_wins() {
        let model = diamond_model();
        let chain = collect_chain(&model, &["O".into(), "A".into()]);
        let instance_layer = vec![ParameterOverride {
            id: 11,
            default_value: Some(ParameterValue::String("I".into())),
            ..ParameterOverride::default()
        }];
        let defs = effective_definitions(&chain.classes, &[&instance_layer]);
        let def = defs.iter().find(|d| d.id == 11).expect("param 11");
        assert_eq!(
            def.overrideables.default_value,
            Some(ParameterValue::String("I".into()))
        );
        assert_eq!(def.overrideables.pattern.as_deref(), Some("A"));
    }

    #[test]
    fn test_unchanged_definitions_are_shared() {
        let model = diamond_model();
        let chain = collect_chain(&model, &["O".into()]);
        let defs = effective_definitions(&chain.classes, &[]);
        let declared = &model.find_class_definition("O").expect("O").parameter_definitions[0];
        assert!(Arc::ptr_eq(&defs[0], declared));
    }

    #[test]
    fn test_missing_class_reported() {
        let model = diamond_model();
        let chain = collect_chain(&model, &["O".into(), "NotThere".into()]);
        assert!(!chain.is_complete());
        assert_eq!(chain.missing, vec!["NotThere".to_string()]);
    }

    #[test]
    fn test_prepare_class_instantiation_resolves_collected() {
        let model = diamond_model();
        let mut inst = ClassInstantiationInternal {
            id: 4,
            classes: vec!["C".into()],
            ..ClassInstantiationInternal::default()
        };
        assert!(prepare_class_instantiation(&mut inst, &model, false));
        assert_eq!(
            inst.collected_classes.class_names,
            vec!["C".to_string(), "A".to_string(), "O".to_string()]
        );
        assert_eq!(inst.collected_classes.parameter_definitions.len(), 1);
    }
}
