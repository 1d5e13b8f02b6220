// SPDX-License-Identifier: MPL-2.0

//! Per-device parameter-instance store.
//!
//! Static instances live in a slab addressed by index through a
//! case-insensitive path tree. Instances of dynamic classes exist as a
//! single placeholder (`instance_id == u16::MAX`); concrete instances are
//! materialized from it on demand and cached. The cache re-stamps the
//! placeholder's current provider on every hit, and by default is never
//! pruned when class instance sets shrink (the owning provider has to
//! tolerate unknown instance ids anyway); a bounded policy is available.

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::{error, warn};
use lru::LruCache;

use crate::instances::instance::{find_value_declaration, ParameterInstance, ValueDeclaration};
use crate::instances::path::{instance_number_in_path, join_path, PathTree};
use crate::model::definitions::ParameterDefinition;
use crate::model::types::{
    DeviceId, InstanceId, ParameterInstanceId, DYNAMIC_PLACEHOLDER_INSTANCE_ID,
};
use crate::model::validate::check_parameter_value;

/// Retention policy for materialized dynamic instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicCachePolicy {
    /// Keep every materialized instance for the device's lifetime.
    #[default]
    KeepForever,
    /// Keep at most this many materialized instances, evicting least
    /// recently used ones. Placeholders are never evicted.
    Bounded(usize),
}

enum DynamicCache {
    Unbounded(Vec<ParameterInstance>),
    Bounded(LruCache<(u32, InstanceId), ParameterInstance>),
}

impl DynamicCache {
    fn get_mut(&mut self, id: &ParameterInstanceId) -> Option<&mut ParameterInstance> {
        match self {
            DynamicCache::Unbounded(items) => items
                .iter_mut()
                .find(|i| i.id.id == id.id && i.id.instance == id.instance),
            DynamicCache::Bounded(cache) => cache.get_mut(&(id.id, id.instance)),
        }
    }

    fn insert(&mut self, instance: ParameterInstance) {
        match self {
            DynamicCache::Unbounded(items) => items.push(instance),
            DynamicCache::Bounded(cache) => {
                cache.put((instance.id.id, instance.id.instance), instance);
            }
        }
    }
}

pub struct ParameterInstanceCollection {
    instances: Vec<ParameterInstance>,
    paths: PathTree<usize>,
    dynamic: DynamicCache,
}

impl ParameterInstanceCollection {
    pub fn new() -> Self {
        Self::with_policy(DynamicCachePolicy::KeepForever)
    }

    pub fn with_policy(policy: DynamicCachePolicy) -> Self {
        let dynamic = match policy {
            DynamicCachePolicy::KeepForever => DynamicCache::Unbounded(Vec::new()),
            DynamicCachePolicy::Bounded(limit) => DynamicCache::Bounded(LruCache::new(
                NonZeroUsize::new(limit.max(1)).expect("non-zero limit"),
            )),
        };
        ParameterInstanceCollection {
            instances: Vec::new(),
            paths: PathTree::new(),
            dynamic,
        }
    }

    /// Adds one instance per definition with the given `instance_id`. The
    /// whole batch is refused when a static class instance misses a value
    /// for an `instance_key` parameter.
    pub fn add_instances(
        &mut self,
        device: DeviceId,
        instance_id: InstanceId,
        definitions: &[Arc<ParameterDefinition>],
        values: &[ValueDeclaration],
        force_status_unavailable_if_not_provided: bool,
    ) {
        let mut prepared: Vec<ParameterInstance> = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let id = ParameterInstanceId::new(definition.id, instance_id, device);
            if self.get_instance(&id).is_some() {
                if id.instance != DYNAMIC_PLACEHOLDER_INSTANCE_ID {
                    warn!("Parameter instance {id} already exists, ignoring");
                }
                continue;
            }

            let mut instance = ParameterInstance::new(id, Arc::clone(definition));

            let mut found_value = definition.overrideables.default_value.clone();
            if let Some(declaration) = find_value_declaration(values, &id) {
                if let Some(declared) = &declaration.value {
                    let status = check_parameter_value(Some(declared), definition);
                    if status.is_error() {
                        warn!(
                            "Given {} did not match model definition: {status}",
                            definition.path
                        );
                    } else {
                        found_value = Some(declared.clone());
                    }
                }
                instance.status_unavailable_if_not_provided =
                    declaration.status_unavailable_if_not_provided;
            } else if definition.instance_key && id.instance != DYNAMIC_PLACEHOLDER_INSTANCE_ID {
                error!(
                    "No value for instance_key was found for class '{}' in parameter definition '{}' (id={}). Loading class instance was refused.",
                    definition.class_name.as_deref().unwrap_or("<unknown>"),
                    definition.path,
                    definition.id
                );
                return;
            }
            if force_status_unavailable_if_not_provided {
                instance.status_unavailable_if_not_provided = true;
            }
            if !definition.writeable || definition.overrideables.inactive {
                instance.fixed_value = found_value;
            }
            prepared.push(instance);
        }

        self.instances.reserve(prepared.len());
        for instance in prepared {
            let internal_path = Self::build_internal_path(&instance);
            let index = self.instances.len();
            self.instances.push(instance);
            self.paths.add_value(&internal_path, index);
        }
    }

    /// Adds the instantiations pseudo-instance of a class at its base path.
    /// Classes without a base id collide on id `(0, 0)`; those are reachable
    /// by path only, which is fine since numeric addressing of them is
    /// unsupported.
    pub fn add_class_instance(
        &mut self,
        device: DeviceId,
        base_path: &str,
        definition: Arc<ParameterDefinition>,
        force_value: &ValueDeclaration,
    ) {
        let id = ParameterInstanceId::new(definition.id, 0, device);
        if self.get_instance(&id).is_some() {
            return;
        }
        let mut instance = ParameterInstance::new(id, definition);
        instance.fixed_value = force_value.value.clone();
        instance.status_unavailable_if_not_provided = force_value.status_unavailable_if_not_provided;

        let index = self.instances.len();
        self.instances.push(instance);
        self.paths.add_value(base_path, index);
    }

    /// Refreshes the fixed value of the instantiations pseudo-instance at
    /// `base_path`, if present. Used when a description is re-applied after
    /// more model information arrived.
    pub fn refresh_class_instance_value(
        &mut self,
        base_path: &str,
        force_value: &ValueDeclaration,
    ) -> bool {
        let Some(index) = self.paths.get_value(base_path) else {
            return false;
        };
        let instance = &mut self.instances[index];
        if instance.definition.value_type != crate::model::definitions::ValueType::Instantiations {
            return false;
        }
        instance.fixed_value = force_value.value.clone();
        true
    }

    /// Numeric lookup. Materializes dynamic instances through their
    /// placeholder. Id `(0, 0)` never resolves.
    pub fn get_instance(&mut self, id: &ParameterInstanceId) -> Option<&ParameterInstance> {
        if id.id == 0 && id.instance == 0 {
            return None;
        }
        let mut exact_idx: Option<usize> = None;
        let mut placeholder_idx: Option<usize> = None;
        for (idx, instance) in self.instances.iter().enumerate() {
            if instance.id.id != id.id {
                continue;
            }
            if instance.id.instance == id.instance {
                exact_idx = Some(idx);
                break;
            }
            if id.instance > 0 && instance.id.instance == DYNAMIC_PLACEHOLDER_INSTANCE_ID {
                placeholder_idx = Some(idx);
            }
        }
        if let Some(idx) = exact_idx {
            return Some(&self.instances[idx]);
        }
        let placeholder_idx = placeholder_idx?;
        Some(self.materialize_dynamic(placeholder_idx, id.instance))
    }

    /// Path lookup (request form `base/instance/parameter`).
    pub fn get_instance_by_path(&mut self, parameter_path: &str) -> Option<&ParameterInstance> {
        let index = self.paths.get_value(parameter_path)?;
        if self.instances[index].id.instance == DYNAMIC_PLACEHOLDER_INSTANCE_ID {
            let instance_number = instance_number_in_path(parameter_path)?;
            return Some(self.materialize_dynamic(index, instance_number));
        }
        Some(&self.instances[index])
    }

    fn materialize_dynamic(
        &mut self,
        placeholder_idx: usize,
        instance_number: InstanceId,
    ) -> &ParameterInstance {
        let placeholder = &self.instances[placeholder_idx];
        let wanted = ParameterInstanceId::new(
            placeholder.id.id,
            instance_number,
            placeholder.id.device,
        );
        let provider = placeholder.provider.clone();

        let missing = self.dynamic.get_mut(&wanted).is_none();
        if missing {
            let mut fresh = self.instances[placeholder_idx].clone();
            fresh.id.instance = instance_number;
            self.dynamic.insert(fresh);
        }
        let cached = self
            .dynamic
            .get_mut(&wanted)
            .expect("materialized dynamic instance");
        // the placeholder binding may have changed since materialization
        cached.provider = provider;
        cached
    }

    /// All static instances (placeholders included).
    pub fn all(&self) -> &[ParameterInstance] {
        &self.instances
    }

    /// Mutable access for provider (re)binding.
    pub fn all_mut(&mut self) -> &mut [ParameterInstance] {
        &mut self.instances
    }

    /// Instance by slab index.
    pub fn by_index(&self, index: usize) -> &ParameterInstance {
        &self.instances[index]
    }

    /// Static instances below `subpath`, plus any instantiation parameters
    /// without fixed value visited on the way down (their instance sets may
    /// extend below the subpath).
    pub fn all_under_subpath(&self, subpath: &str) -> Vec<usize> {
        let mut visited: Vec<usize> = Vec::new();
        let Some(node) = self.paths.node_under_path(subpath, &mut visited, true) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        PathTree::gather_values(node, &mut result);
        for index in visited {
            let instance = &self.instances[index];
            if instance.definition.value_type == crate::model::definitions::ValueType::Instantiations
                && instance.fixed_value.is_none()
            {
                result.push(index);
            }
        }
        result
    }

    /// Composes the request path of an instance:
    /// `class_base_path/instance_id/parameter_path`.
    pub fn build_parameter_instance_path(instance: &ParameterInstance) -> String {
        let base = instance.definition.class_base_path.as_deref().unwrap_or("");
        let number = if instance.id.instance > 0 {
            instance.id.instance.to_string()
        } else {
            String::new()
        };
        join_path(&[base, &number, &instance.definition.path])
    }

    /// Composes the search-tree path: `class_base_path/parameter_path/instance_id`
    /// (instance id deepest, so definition paths are shared between
    /// instances).
    fn build_internal_path(instance: &ParameterInstance) -> String {
        let base = instance.definition.class_base_path.as_deref().unwrap_or("");
        let number = if instance.id.instance > 0 {
            instance.id.instance.to_string()
        } else {
            String::new()
        };
        join_path(&[base, &instance.definition.path, &number])
    }
}

impl Default for ParameterInstanceCollection {
    fn default() -> Self {
        ParameterInstanceCollection::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definitions::{ParameterDefinition, ValueType};
    use crate::model::value::ParameterValue;

    fn class_param(id: u32, path: &str, writeable: bool) -> Arc<ParameterDefinition> {
        let mut def = ParameterDefinition::new(id, path, ValueType::Uint32);
        def.writeable = writeable;
        def.class_name = Some("TestClass".into());
        def.class_base_path = Some("Test/Class/Base".into());
        Arc::new(def)
    }

    fn device() -> DeviceId {
        DeviceId::head_station()
    }

    #[test]
    fn test_add_and_lookup_by_id_and_path() {
        let mut coll = ParameterInstanceCollection::new();
        let defs = vec![class_param(123, "TestParam1", true)];
        let values = vec![ValueDeclaration::new(
            ParameterInstanceId::new(123, 1, device()),
            Some(ParameterValue::Uint32(31)),
        )];
        coll.add_instances(device(), 1, &defs, &values, false);

        let by_id = coll
            .get_instance(&ParameterInstanceId::new(123, 1, device()))
            .expect("by id")
            .id;
        let by_path = coll
            .get_instance_by_path("Test/Class/Base/1/TestParam1")
            .expect("by path")
            .id;
        assert_eq!(by_id, by_path);
    }

    #[test]
    fn test_writeable_instance_has_no_fixed_value() {
        let mut coll = ParameterInstanceCollection::new();
        coll.add_instances(
            device(),
            1,
            &[class_param(123, "TestParam1", true)],
            &[ValueDeclaration::new(
                ParameterInstanceId::new(123, 1, device()),
                Some(ParameterValue::Uint32(5)),
            )],
            false,
        );
        let instance = coll
            .get_instance(&ParameterInstanceId::new(123, 1, device()))
            .expect("instance");
        assert!(instance.fixed_value.is_none());
    }

    #[test]
    fn test_readonly_instance_keeps_declared_value() {
        let mut coll = ParameterInstanceCollection::new();
        coll.add_instances(
            device(),
            0,
            &[class_param(7, "Fixed", false)],
            &[ValueDeclaration::new(
                ParameterInstanceId::new(7, 0, device()),
                Some(ParameterValue::Uint32(99)),
            )],
            false,
        );
        let instance = coll
            .get_instance(&ParameterInstanceId::new(7, 0, device()))
            .expect("instance");
        assert_eq!(instance.fixed_value, Some(ParameterValue::Uint32(99)));
    }

    #[test]
    fn test_invalid_declared_value_falls_back_to_default() {
        let mut coll = ParameterInstanceCollection::new();
        let mut def = ParameterDefinition::new(8, "Limit", ValueType::Uint32);
        def.writeable = false;
        def.overrideables.default_value = Some(ParameterValue::Uint32(10));
        coll.add_instances(
            device(),
            0,
            &[Arc::new(def)],
            &[ValueDeclaration::new(
                ParameterInstanceId::new(8, 0, device()),
                Some(ParameterValue::String("wrong type".into())),
            )],
            false,
        );
        let instance = coll
            .get_instance(&ParameterInstanceId::new(8, 0, device()))
            .expect("instance");
        assert_eq!(instance.fixed_value, Some(ParameterValue::Uint32(10)));
    }

    #[test]
    fn test_missing_instance_key_refuses_class_instance() {
        let mut coll = ParameterInstanceCollection::new();
        let mut key_def = ParameterDefinition::new(30, "Key", ValueType::Uint32);
        key_def.writeable = true;
        key_def.instance_key = true;
        key_def.class_name = Some("Keyed".into());
        key_def.class_base_path = Some("Keyed/Base".into());
        coll.add_instances(
            device(),
            2,
            &[Arc::new(key_def), class_param(31, "Other", true)],
            &[],
            false,
        );
        assert!(coll
            .get_instance(&ParameterInstanceId::new(31, 2, device()))
            .is_none());
    }

    #[test]
    fn test_duplicate_instances_are_ignored() {
        let mut coll = ParameterInstanceCollection::new();
        let defs = vec![class_param(123, "TestParam1", true)];
        coll.add_instances(device(), 1, &defs, &[], false);
        coll.add_instances(device(), 1, &defs, &[], false);
        assert_eq!(coll.all().len(), 1);
    }

    #[test]
    fn test_dynamic_placeholder_materializes_on_demand() {
        let mut coll = ParameterInstanceCollection::new();
        coll.add_instances(
            device(),
            DYNAMIC_PLACEHOLDER_INSTANCE_ID,
            &[class_param(50, "Dyn", true)],
            &[],
            false,
        );

        let by_id = coll
            .get_instance(&ParameterInstanceId::new(50, 4, device()))
            .expect("materialized")
            .id;
        assert_eq!(by_id.instance, 4);

        let by_path = coll
            .get_instance_by_path("Test/Class/Base/9/Dyn")
            .expect("materialized by path")
            .id;
        assert_eq!(by_path.instance, 9);

        // static set still only holds the placeholder
        assert_eq!(coll.all().len(), 1);
    }

    #[test]
    fn test_dynamic_cache_is_not_pruned() {
        let mut coll = ParameterInstanceCollection::new();
        coll.add_instances(
            device(),
            DYNAMIC_PLACEHOLDER_INSTANCE_ID,
            &[class_param(50, "Dyn", true)],
            &[],
            false,
        );
        for instance_number in 1..=16 {
            coll.get_instance(&ParameterInstanceId::new(50, instance_number, device()))
                .expect("materialized");
        }
        match &coll.dynamic {
            DynamicCache::Unbounded(items) => assert_eq!(items.len(), 16),
            DynamicCache::Bounded(_) => panic!("default policy must be unbounded"),
        }
    }

    #[test]
    fn test_bounded_policy_evicts_least_recently_used() {
        let mut coll =
            ParameterInstanceCollection::with_policy(DynamicCachePolicy::Bounded(2));
        coll.add_instances(
            device(),
            DYNAMIC_PLACEHOLDER_INSTANCE_ID,
            &[class_param(50, "Dyn", true)],
            &[],
            false,
        );
        for instance_number in 1..=3 {
            coll.get_instance(&ParameterInstanceId::new(50, instance_number, device()))
                .expect("materialized");
        }
        match &coll.dynamic {
            DynamicCache::Bounded(cache) => assert_eq!(cache.len(), 2),
            DynamicCache::Unbounded(_) => panic!("expected bounded cache"),
        }
    }

    #[test]
    fn test_id_zero_is_not_numerically_addressable() {
        let mut coll = ParameterInstanceCollection::new();
        let def = Arc::new(ParameterDefinition::new(0, "Base/Path", ValueType::Instantiations));
        coll.add_class_instance(
            device(),
            "Base/Path",
            def,
            &ValueDeclaration::default(),
        );
        assert!(coll
            .get_instance(&ParameterInstanceId::new(0, 0, device()))
            .is_none());
        assert!(coll.get_instance_by_path("Base/Path").is_some());
    }

    #[test]
    fn test_subpath_listing_includes_unfixed_instantiation_parents() {
        let mut coll = ParameterInstanceCollection::new();
        // dynamic instantiations parameter at the class base path
        let mut inst_def = ParameterDefinition::new(60, "Io/Channels", ValueType::Instantiations);
        inst_def.writeable = true;
        coll.add_class_instance(
            device(),
            "Io/Channels",
            Arc::new(inst_def),
            &ValueDeclaration::default(),
        );
        let mut member = ParameterDefinition::new(61, "Temp", ValueType::Uint32);
        member.writeable = true;
        member.class_name = Some("IoChannel".into());
        member.class_base_path = Some("Io/Channels".into());
        coll.add_instances(
            device(),
            DYNAMIC_PLACEHOLDER_INSTANCE_ID,
            &[Arc::new(member)],
            &[],
            false,
        );

        let under = coll.all_under_subpath("Io/Channels/3");
        let ids: Vec<u32> = under.iter().map(|i| coll.by_index(*i).id.id).collect();
        assert!(ids.contains(&61));
        assert!(ids.contains(&60));
    }
}
