// SPDX-License-Identifier: MPL-2.0

//! Override precedence in complex class hierarchies.
//!
//! The O / A / B,C / D diamond:
//!
//! ```text
//!       O
//!       |
//!       A
//!      / \
//!     B   C
//!    /|  /
//!   D-X /
//!    \ /
//!     X
//! ```
//!
//! Rules: (1) overrides in a more specific class win; (2) among unrelated
//! classes the one listed earlier in `Includes` wins; (3) rule 1 beats
//! rule 2; (4) `AdditionalClasses` behave as if appended to the primary
//! class's includes; (5) WDD-global overrides beat 1-3; (6) WDD per-instance
//! overrides beat 1-4.

use wdx::instances::Device;
use wdx::loader::DeviceModelLoader;
use wdx::model::{DeviceId, DeviceModel, ParameterValue};

const TEST_WDM: &str = r#"
{
    "Name": "Test",
    "WDMMVersion": "1.0.0",
    "Features": [
        {
            "ID": "ClassHierarchyWithOverrides",
            "Classes": ["O", "A", "B", "C", "D", "X_CD", "X_DC", "X_BD", "X_DB"]
        }
    ],
    "Classes": [
        {
            "ID": "O",
            "BaseID": 1,
            "BasePath": "Tests",
            "Parameters": [
                {
                    "ID": 11,
                    "Path": "Param",
                    "Type": "String",
                    "DefaultValue": "O",
                    "Pattern": "O"
                }
            ]
        },
        {
            "ID": "A",
            "Includes": ["O"],
            "Overrides": [
                { "ID": 11, "DefaultValue": "A", "Pattern": "A" }
            ]
        },
        {
            "ID": "B",
            "Includes": ["A"],
            "Overrides": [
                { "ID": 11, "DefaultValue": "B" }
            ]
        },
        {
            "ID": "C",
            "Includes": ["A"],
            "Overrides": [
                { "ID": 11, "DefaultValue": "C", "Pattern": "C" }
            ]
        },
        {
            "ID": "D",
            "Includes": ["B"],
            "Overrides": [
                { "ID": 11, "DefaultValue": "D" }
            ]
        },
        { "ID": "X_A", "Includes": ["A"] },
        { "ID": "X_B", "Includes": ["B"] },
        { "ID": "X_CD", "Includes": ["C", "D"] },
        { "ID": "X_DC", "Includes": ["D", "C"] },
        { "ID": "X_BD", "Includes": ["B", "D"] },
        { "ID": "X_DB", "Includes": ["D", "B"] }
    ]
}
"#;

const TEST_WDD: &str = r#"
{
    "WDMMVersion": "1.0.0",
    "ModelReference": "Test",
    "Features": [ "ClassHierarchyWithOverrides" ],
    "Instantiations": [
        { "Class": "O", "Instances": [ { "ID": 1 } ] },
        { "Class": "A", "Instances": [ { "ID": 2 } ] },
        { "Class": "B", "Instances": [ { "ID": 3 } ] },
        { "Class": "C", "Instances": [ { "ID": 4 } ] },
        { "Class": "D", "Instances": [ { "ID": 5 } ] },
        { "Class": "X_A", "Instances": [ { "ID": 6 } ] },
        { "Class": "X_B", "Instances": [ { "ID": 7 } ] },
        { "Class": "X_CD", "Instances": [ { "ID": 8 } ] },
        { "Class": "X_DC", "Instances": [ { "ID": 9 } ] },
        { "Class": "X_BD", "Instances": [ { "ID": 10 } ] },
        { "Class": "X_DB", "Instances": [ { "ID": 11 } ] },
        { "Class": "O", "AdditionalClasses": ["A"], "Instances": [ { "ID": 12 } ] },
        { "Class": "O", "AdditionalClasses": ["B"], "Instances": [ { "ID": 13 } ] },
        { "Class": "O", "AdditionalClasses": ["C", "D"], "Instances": [ { "ID": 14 } ] },
        { "Class": "O", "AdditionalClasses": ["D", "C"], "Instances": [ { "ID": 15 } ] },
        { "Class": "O", "AdditionalClasses": ["B", "D"], "Instances": [ { "ID": 16 } ] },
        { "Class": "O", "AdditionalClasses": ["D", "B"], "Instances": [ { "ID": 17 } ] },
        { "Class": "A", "AdditionalClasses": ["B"], "Instances": [ { "ID": 18 } ] },
        { "Class": "A", "AdditionalClasses": ["C"], "Instances": [ { "ID": 19 } ] },
        { "Class": "B", "AdditionalClasses": ["A"], "Instances": [ { "ID": 20 } ] },
        { "Class": "C", "AdditionalClasses": ["A"], "Instances": [ { "ID": 21 } ] },
        {
            "Class": "O",
            "Instances": [
                {
                    "ID": 22,
                    "Overrides": [ { "ID": 11, "DefaultValue": "I" } ]
                }
            ]
        },
        {
            "Class": "O",
            "AdditionalClasses": ["A"],
            "Instances": [
                {
                    "ID": 23,
                    "Overrides": [ { "ID": 11, "DefaultValue": "I" } ]
                }
            ]
        },
        {
            "Class": "A",
            "Instances": [
                {
                    "ID": 24,
                    "Overrides": [ { "ID": 11, "DefaultValue": "I" } ]
                }
            ]
        }
    ]
}
"#;

fn loaded_device() -> (DeviceModel, Device) {
    let mut model = DeviceModel::new();
    DeviceModelLoader::load(TEST_WDM, &mut model).expect("WDM loads");
    let mut device = Device::new(DeviceId::head_station(), "0123-4567", "01.23.45");
    device.add_wdd(TEST_WDD, &model).expect("WDD loads");
    (model, device)
}

fn assert_overrides(device: &mut Device, instance: u16, default: &str, pattern: &str) {
    let path = format!("Tests/{instance}/Param");
    let found = device
        .parameter_instances
        .get_instance_by_path(&path)
        .unwrap_or_else(|| panic!("instance at {path}"));
    assert_eq!(
        found.definition.overrideables.default_value,
        Some(ParameterValue::String(default.into())),
        "default of {path}"
    );
    assert_eq!(
        found.definition.overrideables.pattern.as_deref(),
        Some(pattern),
        "pattern of {path}"
    );
}

#[test]
fn test_single_class_instances() {
    let (_model, mut device) = loaded_device();
    assert_overrides(&mut device, 1, "O", "O");
    assert_overrides(&mut device, 2, "A", "A");
    assert_overrides(&mut device, 3, "B", "A");
    assert_overrides(&mut device, 4, "C", "C");
    assert_overrides(&mut device, 5, "D", "A");
}

#[test]
fn test_single_inheritance_without_own_overrides() {
    let (_model, mut device) = loaded_device();
    assert_overrides(&mut device, 6, "A", "A");
    assert_overrides(&mut device, 7, "B", "A");
}

#[test]
fn test_diamond_includes_order() {
    let (_model, mut device) = loaded_device();
    // unrelated C and D: include order decides the default, C beats its
    // ancestor A for the pattern
    assert_overrides(&mut device, 8, "C", "C");
    assert_overrides(&mut device, 9, "D", "C");
    // D derives from B: specificity beats include order
    assert_overrides(&mut device, 10, "D", "A");
    assert_overrides(&mut device, 11, "D", "A");
}

#[test]
fn test_additional_classes_extend_the_chain() {
    let (_model, mut device) = loaded_device();
    assert_overrides(&mut device, 12, "A", "A");
    assert_overrides(&mut device, 13, "B", "A");
    assert_overrides(&mut device, 14, "C", "C");
    assert_overrides(&mut device, 15, "D", "C");
    assert_overrides(&mut device, 16, "D", "A");
    assert_overrides(&mut device, 17, "D", "A");
    assert_overrides(&mut device, 18, "B", "A");
    assert_overrides(&mut device, 19, "C", "C");
    assert_overrides(&mut device, 20, "B", "A");
    assert_overrides(&mut device, 21, "C", "C");
}

#[test]
fn test_instance_overrides_beat_class_resolution() {
    let (_model, mut device) = loaded_device();
    assert_overrides(&mut device, 22, "I", "O");
    assert_overrides(&mut device, 23, "I", "A");
    assert_overrides(&mut device, 24, "I", "A");
}

#[test]
fn test_instances_are_addressable_by_id_and_path() {
    let (_model, mut device) = loaded_device();
    let by_id = device
        .parameter_instances
        .get_instance(&wdx::model::ParameterInstanceId::new(
            11,
            1,
            DeviceId::head_station(),
        ))
        .expect("by id")
        .id;
    let by_path = device
        .parameter_instances
        .get_instance_by_path("Tests/1/Param")
        .expect("by path")
        .id;
    assert_eq!(by_id, by_path);
}
