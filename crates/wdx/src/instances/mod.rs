// SPDX-License-Identifier: MPL-2.0

//! Per-device instance store: devices, parameter instances, the
//! case-insensitive path tree and the dynamic-instance cache.

pub mod collection;
pub mod device;
pub mod instance;
pub mod path;

pub use collection::{DynamicCachePolicy, ParameterInstanceCollection};
pub use device::Device;
pub use instance::{find_value_declaration, ParameterInstance, ValueDeclaration};
pub use path::{instance_number_in_path, join_path, PathTree, PATH_DELIMITER};
