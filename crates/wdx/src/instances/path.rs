// SPDX-License-Identifier: MPL-2.0

//! Parameter paths and the case-insensitive path lookup tree.
//!
//! Request paths have the form `class_base_path/instance_id/parameter_path`.
//! The tree stores the instance id as the *deepest* segment
//! (`class_base_path/parameter_path/instance_id`) so parameter-definition
//! paths are shared between instances. Lookups defer a numeric segment and
//! re-apply it as the final step, falling back to the dynamic placeholder
//! node when the concrete instance is not materialized.

use std::collections::BTreeMap;

use crate::model::types::DYNAMIC_PLACEHOLDER_INSTANCE_ID;

/// Segment separator inside parameter paths.
pub const PATH_DELIMITER: char = '/';

/// Joins path fragments, skipping empty ones.
pub fn join_path(parts: &[&str]) -> String {
    let mut joined = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push(PATH_DELIMITER);
        }
        joined.push_str(part);
    }
    joined
}

/// Splits a path into its segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_DELIMITER).filter(|s| !s.is_empty())
}

/// Extracts the instance number from a request path: the last inner
/// all-digit segment.
pub fn instance_number_in_path(path: &str) -> Option<u16> {
    let segments: Vec<&str> = path.split(PATH_DELIMITER).collect();
    if segments.len() < 3 {
        return None;
    }
    segments[1..segments.len() - 1]
        .iter()
        .rev()
        .find(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
}

#[derive(Debug)]
pub struct PathNode<T> {
    value: Option<T>,
    /// Children keyed by case-folded segment; the map keeps lookups
    /// insertion-order independent.
    children: BTreeMap<String, PathNode<T>>,
}

impl<T: Copy> PathNode<T> {
    fn new() -> Self {
        PathNode {
            value: None,
            children: BTreeMap::new(),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.value
    }

    fn child(&self, segment: &str) -> Option<&PathNode<T>> {
        self.children.get(&segment.to_ascii_lowercase())
    }

    fn child_or_insert(&mut self, segment: &str) -> &mut PathNode<T> {
        self.children
            .entry(segment.to_ascii_lowercase())
            .or_insert_with(PathNode::new)
    }
}

/// Case-insensitive path tree.
#[derive(Debug)]
pub struct PathTree<T> {
    root: PathNode<T>,
}

impl<T: Copy> PathTree<T> {
    pub fn new() -> Self {
        PathTree {
            root: PathNode::new(),
        }
    }

    /// Stores `value` at `path` (no segment deferral on insertion).
    pub fn add_value(&mut self, path: &str, value: T) {
        let mut node = &mut self.root;
        for segment in path_segments(path) {
            node = node.child_or_insert(segment);
        }
        node.value = Some(value);
    }

    /// Resolves a request path to a stored value, applying the numeric
    /// deferral rule and the placeholder fallback.
    pub fn get_value(&self, path: &str) -> Option<T> {
        let mut visited = Vec::new();
        self.node_under_path(path, &mut visited, false)
            .and_then(PathNode::value)
    }

    /// Walks `path`, recording the values of visited intermediate nodes.
    /// A numeric segment is deferred and applied as the deepest step; when
    /// the concrete instance node is absent the placeholder node is tried,
    /// and with `back_on_dead_end` the walk settles on the parent node.
    pub fn node_under_path(
        &self,
        path: &str,
        visited_values: &mut Vec<T>,
        back_on_dead_end: bool,
    ) -> Option<&PathNode<T>> {
        let mut node = &self.root;
        let mut instance_segment: Option<&str> = None;

        for segment in path_segments(path) {
            if segment.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                instance_segment = Some(segment);
                continue;
            }
            match node.child(segment) {
                Some(next) => {
                    if let Some(value) = node.value {
                        visited_values.push(value);
                    }
                    node = next;
                }
                None => return None,
            }
        }

        match instance_segment {
            None => Some(node),
            Some(instance) => {
                let concrete = node.child(instance);
                let fallback = || node.child(&DYNAMIC_PLACEHOLDER_INSTANCE_ID.to_string());
                match concrete.or_else(fallback) {
                    Some(last) => Some(last),
                    None if back_on_dead_end => Some(node),
                    None => None,
                }
            }
        }
    }

    /// Collects every value stored below `node` (inclusive).
    pub fn gather_values(node: &PathNode<T>, gathered: &mut Vec<T>) {
        if let Some(value) = node.value {
            gathered.push(value);
        }
        for child in node.children.values() {
            Self::gather_values(child, gathered);
        }
    }
}

impl<T: Copy> Default for PathTree<T> {
    fn default() -> Self {
        PathTree::new()
    }
}
