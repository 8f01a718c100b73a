//! Role-based permission evaluation with per-user deep-merge overrides (C6).
//!
//! The permission tree is a recursive sum type: a leaf boolean or a branch
//! mapping names to further nodes. Roles carry a baseline tree; users may
//! carry a `custom_permissions` tree that is deep-merged over it, leaf by
//! leaf, before any lookup happens.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a permission tree: either a boolean leaf or a nested branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionNode {
    Leaf(bool),
    Branch(BTreeMap<String, PermissionNode>),
}

impl PermissionNode {
    fn as_branch(&self) -> Option<&BTreeMap<String, PermissionNode>> {
        match self {
            PermissionNode::Branch(map) => Some(map),
            PermissionNode::Leaf(_) => None,
        }
    }
}

/// The sentinel permission that short-circuits every check to `allow`.
pub const ADMIN_ALL: &str = "admin:has_all_permissions";

/// Deep-merge `override_tree` onto `base`, recursively.
///
/// At every key, the override wins: a leaf overrides a branch and vice
/// versa. Keys present only in `base` are kept; keys present only in
/// `override_tree` are added.
pub fn deep_merge(base: &PermissionNode, override_tree: &PermissionNode) -> PermissionNode {
    match (base, override_tree) {
        (PermissionNode::Branch(base_map), PermissionNode::Branch(override_map)) => {
            let mut merged = base_map.clone();
            for (key, override_value) in override_map {
                match merged.get(key) {
                    Some(base_value) => {
                        merged.insert(key.clone(), deep_merge(base_value, override_value));
                    }
                    None => {
                        merged.insert(key.clone(), override_value.clone());
                    }
                }
            }
            PermissionNode::Branch(merged)
        }
        // Scalars replace sub-maps and vice versa: the override always wins outright.
        (_, other) => other.clone(),
    }
}

/// Merge a role's baseline tree with a user's optional override tree.
pub fn effective_permissions(
    role: &PermissionNode,
    overrides: Option<&PermissionNode>,
) -> PermissionNode {
    match overrides {
        Some(overrides) => deep_merge(role, overrides),
        None => role.clone(),
    }
}

fn lookup_leaf(tree: &PermissionNode, path: &[&str]) -> Option<bool> {
    let mut node = tree;
    for segment in path {
        let branch = node.as_branch()?;
        node = branch.get(*segment)?;
    }
    match node {
        PermissionNode::Leaf(value) => Some(*value),
        PermissionNode::Branch(_) => None,
    }
}

/// Evaluate `permission_name` against an effective permission tree.
///
/// `permission_name` is either a bare top-level key (`"reader"`) or a
/// `section:action` pair. The `page` section is special-cased to a flat
/// `page:<action>` top-level key rather than a nested `page.<action>` path,
/// matching the on-disk shape of page-visibility permissions.
pub fn check(effective: &PermissionNode, permission_name: &str) -> bool {
    if lookup_leaf(effective, &[ADMIN_ALL]).unwrap_or(false) {
        return true;
    }

    match permission_name.split_once(':') {
        Some(("page", action)) => {
            let flat_key = format!("page:{action}");
            lookup_leaf(effective, &[&flat_key]).unwrap_or(false)
        }
        Some((section, action)) => lookup_leaf(effective, &[section, action]).unwrap_or(false),
        None => lookup_leaf(effective, &[permission_name]).unwrap_or(false),
    }
}

/// Full evaluation: deny unauthenticated users, otherwise merge and check.
pub fn has_permission(
    role: &PermissionNode,
    overrides: Option<&PermissionNode>,
    permission_name: &str,
) -> bool {
    let effective = effective_permissions(role, overrides);
    check(&effective, permission_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(pairs: &[(&str, PermissionNode)]) -> PermissionNode {
        PermissionNode::Branch(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn leaf(b: bool) -> PermissionNode {
        PermissionNode::Leaf(b)
    }

    #[test]
    fn deep_merge_identity_laws() {
        let x = branch(&[("control", branch(&[("alert_trigger_any", leaf(true))]))]);
        let empty = branch(&[]);

        assert_eq!(deep_merge(&x, &empty), x);
        assert_eq!(deep_merge(&empty, &x), x);
        assert_eq!(deep_merge(&x, &x), x);
    }

    #[test]
    fn scenario_3_permission_deep_merge() {
        let role = branch(&[(
            "control",
            branch(&[
                ("alert_trigger_any", leaf(true)),
                ("alert_trigger_ppms", leaf(false)),
            ]),
        )]);
        let user_override = branch(&[("control", branch(&[("alert_trigger_ppms", leaf(true))]))]);

        assert!(has_permission(
            &role,
            Some(&user_override),
            "control:alert_trigger_ppms"
        ));
        assert!(has_permission(
            &role,
            Some(&user_override),
            "control:alert_trigger_any"
        ));
    }

    #[test]
    fn admin_sentinel_allows_everything() {
        let role = branch(&[(ADMIN_ALL, leaf(true))]);
        assert!(has_permission(&role, None, "control:alert_trigger_any"));
        assert!(has_permission(&role, None, "anything:at_all"));
        assert!(has_permission(&role, None, "reader"));
    }

    #[test]
    fn missing_key_denies() {
        let role = branch(&[("control", branch(&[]))]);
        assert!(!has_permission(&role, None, "control:alert_trigger_any"));
        assert!(!has_permission(&role, None, "unknown"));
    }

    #[test]
    fn page_section_uses_flat_key() {
        let role = branch(&[("page:admin", leaf(true))]);
        assert!(has_permission(&role, None, "page:admin"));
    }

    #[test]
    fn override_leaf_replaces_branch() {
        let role = branch(&[("control", branch(&[("x", leaf(true))]))]);
        let overrides = branch(&[("control", leaf(false))]);
        let merged = deep_merge(&role, &overrides);
        assert_eq!(merged, branch(&[("control", leaf(false))]));
    }
}
