// Variable store
//
// Arena of lazily-expandable variable references. Clients hold the i64
// handles across events, so handles are append-only and never reused
// within a session; entry 0 is the reserved "no variables" sentinel.

use crate::protocol::Variable;
use inspector_client::types::RemoteObject;

/// Handle for a `variablesReference`; 0 means "not expandable".
pub const NO_VARIABLES: i64 = 0;

#[derive(Debug, Clone)]
pub enum VariablesEntry {
    /// Sentinel: nothing to expand.
    Empty,
    /// Fully materialized children, served directly with pagination.
    List(Vec<Variable>),
    /// A live object whose children are fetched from the inspector on
    /// first expansion.
    Object(RemoteObject),
}

#[derive(Debug)]
pub struct VariableStore {
    entries: Vec<VariablesEntry>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            entries: vec![VariablesEntry::Empty],
        }
    }

    /// Drop everything except the sentinel. Handles handed out before a
    /// reset dangle by design; lookups for them return the sentinel.
    pub fn reset(&mut self) {
        self.entries.truncate(1);
    }

    pub fn insert_list(&mut self, variables: Vec<Variable>) -> i64 {
        self.entries.push(VariablesEntry::List(variables));
        (self.entries.len() - 1) as i64
    }

    pub fn insert_object(&mut self, object: RemoteObject) -> i64 {
        self.entries.push(VariablesEntry::Object(object));
        (self.entries.len() - 1) as i64
    }

    pub fn get(&self, reference: i64) -> &VariablesEntry {
        usize::try_from(reference)
            .ok()
            .and_then(|index| self.entries.get(index))
            .unwrap_or(&VariablesEntry::Empty)
    }

    /// Reference for a remote value: an arena slot when the value is
    /// expandable, the sentinel otherwise.
    pub fn reference_for(&mut self, object: &RemoteObject) -> i64 {
        if object.is_expandable() {
            self.insert_object(object.clone())
        } else {
            NO_VARIABLES
        }
    }
}

/// Build the flattened view of one remote value.
pub fn variable_for(store: &mut VariableStore, name: String, object: &RemoteObject) -> Variable {
    let variables_reference = store.reference_for(object);

    // Array-likes report how many indexed children exist so clients can
    // page instead of expanding everything.
    let indexed_variables = object
        .size
        .filter(|_| object.subtype.as_deref() == Some("array"));
    let named_variables = object.size.filter(|_| object.is_collection());

    Variable {
        name,
        value: object.display(),
        type_name: Some(type_label(object)),
        variables_reference,
        indexed_variables,
        named_variables,
    }
}

fn type_label(object: &RemoteObject) -> String {
    match (&object.subtype, &object.class_name) {
        (Some(subtype), _) => subtype.clone(),
        (None, Some(class_name)) => class_name.clone(),
        (None, None) => object.object_type.clone(),
    }
}

/// An empty, non-expandable result value (used when an evaluation result
/// is deliberately suppressed).
pub fn empty_variable(name: String) -> Variable {
    Variable {
        name,
        value: String::new(),
        type_name: None,
        variables_reference: NO_VARIABLES,
        indexed_variables: None,
        named_variables: None,
    }
}

// Visibility tiers for the display order comparator.
const TIER_NORMAL: u8 = 0;
const TIER_INTERNAL: u8 = 1;
const TIER_PROTOTYPE: u8 = 2;

fn visibility_tier(name: &str) -> u8 {
    if name == "__proto__" || name == "[[Prototype]]" || name == "prototype" {
        TIER_PROTOTYPE
    } else if name.starts_with('_') || name.starts_with('#') {
        TIER_INTERNAL
    } else {
        TIER_NORMAL
    }
}

fn numeric_name(name: &str) -> Option<u64> {
    // Only plain non-negative integers count as indexes.
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Sort variables for display: normal names before internal/private ones,
/// prototype links last; within a tier, integer-like names ascend
/// numerically ahead of everything else, and remaining ties keep
/// insertion order (stable sort).
pub fn sort_variables(variables: &mut [Variable]) {
    variables.sort_by(|a, b| {
        let tiers = visibility_tier(&a.name).cmp(&visibility_tier(&b.name));
        if tiers != std::cmp::Ordering::Equal {
            return tiers;
        }

        match (numeric_name(&a.name), numeric_name(&b.name)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> Variable {
        empty_variable(name.to_string())
    }

    fn names(variables: &[Variable]) -> Vec<&str> {
        variables.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_sentinel_and_handle_growth() {
        let mut store = VariableStore::new();
        assert!(matches!(store.get(NO_VARIABLES), VariablesEntry::Empty));

        let first = store.insert_list(vec![named("a")]);
        let second = store.insert_list(vec![named("b")]);
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        // Out-of-range and negative references degrade to the sentinel.
        assert!(matches!(store.get(99), VariablesEntry::Empty));
        assert!(matches!(store.get(-1), VariablesEntry::Empty));
    }

    #[test]
    fn test_reset_truncates_to_sentinel() {
        let mut store = VariableStore::new();
        store.insert_list(vec![named("a")]);
        store.reset();

        assert!(matches!(store.get(1), VariablesEntry::Empty));
        // Post-reset handles restart right after the sentinel.
        assert_eq!(store.insert_list(vec![named("b")]), 1);
    }

    #[test]
    fn test_reference_for_expandable_only() {
        let mut store = VariableStore::new();

        let number: RemoteObject = serde_json::from_value(json!({
            "type": "number", "value": 3, "description": "3"
        }))
        .unwrap();
        assert_eq!(store.reference_for(&number), NO_VARIABLES);

        let object: RemoteObject = serde_json::from_value(json!({
            "type": "object", "objectId": "obj:1", "className": "Object"
        }))
        .unwrap();
        assert!(store.reference_for(&object) > 0);
    }

    #[test]
    fn test_sort_numeric_before_named_proto_last() {
        let mut variables: Vec<Variable> =
            ["10", "2", "__proto__", "x"].iter().map(|n| named(n)).collect();

        sort_variables(&mut variables);

        assert_eq!(names(&variables), vec!["2", "10", "x", "__proto__"]);
    }

    #[test]
    fn test_sort_visibility_tiers() {
        let mut variables: Vec<Variable> = ["_hidden", "b", "#secret", "a", "__proto__"]
            .iter()
            .map(|n| named(n))
            .collect();

        sort_variables(&mut variables);

        // Insertion order inside each tier is preserved.
        assert_eq!(
            names(&variables),
            vec!["b", "a", "_hidden", "#secret", "__proto__"]
        );
    }

    #[test]
    fn test_collection_counts() {
        let mut store = VariableStore::new();

        let map: RemoteObject = serde_json::from_value(json!({
            "type": "object", "subtype": "map", "objectId": "obj:2",
            "description": "Map(2)", "size": 2
        }))
        .unwrap();

        let variable = variable_for(&mut store, "cache".to_string(), &map);
        assert_eq!(variable.value, "Map(2)");
        assert_eq!(variable.named_variables, Some(2));
        assert_eq!(variable.indexed_variables, None);
        assert!(variable.variables_reference > 0);
    }
}
