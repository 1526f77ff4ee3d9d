//! Columnar sort-key inference.
//!
//! The columnar store requires an ORDER BY clause on every table. When a
//! declaration does not provide one, a deterministic ordering is chosen from
//! the declared fields: the best time field first (analytics tables are
//! usually time-ordered), then low-cardinality categorical identifiers, then
//! any required field, and finally the leading declared fields as a last
//! resort.

use crate::field::{FieldDef, FieldKind, StorageClass};

const TIME_NAME_HINTS: [&str; 6] = ["created", "updated", "collected", "timestamp", "time", "date"];
const CATEGORICAL_NAME_HINTS: [&str; 8] = [
    "id", "key", "name", "code", "type", "category", "brand", "seller",
];

pub(crate) fn infer_order_by(fields: &[(String, FieldDef)]) -> Vec<String> {
    let mut time_fields: Vec<(i8, &str)> = Vec::new();
    let mut categorical: Vec<(i8, &str)> = Vec::new();
    let mut required: Vec<&str> = Vec::new();

    for (name, def) in fields {
        // materialized columns cannot participate in the sort key
        if def.materialized_expr().is_some() {
            continue;
        }

        let lower = name.to_lowercase();
        match def.kind() {
            FieldKind::DateTime => {
                let priority = if TIME_NAME_HINTS.iter().any(|hint| lower.contains(hint)) {
                    -1
                } else {
                    0
                };
                time_fields.push((priority, name));
            }
            FieldKind::Text if def.is_required() => {
                if CATEGORICAL_NAME_HINTS.iter().any(|hint| lower.contains(hint)) {
                    let priority = match def.storage() {
                        StorageClass::LowCardinality => 0,
                        StorageClass::Plain => 1,
                    };
                    categorical.push((priority, name));
                } else {
                    required.push(name);
                }
            }
            _ if def.is_required() => required.push(name),
            _ => {}
        }
    }

    // stable sorts keep declaration order inside each priority band
    time_fields.sort_by_key(|(priority, _)| *priority);
    categorical.sort_by_key(|(priority, _)| *priority);

    let mut order_by: Vec<String> = Vec::new();

    if let Some((_, best_time)) = time_fields.first() {
        order_by.push((*best_time).to_string());
        if let Some((_, best_categorical)) = categorical.first() {
            order_by.push((*best_categorical).to_string());
        }
    } else if !categorical.is_empty() {
        for (_, name) in categorical.iter().take(2) {
            order_by.push((*name).to_string());
        }
    } else if let Some(first_required) = required.first() {
        order_by.push((*first_required).to_string());
    }

    if order_by.is_empty() {
        order_by = fields
            .iter()
            .filter(|(_, def)| def.materialized_expr().is_none())
            .take(3)
            .map(|(name, _)| name.clone())
            .collect();
    }

    order_by
}
