//! Field-level fallback
//!
//! A fetched block that is missing a field the page expects gets that one
//! field from the default block instead of discarding the whole fetch.

use serde_json::Value;

use crate::store::ContentBlock;

/// Overlay `fetched` on `defaults`.
///
/// A default field is used when the fetched field is absent, `null`, or of a
/// different JSON kind. Objects present on both sides are merged
/// recursively. Fetched fields with no default are kept as-is.
///
/// Returns the merged block and the dotted paths of every field taken from
/// `defaults`.
pub fn merge_with_defaults(
    fetched: &ContentBlock,
    defaults: &ContentBlock,
) -> (ContentBlock, Vec<String>) {
    let mut filled = Vec::new();
    let merged = merge_into(fetched, defaults, "", &mut filled);
    filled.sort();
    (merged, filled)
}

fn merge_into(
    fetched: &ContentBlock,
    defaults: &ContentBlock,
    prefix: &str,
    filled: &mut Vec<String>,
) -> ContentBlock {
    let mut merged = fetched.clone();

    for (name, default) in defaults {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        match (fetched.get(name), default) {
            (Some(Value::Object(have)), Value::Object(want)) => {
                let nested = merge_into(have, want, &path, filled);
                merged.insert(name.clone(), Value::Object(nested));
            }
            (Some(have), want) if !have.is_null() && same_kind(have, want) => {}
            // A null default expresses no expectation about the field
            (have, Value::Null) => {
                if have.is_none() {
                    merged.insert(name.clone(), Value::Null);
                }
            }
            (_, want) => {
                merged.insert(name.clone(), want.clone());
                filled.push(path);
            }
        }
    }

    merged
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
