//! Field-name normalization and loading-name mapping.
//!
//! These are the two "external collaborator" contracts the core staging
//! pipeline depends on but does not own: turning a JSON field name into a
//! legal, unquoted SQL identifier, and turning a published table name into
//! the transient name its loading table is created under.

const LOADING_SUFFIX: &str = "_loading";

/// Normalize a JSON field name into a legal unquoted SQL identifier:
/// lowercase, non `[a-z0-9_]` bytes become `_`, runs of `_` collapse to one,
/// and a name starting with a digit gets a `_` prefix.
pub fn normalize_field_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut last_was_underscore = false;

    for ch in field.chars() {
        let lower = ch.to_ascii_lowercase();
        let mapped = if lower.is_ascii_alphanumeric() { lower } else { '_' };

        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }

    let out = out.trim_matches('_');
    let mut out = out.to_string();
    if out.is_empty() {
        out.push_str("field");
    }
    if out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// Deterministic, collision-free mapping from a published table name to its
/// transient loading-table name.
pub fn loading_name(table_name: &str) -> String {
    format!("{table_name}{LOADING_SUFFIX}")
}

/// A catalog table name must never itself carry the loading suffix, or
/// `loading_name` could collide with a published table from another entry.
pub fn is_valid_published_name(table_name: &str) -> bool {
    !table_name.ends_with(LOADING_SUFFIX)
}
