//! Schema inferrer (`TypeChooser`): turns the per-field [`Counts`]
//! accumulated in pass 1 into an ordered list of [`ColumnSpec`]s.

use crate::identifiers::normalize_field_name;
use crate::staging::record::Counts;
use std::collections::HashMap;

/// The SQL type a column is created with. `Id` and `Varchar` share a
/// physical representation (`VARCHAR(36)` / `VARCHAR(65535)` respectively)
/// but are kept distinct so the loading name-mapper and documentation can
/// tell "this looks like an identifier" apart from "this is free text".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Bigint,
    Numeric,
    Timestamptz,
    Id,
    Varchar,
}

impl ColumnType {
    pub fn ddl_type(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Bigint => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Timestamptz => "TIMESTAMPTZ",
            ColumnType::Id => "VARCHAR(36)",
            ColumnType::Varchar => "VARCHAR(65535)",
        }
    }
}

/// A single inferred column: its loading-table name, the source JSON field
/// it is populated from, and its chosen type. `source_field_name` is the
/// raw (pre-normalization) field name, since that's the key the scanner's
/// [`CanonicalRecord`](crate::staging::scanner::CanonicalRecord) is indexed
/// by.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub column_name: String,
    pub source_field_name: String,
    pub column_type: ColumnType,
}

/// Deterministic type inference over a field's pass-1 [`Counts`], applying
/// the eight-rule table in order with first-match-wins semantics:
///
/// 1. `uuid == string`, `string > 0`, no number/boolean/datetime -> `Id`.
/// 2. `datetime == string`, `string > 0`, no number/boolean/uuid -> `Timestamptz`.
/// 3. `boolean > 0`, `string == 0`, `number == 0` -> `Boolean`.
/// 4. `number > 0`, `string == 0`, `boolean == 0`, `floating == 0` -> `Bigint`.
/// 5. `number > 0`, `string == 0`, `boolean == 0` -> `Numeric`.
/// 6. `string > 0` -> `Varchar`.
/// 7. Only `null` observed -> the field is dropped (no column).
/// 8. Anything else (mixed types) -> `Varchar`, the safe fallback.
pub struct TypeChooser;

impl TypeChooser {
    /// Build the ordered column list for a table from its pass-1 counts.
    /// Columns are ordered by source field name, lexicographically; the
    /// field literally named `id` is never turned into a column here, since
    /// every loading table already carries an implicit
    /// `id VARCHAR(36) NOT NULL` column emitted by the stager.
    pub fn choose(counts: &HashMap<String, Counts>) -> Vec<ColumnSpec> {
        let mut fields: Vec<&String> = counts.keys().filter(|f| f.as_str() != "id").collect();
        fields.sort();

        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let c = &counts[field];
            if let Some(column_type) = Self::type_for(c) {
                columns.push(ColumnSpec {
                    column_name: normalize_field_name(field),
                    source_field_name: field.clone(),
                    column_type,
                });
            }
        }
        columns
    }

    fn type_for(c: &Counts) -> Option<ColumnType> {
        // Rule 7: nothing but null observed for this field.
        if c.boolean == 0 && c.number == 0 && c.string == 0 {
            return None;
        }
        // Rule 1.
        if c.string > 0 && c.uuid == c.string && c.number == 0 && c.boolean == 0 && c.datetime == 0
        {
            return Some(ColumnType::Id);
        }
        // Rule 2.
        if c.string > 0
            && c.datetime == c.string
            && c.number == 0
            && c.boolean == 0
            && c.uuid == 0
        {
            return Some(ColumnType::Timestamptz);
        }
        // Rule 3.
        if c.boolean > 0 && c.string == 0 && c.number == 0 {
            return Some(ColumnType::Boolean);
        }
        // Rule 4.
        if c.number > 0 && c.string == 0 && c.boolean == 0 && c.floating == 0 {
            return Some(ColumnType::Bigint);
        }
        // Rule 5.
        if c.number > 0 && c.string == 0 && c.boolean == 0 {
            return Some(ColumnType::Numeric);
        }
        // Rule 6.
        if c.string > 0 {
            return Some(ColumnType::Varchar);
        }
        // Rule 8: mixed types with no single-type rule matching above.
        Some(ColumnType::Varchar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(f: impl Fn(&mut Counts)) -> Counts {
        let mut c = Counts::default();
        f(&mut c);
        c
    }

    #[test]
    fn all_null_field_is_skipped() {
        let mut m = HashMap::new();
        m.insert("x".to_string(), counts(|c| c.null = 3));
        assert!(TypeChooser::choose(&m).is_empty());
    }

    #[test]
    fn pure_boolean_field_becomes_boolean() {
        let mut m = HashMap::new();
        m.insert("flag".to_string(), counts(|c| c.boolean = 3));
        let cols = TypeChooser::choose(&m);
        assert_eq!(cols[0].column_type, ColumnType::Boolean);
    }

    #[test]
    fn uuid_strings_become_id_type() {
        let mut m = HashMap::new();
        m.insert(
            "ref".to_string(),
            counts(|c| {
                c.string = 3;
                c.uuid = 3;
            }),
        );
        let cols = TypeChooser::choose(&m);
        assert_eq!(cols[0].column_type, ColumnType::Id);
    }

    #[test]
    fn integers_without_floats_become_bigint() {
        let mut m = HashMap::new();
        m.insert(
            "n".to_string(),
            counts(|c| {
                c.number = 3;
                c.integer = 3;
            }),
        );
        assert_eq!(TypeChooser::choose(&m)[0].column_type, ColumnType::Bigint);
    }

    #[test]
    fn any_float_observation_promotes_to_numeric() {
        let mut m = HashMap::new();
        m.insert(
            "n".to_string(),
            counts(|c| {
                c.number = 3;
                c.integer = 2;
                c.floating = 1;
            }),
        );
        assert_eq!(TypeChooser::choose(&m)[0].column_type, ColumnType::Numeric);
    }

    #[test]
    fn datetime_strings_become_timestamptz() {
        let mut m = HashMap::new();
        m.insert(
            "created_at".to_string(),
            counts(|c| {
                c.string = 3;
                c.datetime = 3;
            }),
        );
        assert_eq!(
            TypeChooser::choose(&m)[0].column_type,
            ColumnType::Timestamptz
        );
    }

    #[test]
    fn mixed_types_fall_back_to_varchar() {
        let mut m = HashMap::new();
        m.insert(
            "mixed".to_string(),
            counts(|c| {
                c.number = 1;
                c.integer = 1;
                c.string = 2;
            }),
        );
        assert_eq!(TypeChooser::choose(&m)[0].column_type, ColumnType::Varchar);
    }

    #[test]
    fn field_literally_named_id_is_excluded() {
        let mut m = HashMap::new();
        m.insert("id".to_string(), counts(|c| c.string = 3));
        m.insert("name".to_string(), counts(|c| c.string = 3));
        let cols = TypeChooser::choose(&m);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].source_field_name, "name");
    }

    #[test]
    fn columns_are_ordered_lexicographically_by_source_field() {
        let mut m = HashMap::new();
        m.insert("zeta".to_string(), counts(|c| c.string = 1));
        m.insert("alpha".to_string(), counts(|c| c.string = 1));
        let cols = TypeChooser::choose(&m);
        let names: Vec<&str> = cols.iter().map(|c| c.source_field_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
