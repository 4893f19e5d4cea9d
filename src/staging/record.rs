//! Per-record processor (`RecordProcessor`): pass 1 collects per-field type
//! statistics into [`Counts`]; pass 2 emits one tuple per record into an
//! [`InsertBatcher`].

use serde_json::Value;
use std::collections::HashMap;

use crate::db;
use crate::staging::batch::InsertBatcher;
use crate::staging::scanner::{CanonicalRecord, RecordHandler};
use crate::staging::schema::{ColumnSpec, ColumnType};

/// Per-field observation histogram accumulated across every record in pass
/// 1. Each record contributes at most one tally per category, except that
/// a string additionally counts as `uuid`/`datetime` when it pattern-matches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub null: u64,
    pub boolean: u64,
    pub number: u64,
    pub integer: u64,
    pub floating: u64,
    pub string: u64,
    pub uuid: u64,
    pub datetime: u64,
}

/// Matches the canonical 8-4-4-4-12 hex UUID pattern exactly (hyphenated
/// form only — braced, simple, and urn forms are not "canonical" here).
pub fn is_canonical_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    let bytes = s.as_bytes();
    if bytes[8] != b'-' || bytes[13] != b'-' || bytes[18] != b'-' || bytes[23] != b'-' {
        return false;
    }
    uuid::Uuid::parse_str(s).is_ok()
}

/// Matches `^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}` against the start of `s`.
pub fn looks_like_datetime_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 19 {
        return false;
    }
    let digit = |i: usize| b[i].is_ascii_digit();
    (0..4).all(digit)
        && b[4] == b'-'
        && (5..7).all(digit)
        && b[7] == b'-'
        && (8..10).all(digit)
        && b[10] == b'T'
        && (11..13).all(digit)
        && b[13] == b':'
        && (14..16).all(digit)
        && b[16] == b':'
        && (17..19).all(digit)
}

fn is_integer_valued(n: &serde_json::Number) -> bool {
    n.as_i64().is_some() || n.as_u64().is_some()
}

/// Pass 1: accumulate [`Counts`] per top-level field. Nested arrays/objects
/// are not walked into `Counts` — only top-level fields become columns.
/// Anonymization is disabled in this core: `is_anonymizable` is called but
/// its result never changes behavior, documenting the extension point a
/// future personal-data redaction predicate would occupy.
pub struct Pass1Processor<'a> {
    counts: &'a mut HashMap<String, Counts>,
}

impl<'a> Pass1Processor<'a> {
    pub fn new(counts: &'a mut HashMap<String, Counts>) -> Self {
        Self { counts }
    }

    /// Always `false` in this core; named so a future redaction predicate
    /// has an obvious place to plug in.
    fn is_anonymizable(&self, _field_name: &str) -> bool {
        false
    }
}

impl<'a> RecordHandler for Pass1Processor<'a> {
    fn handle(&mut self, record: &CanonicalRecord) -> crate::errors::Result<()> {
        for (field, value) in record.members() {
            let _ = self.is_anonymizable(field);
            let entry = self.counts.entry(field.clone()).or_default();
            match value {
                Value::Null => entry.null += 1,
                Value::Bool(_) => entry.boolean += 1,
                Value::Number(n) => {
                    entry.number += 1;
                    if is_integer_valued(n) {
                        entry.integer += 1;
                    } else {
                        entry.floating += 1;
                    }
                }
                Value::String(s) => {
                    entry.string += 1;
                    if is_canonical_uuid(s) {
                        entry.uuid += 1;
                    }
                    if looks_like_datetime_prefix(s) {
                        entry.datetime += 1;
                    }
                }
                // Nested structures are part of the corpus but do not
                // themselves become columns; walking them further would
                // only matter for statistics we don't collect.
                Value::Array(_) | Value::Object(_) => {}
            }
        }
        Ok(())
    }
}

const OVERSIZE_LITERAL_LEN: usize = 65535;
const NUMERIC_MAGNITUDE_LIMIT: f64 = 1e10;

/// Pass 2: emit one tuple per record into the batcher, in the column order
/// fixed by pass 1.
pub struct Pass2Processor<'a> {
    table_name: &'a str,
    columns: &'a [ColumnSpec],
    batcher: &'a mut InsertBatcher,
    tenant_id: i16,
}

impl<'a> Pass2Processor<'a> {
    pub fn new(
        table_name: &'a str,
        columns: &'a [ColumnSpec],
        batcher: &'a mut InsertBatcher,
        tenant_id: i16,
    ) -> Self {
        Self {
            table_name,
            columns,
            batcher,
            tenant_id,
        }
    }

    fn encode_id(&self, record: &CanonicalRecord) -> String {
        match record.get("id") {
            Some(Value::String(s)) => db::quote_literal(s),
            Some(v) if !v.is_null() => db::quote_literal(&v.to_string()),
            _ => "NULL".to_string(),
        }
    }

    fn encode_column(&self, record: &CanonicalRecord, col: &ColumnSpec) -> String {
        let Some(value) = record.get(&col.source_field_name) else {
            return "NULL".to_string();
        };
        if value.is_null() {
            return "NULL".to_string();
        }

        match col.column_type {
            ColumnType::Boolean => match value {
                Value::Bool(b) => {
                    if *b {
                        "TRUE".to_string()
                    } else {
                        "FALSE".to_string()
                    }
                }
                _ => "NULL".to_string(),
            },
            ColumnType::Bigint => match value.as_i64() {
                Some(i) => i.to_string(),
                None => {
                    tracing::warn!(
                        table = self.table_name,
                        column = %col.column_name,
                        "non-integer value in bigint column, emitting NULL"
                    );
                    "NULL".to_string()
                }
            },
            ColumnType::Numeric => {
                let Some(f) = value.as_f64() else {
                    return "NULL".to_string();
                };
                if f.abs() > NUMERIC_MAGNITUDE_LIMIT {
                    tracing::warn!(
                        table = self.table_name,
                        column = %col.column_name,
                        value = f,
                        "numeric value exceeds 1e10, emitting 0"
                    );
                    "0".to_string()
                } else {
                    value.to_string()
                }
            }
            ColumnType::Id | ColumnType::Timestamptz | ColumnType::Varchar => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if text.len() >= OVERSIZE_LITERAL_LEN {
                    tracing::warn!(
                        table = self.table_name,
                        column = %col.column_name,
                        len = text.len(),
                        "literal too large, emitting NULL"
                    );
                    "NULL".to_string()
                } else {
                    db::quote_literal(&text)
                }
            }
        }
    }

    fn encode_data(&self, record: &CanonicalRecord, record_id: Option<&str>) -> String {
        let pretty = record.pretty();
        if pretty.len() <= OVERSIZE_LITERAL_LEN {
            return db::quote_literal(&pretty);
        }
        let compact = record.compact();
        if compact.len() <= OVERSIZE_LITERAL_LEN {
            return db::quote_literal(&compact);
        }
        tracing::warn!(
            table = self.table_name,
            id = record_id.unwrap_or("<unknown>"),
            len = compact.len(),
            "canonical record too large even compacted, emitting NULL for data"
        );
        "NULL".to_string()
    }
}

impl<'a> RecordHandler for Pass2Processor<'a> {
    fn handle(&mut self, record: &CanonicalRecord) -> crate::errors::Result<()> {
        let record_id = record.get("id").and_then(|v| v.as_str()).map(str::to_string);

        let mut fields = Vec::with_capacity(self.columns.len() + 3);
        fields.push(self.encode_id(record));
        for col in self.columns {
            fields.push(self.encode_column(record, col));
        }
        fields.push(self.encode_data(record, record_id.as_deref()));
        fields.push(self.tenant_id.to_string());

        let tuple = format!("({})", fields.join(","));
        self.batcher.append(&tuple);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::scanner::{PageScanner, RECORDS_KEY};

    #[test]
    fn detects_uuid_and_datetime_patterns() {
        assert!(is_canonical_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_canonical_uuid("not-a-uuid"));
        assert!(!is_canonical_uuid("550e8400e29b41d4a716446655440000"));
        assert!(looks_like_datetime_prefix("2024-01-02T03:04:05Z"));
        assert!(!looks_like_datetime_prefix("2024-01-02"));
    }

    #[test]
    fn pass1_tallies_fields() {
        let input = br#"{"records":[{"id":"a","n":1,"x":null},{"id":"b","n":2.5,"x":"hi"}]}"#;
        let mut counts: HashMap<String, Counts> = HashMap::new();
        let mut proc = Pass1Processor::new(&mut counts);
        PageScanner::scan(&input[..], "p", RECORDS_KEY, &mut proc).unwrap();

        let n = counts.get("n").unwrap();
        assert_eq!(n.number, 2);
        assert_eq!(n.integer, 1);
        assert_eq!(n.floating, 1);

        let x = counts.get("x").unwrap();
        assert_eq!(x.null, 1);
        assert_eq!(x.string, 1);

        let id = counts.get("id").unwrap();
        assert_eq!(id.string, 2);
    }

    #[test]
    fn pass2_emits_tuple_with_null_for_missing_field() {
        let input = br#"{"records":[{"id":"a","name":"x"}]}"#;
        let columns = vec![ColumnSpec {
            column_name: "name".into(),
            source_field_name: "name".into(),
            column_type: ColumnType::Varchar,
        }];
        let mut batcher = InsertBatcher::new("t_loading");
        let mut proc = Pass2Processor::new("t", &columns, &mut batcher, 1);
        PageScanner::scan(&input[..], "p", RECORDS_KEY, &mut proc).unwrap();
        let ready = batcher.finish();
        assert_eq!(ready.len(), 1);
        assert!(ready[0].contains("'a'"));
        assert!(ready[0].contains("'x'"));
        assert!(ready[0].ends_with(",1);"));
    }

    #[test]
    fn oversize_numeric_becomes_zero() {
        let input = br#"{"records":[{"id":"a","n":1},{"id":"b","n":2.0e12}]}"#;
        let columns = vec![ColumnSpec {
            column_name: "n".into(),
            source_field_name: "n".into(),
            column_type: ColumnType::Numeric,
        }];
        let mut batcher = InsertBatcher::new("t_loading");
        let mut proc = Pass2Processor::new("t", &columns, &mut batcher, 1);
        PageScanner::scan(&input[..], "p", RECORDS_KEY, &mut proc).unwrap();
        let ready = batcher.finish();
        assert_eq!(ready.len(), 1);
        assert!(ready[0].contains("('a',1,"));
        assert!(ready[0].contains("('b',0,"));
    }
}
