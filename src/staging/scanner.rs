//! Streaming JSON scanner (`PageScanner`).
//!
//! Walks a page file shaped as `{ …, "records": [ R₁, R₂, … ], … }` and
//! delivers one canonicalized record at a time to a [`RecordHandler`],
//! without ever materializing more than one record in memory. Implemented
//! by driving `serde_json`'s push-based `Deserializer`/`Visitor` API
//! directly rather than collecting a `serde_json::Value` for the whole
//! file: the outer object is walked member-by-member, and only the value
//! under the records key is deserialized as a sequence, whose elements are
//! pulled lazily one at a time from the underlying reader.

use indexmap::IndexMap;
use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserializer as _;
use serde_json::Value;
use std::fmt;
use std::io::Read;

use crate::errors::{Error, Result};

/// The top-level key under which the records array is expected to live.
pub const RECORDS_KEY: &str = "records";

/// A single record, reordered so that `id` (if present) sorts first and
/// every other member follows in lexicographic order. Holding this as an
/// `IndexMap` (rather than `serde_json::Value`'s default `BTreeMap`-backed
/// object) is what lets us serialize it back out in that exact order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord(IndexMap<String, Value>);

impl CanonicalRecord {
    pub fn members(&self) -> &IndexMap<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Pretty-printed canonical form, used for the `data` column under
    /// normal circumstances.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).expect("IndexMap<String, Value> always serializes")
    }

    /// Compact (no whitespace) canonical form, used as a fallback when the
    /// pretty form is too large to store as a literal.
    pub fn compact(&self) -> String {
        serde_json::to_string(&self.0).expect("IndexMap<String, Value> always serializes")
    }
}

/// Reorder a parsed JSON object's top-level members: `id` first (if
/// present), then the rest in lexicographic order. `serde_json::Value`'s
/// default `Map` is a `BTreeMap`, so iterating it already yields keys in
/// lexicographic order; we only need to special-case `id`.
fn canonicalize(value: Value) -> std::result::Result<CanonicalRecord, String> {
    let Value::Object(obj) = value else {
        return Err("expected a JSON object record".to_string());
    };

    let mut ordered = IndexMap::with_capacity(obj.len());
    if let Some(id) = obj.get("id") {
        ordered.insert("id".to_string(), id.clone());
    }
    for (k, v) in obj.into_iter() {
        if k == "id" {
            continue;
        }
        ordered.insert(k, v);
    }
    Ok(CanonicalRecord(ordered))
}

/// Receives one canonicalized record at a time. Implementations should
/// record the first error they hit (e.g. by stashing it on `self`) rather
/// than unwinding through `serde`'s visitor machinery with anything other
/// than a string message; [`PageScanner::scan`] only surfaces the message.
pub trait RecordHandler {
    fn handle(&mut self, record: &CanonicalRecord) -> Result<()>;
}

/// Strip trailing commas before a closing `}` or `]`, leaving everything
/// else — including commas that appear inside string values — untouched.
/// `serde_json` itself is strict about trailing commas, so page files must
/// be passed through this before parsing; [`PageScanner::scan`] assumes its
/// input already has been.
pub fn strip_trailing_commas(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;

    while i < input.len() {
        let b = input[i];

        if in_string {
            out.push(b);
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            b',' => {
                let mut j = i + 1;
                while j < input.len() && matches!(input[j], b' ' | b'\t' | b'\r' | b'\n') {
                    j += 1;
                }
                if j < input.len() && (input[j] == b'}' || input[j] == b']') {
                    i += 1; // drop the trailing comma
                } else {
                    out.push(b);
                    i += 1;
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

pub struct PageScanner;

impl PageScanner {
    /// Parse `reader` as `{ …, "<records_key>": [ … ], … }`, invoking
    /// `handler.handle` once per record in array order. Malformed JSON, or a
    /// record that isn't an object, is fatal and surfaces as
    /// [`Error::MalformedPage`].
    pub fn scan<R: Read, H: RecordHandler>(
        reader: R,
        path: &str,
        records_key: &str,
        handler: &mut H,
    ) -> Result<()> {
        let mut de = serde_json::Deserializer::from_reader(reader);
        let visitor = TopVisitor {
            records_key,
            handler,
        };
        de.deserialize_any(visitor).map_err(|e| Error::MalformedPage {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

struct TopVisitor<'a, H> {
    records_key: &'a str,
    handler: &'a mut H,
}

impl<'de, 'a, H: RecordHandler> Visitor<'de> for TopVisitor<'a, H> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object containing a \"{}\" array", self.records_key)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(key) = map.next_key::<String>()? {
            if key == self.records_key {
                map.next_value_seed(RecordsSeed {
                    handler: self.handler,
                })?;
            } else {
                let _: IgnoredAny = map.next_value()?;
            }
        }
        Ok(())
    }
}

struct RecordsSeed<'a, H> {
    handler: &'a mut H,
}

impl<'de, 'a, H: RecordHandler> DeserializeSeed<'de> for RecordsSeed<'a, H> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(RecordsVisitor {
            handler: self.handler,
        })
    }
}

struct RecordsVisitor<'a, H> {
    handler: &'a mut H,
}

impl<'de, 'a, H: RecordHandler> Visitor<'de> for RecordsVisitor<'a, H> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "an array of record objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        // `next_element` pulls exactly one record from the underlying
        // reader at a time; nothing beyond the current record is buffered.
        while let Some(value) = seq.next_element::<Value>()? {
            let record = canonicalize(value).map_err(serde::de::Error::custom)?;
            self.handler
                .handle(&record)
                .map_err(|e| serde::de::Error::custom(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector(Vec<CanonicalRecord>);
    impl RecordHandler for Collector {
        fn handle(&mut self, record: &CanonicalRecord) -> Result<()> {
            self.0.push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn scans_records_in_order() {
        let input = br#"{"records":[{"id":"a","name":"x"},{"id":"b","name":"y"}]}"#;
        let mut collector = Collector(Vec::new());
        PageScanner::scan(&input[..], "page_0.json", RECORDS_KEY, &mut collector).unwrap();
        assert_eq!(collector.0.len(), 2);
        assert_eq!(
            collector.0[0].get("id").unwrap().as_str().unwrap(),
            "a"
        );
    }

    #[test]
    fn empty_records_array_is_legal() {
        let input = br#"{"records":[]}"#;
        let mut collector = Collector(Vec::new());
        PageScanner::scan(&input[..], "page_0.json", RECORDS_KEY, &mut collector).unwrap();
        assert!(collector.0.is_empty());
    }

    #[test]
    fn id_sorts_first_rest_lexicographic() {
        let input = br#"{"records":[{"z":1,"id":"q","a":2}]}"#;
        let mut collector = Collector(Vec::new());
        PageScanner::scan(&input[..], "page_0.json", RECORDS_KEY, &mut collector).unwrap();
        let keys: Vec<&str> = collector.0[0].members().keys().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["id", "a", "z"]);
        assert!(collector.0[0].pretty().starts_with("{\n  \"id\": \"q\","));
    }

    #[test]
    fn malformed_json_is_fatal() {
        let input = br#"{"records": [ {"id": ]}"#;
        let mut collector = Collector(Vec::new());
        let err = PageScanner::scan(&input[..], "page_0.json", RECORDS_KEY, &mut collector)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPage { .. }));
    }

    #[test]
    fn trailing_data_in_non_record_members_is_ignored() {
        let input = br#"{"meta":{"total":2},"records":[{"id":"a"}],"page":1}"#;
        let mut collector = Collector(Vec::new());
        PageScanner::scan(&input[..], "page_0.json", RECORDS_KEY, &mut collector).unwrap();
        assert_eq!(collector.0.len(), 1);
    }

    #[test]
    fn strips_trailing_commas_outside_strings() {
        let input = br#"{"records":[{"id":"a","note":"x,y,",},],}"#;
        let stripped = strip_trailing_commas(input);
        let mut collector = Collector(Vec::new());
        PageScanner::scan(&stripped[..], "page_0.json", RECORDS_KEY, &mut collector).unwrap();
        assert_eq!(collector.0.len(), 1);
        assert_eq!(
            collector.0[0].get("note").unwrap().as_str().unwrap(),
            "x,y,"
        );
    }
}
