//! Two-pass JSON-to-relational staging: scan, infer a schema, load, index,
//! and publish one table at a time.

pub mod batch;
pub mod record;
pub mod scanner;
pub mod schema;
pub mod stager;

pub use batch::InsertBatcher;
pub use record::{Counts, Pass1Processor, Pass2Processor};
pub use scanner::{CanonicalRecord, PageScanner, RecordHandler, RECORDS_KEY};
pub use schema::{ColumnSpec, ColumnType, TypeChooser};
pub use stager::TableStager;
