//! Batched loader (`InsertBatcher`): accumulates row tuples into
//! `INSERT ... VALUES (...),(...)` statements, cutting a new statement
//! whenever the buffer crosses a byte threshold.
//!
//! Kept entirely synchronous so the [`RecordHandler`](crate::staging::scanner::RecordHandler)
//! implementations that feed it (`Pass2Processor`) never need to await from
//! inside `serde`'s visitor callbacks. The async [`TableStager`](crate::staging::stager::TableStager)
//! drains `ready` statements between page scans instead.

/// Statements larger than this are cut and queued for execution rather than
/// grown further. Chosen well under typical server-side statement-size
/// limits while still batching hundreds of rows per `INSERT`.
pub const FLUSH_THRESHOLD_BYTES: usize = 16_500_000;

pub struct InsertBatcher {
    preamble: String,
    buf: String,
    row_count: usize,
    ready: Vec<String>,
}

impl InsertBatcher {
    pub fn new(loading_table: &str) -> Self {
        let preamble = format!("INSERT INTO {} VALUES ", crate::db::quote_ident(loading_table));
        Self {
            buf: preamble.clone(),
            preamble,
            row_count: 0,
            ready: Vec::new(),
        }
    }

    /// Append one row tuple (already formatted as `(...)`) to the current
    /// statement. Cuts and queues the statement once it crosses
    /// [`FLUSH_THRESHOLD_BYTES`], starting a fresh one for the next row.
    pub fn append(&mut self, tuple: &str) {
        if self.row_count > 0 {
            self.buf.push(',');
        }
        self.buf.push_str(tuple);
        self.row_count += 1;

        if self.buf.len() >= FLUSH_THRESHOLD_BYTES {
            self.cut();
        }
    }

    fn cut(&mut self) {
        if self.row_count == 0 {
            return;
        }
        self.buf.push(';');
        self.ready.push(std::mem::replace(&mut self.buf, self.preamble.clone()));
        self.row_count = 0;
    }

    /// Take any statements that have crossed the threshold since the last
    /// drain, leaving the in-progress partial statement (if any) buffered.
    pub fn drain_ready(&mut self) -> Vec<String> {
        std::mem::take(&mut self.ready)
    }

    /// Cut whatever partial statement remains and return every outstanding
    /// statement, ready or not. Call once after the last record of a table.
    pub fn finish(mut self) -> Vec<String> {
        self.cut();
        self.ready
    }

    pub fn rows_buffered(&self) -> usize {
        self.row_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_rows_into_one_statement_until_finish() {
        let mut b = InsertBatcher::new("t_loading");
        b.append("('a',1)");
        b.append("('b',2)");
        assert!(b.drain_ready().is_empty());
        let stmts = b.finish();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0], "INSERT INTO \"t_loading\" VALUES ('a',1),('b',2);");
    }

    #[test]
    fn empty_batcher_finishes_with_no_statements() {
        let b = InsertBatcher::new("t_loading");
        assert!(b.finish().is_empty());
    }

    #[test]
    fn crossing_threshold_cuts_a_ready_statement() {
        let mut b = InsertBatcher::new("t_loading");
        let big_tuple = format!("('{}')", "x".repeat(FLUSH_THRESHOLD_BYTES));
        b.append(&big_tuple);
        let ready = b.drain_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(b.rows_buffered(), 0);
        b.append("('next')");
        let stmts = b.finish();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("'next'"));
    }
}
