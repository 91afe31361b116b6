//! Chunked LLM takeoff extraction
//!
//! Page-iterated extraction of engineering elements from stored document
//! text, with a pipe-delimited wire format, a small reinforcement grammar,
//! and schema validation before persistence.

pub mod extractor;
pub mod prompts;
pub mod schema;
pub mod table;

pub use extractor::{ChunkedTakeoffExtractor, TakeoffRunResult};
pub use schema::{completeness_score, sanitize_specs, schema_for, validate_specs};
pub use table::{parse_table, render_table, ParsedPage, TakeoffRow, TABLE_COLUMNS};
