//! Manifest text formats: row codec, append-only writer and streaming reader.

mod reader;
mod row;
mod writer;

pub use reader::{
    ManifestEntry, ReadStats, detect_kind, for_each_entry, parse_entries, parse_line, read_entries,
};
pub use row::{
    CALCULATION_TIME_FORMAT, FILE_TIME_FORMAT, format_path, format_record, header_kind, split_row,
    split_row_exact, unsupported_path,
};
pub use writer::ManifestWriter;
