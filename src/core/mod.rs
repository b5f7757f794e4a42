//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{
    parse_xml, LoaderError, SessionField, SessionTable, TidyRecord, TidyTable, XmlTable,
};
pub use writers::{
    write_json_chunk, write_series_csv, write_session_csv, write_tidy_csv, WriteError,
};
