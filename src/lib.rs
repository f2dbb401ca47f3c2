pub mod args;
pub mod common;
pub mod constants;
pub mod dedup;
pub mod enrich;
pub mod ingest;
pub mod job;
pub mod normalize;
pub mod parquet_writer;
pub mod pipeline;
pub mod reports;
pub mod schema;
pub mod storage;
pub mod validate;
