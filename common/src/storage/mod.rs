pub mod cursor;
pub mod db;
pub mod indexes;
pub mod ingest;
pub mod types;
