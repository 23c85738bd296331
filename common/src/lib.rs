pub mod error;
pub mod search;
pub mod storage;
pub mod utils;
