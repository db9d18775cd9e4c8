pub mod intake;
pub mod storage;
pub mod storage_key;
