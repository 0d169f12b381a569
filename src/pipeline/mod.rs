// Data pipeline: ingestion, processing, storage and validation

pub mod ingestion;
pub mod processing;
pub mod storage;
pub mod validation;
