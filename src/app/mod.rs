pub mod graph_ops_use_case;
pub mod ingest_use_case;
pub mod ports;
pub mod validate_use_case;
