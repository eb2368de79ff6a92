pub mod commit_safety;
pub mod discovery;
pub mod end_to_end;
pub mod ingestion_lifecycle;
pub mod rate_limit_recovery;
