pub mod engine;
pub mod link;
pub mod policy;
pub mod recency;
pub mod table_policy;
pub mod wrapper;
