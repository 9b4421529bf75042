pub mod fetch;
pub mod merge;
