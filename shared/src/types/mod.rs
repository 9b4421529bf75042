//! Data model shared by every covfetch component

pub mod coverage;
