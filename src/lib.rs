//! Run one SQL query and stream its result set as CSV.
//!
//! A producer task drives the database cursor and normalizes each cell; the
//! caller's task writes records to the output in cursor order. See
//! [`pipeline::run_pipeline`].

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod masking;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod sink;
pub mod template;
pub mod validation;
pub mod verbose;
