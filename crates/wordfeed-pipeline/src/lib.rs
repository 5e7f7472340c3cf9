#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod bucket;
pub mod config;
pub mod error;
pub mod filter;
pub mod pack;
pub mod parse;
pub mod pipeline;
pub mod preprocess;
pub mod reader;
pub mod resolve;
pub mod synth;
