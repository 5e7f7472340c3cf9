// deny, not forbid: ndarray's `s!` expansion carries its own
// `#[allow(unsafe_code)]`, which forbid rejects.
#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod record;
pub mod schema;
pub mod sparse;
pub mod types;
pub mod vocab;
