//! Small shared utilities used across the MV-Util crates.

#![warn(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::str_to_string,
    clippy::clone_on_ref_ptr,
    clippy::manual_let_else,
    clippy::redundant_closure_for_method_calls,
    clippy::trivially_copy_pass_by_ref
)]

pub mod duration;
pub mod lazy;

pub use duration::parse_duration;
pub use lazy::LazyValue;
