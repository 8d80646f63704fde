//! Command implementations.

pub mod build;
pub mod doctor;
pub mod new;
pub mod serve;
pub mod test_markdown;
pub mod watch;
