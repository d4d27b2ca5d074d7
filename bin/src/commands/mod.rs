//! Subcommand implementations.

pub(crate) mod aggregate;
pub(crate) mod plan;
pub(crate) mod run;
pub(crate) mod validate;
