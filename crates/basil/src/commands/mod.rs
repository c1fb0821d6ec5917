//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod write;

pub(crate) use build::BuildArgs;
pub(crate) use write::WriteArgs;
