pub mod destroy;
pub mod overwrite;
pub mod policy;

#[cfg(test)]
mod overwrite_test;
#[cfg(test)]
mod functional_tests;

// Re-export the building blocks of a wipe
pub use destroy::{DestroyAction, DestroyReport};
pub use overwrite::{OverwriteExecutor, OverwriteReport};
pub use policy::{BytePattern, PatternPolicy, PatternSpec};
