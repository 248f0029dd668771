// # Resource Store Implementations
//
// This module provides implementations of the ResourceStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileResourceStore;
pub use memory::MemoryResourceStore;
