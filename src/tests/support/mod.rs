// Shared test support code for scenario tests.
// This module provides common utilities that all test files can use.

pub mod item;
pub mod tree;

pub use item::*;
pub use tree::*;
