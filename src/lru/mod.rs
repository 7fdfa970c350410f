//! Shrinkable LRU lists partitioned per NUMA node and per memory cgroup.

pub mod alloc;
pub mod error;
pub mod link;
pub mod list_lru;
pub mod memcg_map;
pub mod node;
pub mod one;
pub mod reparent;
pub mod walk;

#[cfg(test)]
mod reparent_test;

// Re-export main types
pub use error::LruError;
pub use link::{LruItem, LruLink};
pub use list_lru::{ListLru, ListLruBuilder};
pub use one::LruOne;
pub use walk::{LruIsolate, LruStatus};
