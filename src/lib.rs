#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod config;
pub mod lru;
pub mod memcg;
pub mod metrics;
pub mod registry;
pub mod stress;

pub use lru::{ListLru, ListLruBuilder, LruError, LruIsolate, LruItem, LruLink, LruStatus};
pub use memcg::Memcg;
pub use registry::LruRegistry;
