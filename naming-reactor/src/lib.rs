pub mod api;
pub mod cache;
pub mod cache_manager;
pub mod config;
pub mod proxy;
pub mod push;
pub mod reactor;
pub mod scheduler;
pub mod store;
pub mod subscriber;

#[cfg(test)]
mod test_support;
