// Core infrastructure modules
pub mod core;

// Configuration and the comparison flow built on the core
pub mod compare;
pub mod config;

#[cfg(test)]
mod test_utils;
