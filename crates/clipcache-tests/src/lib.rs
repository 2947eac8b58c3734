//! Integration test crate for ClipCache.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on multiple clipcache crates to verify they work together.

#[cfg(test)]
mod buffers;

#[cfg(test)]
mod cache;

#[cfg(test)]
mod clip;
