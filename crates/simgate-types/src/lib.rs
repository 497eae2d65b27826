//! # simgate-types
//!
//! This crate provides the foundational, shared data types used across the
//! entire simgate workspace. Its purpose is to break dependency cycles by
//! providing a stable, central location for types that `simgate-engine`,
//! `simgate-model`, `simgate-net`, and `simgate-cli` all need to agree upon:
//! simulation time, port identifiers, typed variables, the configuration
//! tree, the channel mapping, and the common error taxonomy.

#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod errors;
pub mod port;
pub mod time;
pub mod variable;
