//! # simgate-net
//!
//! The network side of simgate: the compact IEC 61499 wire codec, the
//! stream-reassembling subscriber runtime with its TCP client transport,
//! the publishers (UDP and TCP), and the network manager that wires both
//! sides to the dispatcher from the channel configuration.

#![forbid(unsafe_code)]

pub mod codec;
pub mod manager;
pub mod partial;
pub mod publisher;
pub mod subscriber;
