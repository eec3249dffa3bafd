//! tcpmon library crate: layered Ethernet/IP/TCP dissection and TCP
//! connection tracking, shared by the binary and the benchmarks.

pub mod capture;
pub mod config;
pub mod connection;
pub mod display;
pub mod protocol;
