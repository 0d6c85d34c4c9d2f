//! cmdchan Daemon - Connection registry and interval broadcast server
//!
//! This crate provides the core infrastructure for the command channel daemon:
//! - `config` - TOML/environment configuration
//! - `transport` - Shared write side and liveness of one connection
//! - `registry` - Registry of live connections
//! - `server` - TCP listener, per-connection handlers and command processing
//! - `broadcast` - Periodic prune-and-push of polling intervals
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      cmdchand daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────────┐  insert  ┌─────────────────────┐   │
//! │  │ CommandChannelServer│─────────▶│ ConnectionRegistry  │   │
//! │  │   (TcpListener)     │          │ (Mutex<Vec<..>>)    │   │
//! │  └──────────┬──────────┘          └──────────▲──────────┘   │
//! │             │ spawn                          │ prune/iter   │
//! │             ▼                                │              │
//! │  ┌─────────────────────┐          ┌──────────┴──────────┐   │
//! │  │ ConnectionHandler   │          │    Broadcaster      │   │
//! │  │   (per client)      │          │ (every N seconds)   │   │
//! │  └─────────────────────┘          └─────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both the accept loop and the broadcaster observe one process-wide
//! `CancellationToken`.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-connection failures are logged and never escape their task

pub mod broadcast;
pub mod config;
pub mod registry;
pub mod server;
pub mod transport;
