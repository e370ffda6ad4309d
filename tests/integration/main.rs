//! Integration tests for Bconomy-Sync
//!
//! The sync is driven end-to-end over the in-memory transport, with a task
//! playing the game service on the other side of the socket.

mod config_tests;
mod server;
mod sync_tests;
