//! CartSense offline mutation queue and sync.
//!
//! Shopping list and saved-meal writes land in a local SQLite cache and a
//! pending-operation queue first, and are replayed against the remote
//! document store when connectivity returns.

pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod network;
pub mod remote;
pub mod server;
pub mod sync;
