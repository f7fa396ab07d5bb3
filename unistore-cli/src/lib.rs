//! # unistore CLI
//!
//! Operator command line for the unistore storage contract. Each invocation
//! runs one contract operation and prints its result as JSON.
//!
//! The reference backend keeps its state in an inventory file, loaded before
//! and saved after every command, so successive invocations share volumes,
//! policies and snapshots.
//!
//! ## Usage
//! ```bash
//! unistore create-volume vol1 --field size_total=100
//! unistore create-policy vol1 p1 --rule 10.0.0.0/24
//! unistore --inventory /tmp/inv.yaml volumes
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod inventory;
