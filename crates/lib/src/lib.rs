//! terra-lib: desired-state convergence for a cluster of peers
//!
//! Every node runs an [`agent::Agent`] that holds one desired-state document
//! (a [`manifest::ManifestList`]), installs the assemblies that apply to it,
//! and gossips with its peers until all of them hold the newest document:
//! - `manifest`: the document types and the matcher deciding what applies here
//! - `apply`: idempotent install passes and the node status state machine
//! - `store`: durable document and installed-assembly ledger
//! - `agent`: request handling, peer fan-out and the synchronizer
//! - `rpc`: the HTTP surface between operators, agents and peers

pub mod agent;
pub mod apply;
pub mod cluster;
pub mod config;
pub mod consts;
pub mod image;
pub mod manifest;
pub mod node;
pub mod platform;
pub mod rpc;
pub mod state;
pub mod store;
pub mod tasks;
pub mod util;
