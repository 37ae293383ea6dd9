//! NetSector : surveillance de la topologie réseau d'un site industriel.
//!
//! Le binaire `netsector-kernel` assemble ces modules ; la devkit les réutilise
//! pour les tests d'intégration.

pub mod bus;
pub mod cache;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod history;
pub mod http;
pub mod models;
pub mod overrides;
pub mod poller;
pub mod probe;
pub mod state;
pub mod store;
pub mod topology;
