//! Custodial wallet ledger: balances, double-entry transfers, idempotent
//! payment crediting and scoped API keys.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{router, AppState, Application, ServiceSettings};
