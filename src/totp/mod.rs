pub mod backup;
pub mod models;
pub mod repo;
pub mod service;

pub use service::{SetupOutcome, TotpService, VerifyOutcome};
