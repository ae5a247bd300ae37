//! Helpers for exercising promptforge in tests: an in-process application,
//! request scenarios, JWT minting, and a migrated SQLite database.

mod app;
mod database;
mod scenario;
mod tokens;

pub use app::{TEST_WEBHOOK_SECRET, TestApp};
pub use database::TestDb;
pub use scenario::{Scenario, ScenarioAssert, get, post};
pub use tokens::{TEST_JWT_SECRET, TokenMint};
