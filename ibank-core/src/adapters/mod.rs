//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the CheckpointStore port
//! - Fio REST API client for BankAdapter
//! - Citibank CZ web banking client for BankAdapter

pub mod citibank;
pub mod duckdb;
pub mod fio;

#[cfg(test)]
mod citibank_mock;
#[cfg(test)]
mod fio_mock;
#[cfg(test)]
mod mock_http;
