//! `skirmish` - real-time wagering rounds
//!
//! Players bet on competing sides during a timed betting window, a
//! randomized battle picks a winner, wagers are settled, and every round
//! event is journaled to a hash-chained audit ledger.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod observability;
pub mod players;
pub mod server;
pub mod transport;
