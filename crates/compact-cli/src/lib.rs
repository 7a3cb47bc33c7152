//! # compact-cli — Privilege Engine Command-Line Interface
//!
//! ## Subcommands
//!
//! - `simulate`: replay a JSON scenario (seed records plus purchase and
//!   encumbrance steps) against in-memory adapters and print the resulting
//!   records, published events and notifications.
//! - `validate-event`: validate an inbound encumbrance envelope.
//!
//! Handlers parse arguments, read files and print. Engine behavior lives in
//! `compact-privilege`.

pub mod event;
pub mod simulate;
