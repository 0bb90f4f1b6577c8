//! Trello mirror - keeps one copy of every master-list card in the list
//! named after each of its labels.
//!
//! The library is driven by Trello webhooks through the HTTP server in
//! [`integrations::webhooks`]; the reconciliation logic lives in [`mirror`].

pub mod config;
pub mod integrations;
pub mod logging;
pub mod mirror;
