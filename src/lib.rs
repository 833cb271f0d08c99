//! Reconciliation engine for paginated chat history and live chat events.

pub mod app;
pub mod cli;
pub mod domain;
pub mod infra;
pub mod usecases;
