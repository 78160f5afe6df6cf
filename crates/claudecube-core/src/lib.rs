//! Core substrate for the ClaudeCube permission daemon.
//!
//! Everything in this crate is synchronous and side-effect-light: typed
//! configuration, the rule engine and its hot-reload handle, the policy
//! store, the session registry, transcript reading, and the audit sink.
//! The async machinery (HTTP ingress, LLM calls, Telegram) lives in the
//! daemon and llm crates and is built on top of these pieces.

pub mod audit;
pub mod config;
pub mod policy;
pub mod rules;
pub mod session;
pub mod transcript;
