//! Core library for the multi-tenant football team chat-bot platform: the
//! document store port, service registry, team config cache, startup
//! validator, fleet manager, message router, and tool dispatch. Transport
//! (`kickai-telegram`) and process wiring (`kickai-cli`) live in their own
//! crates and depend on this one.

pub mod agent;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod domain;
pub mod fleet;
pub mod health;
pub mod registry;
pub mod router;
pub mod startup;
pub mod store;
pub mod team_cache;
pub mod text;
