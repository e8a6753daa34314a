//! Core relay pipeline: persistence gateway, schedule gate, notification
//! renderer, pending-comment cache, polling scheduler and push handler.

pub mod pending;
pub mod poller;
pub mod push;
pub mod render;
pub mod schedule;
pub mod store;
