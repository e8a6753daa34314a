//! Telegram Bot API integration.
//!
//! Outbound delivery ([`api::TelegramApi`] implementing the common
//! `Transport` port) and the inbound long-polling update stream
//! ([`listener::UpdateListener`]).

pub mod api;
pub mod listener;
pub mod types;
