//! Telegram transport adapter: the concrete [`kickai_core::fleet::BotWorker`]
//! implementation the fleet manager spawns one of per active team.

pub mod chunking;
pub mod worker;

pub use worker::{TelegramBotWorker, TelegramBotWorkerFactory};
