//! Teloxide-backed [`BotWorker`] — the concrete per-team Telegram frontend.
//!
//! Generalizes a single-bot bootstrap (one `Bot`, one `dptree` handler tree,
//! one `Dispatcher`) into a worker that the fleet manager can start and stop
//! per team. Every inbound text message is forwarded, unmodified, into
//! [`MessageRouter::route`]; this module owns nothing about commands or
//! permissions.

use std::sync::Arc;

use async_trait::async_trait;
use kickai_core::fleet::{BotWorker, BotWorkerFactory, FleetError};
use kickai_core::domain::Team;
use kickai_core::router::{MessageRouter, RoutedMessage};
use teloxide::dispatching::{Dispatcher, ShutdownToken, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::types::Message;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::chunking::chunk_message;

/// A running teloxide long-poll dispatcher for exactly one team's bot.
pub struct TelegramBotWorker {
    team_id: String,
    bot: Bot,
    router: Arc<MessageRouter>,
    shutdown_token: Mutex<Option<ShutdownToken>>,
}

impl TelegramBotWorker {
    pub fn new(team_id: String, bot: Bot, router: Arc<MessageRouter>) -> Self {
        Self {
            team_id,
            bot,
            router,
            shutdown_token: Mutex::new(None),
        }
    }
}

async fn handle_message(bot: Bot, msg: Message, router: Arc<MessageRouter>, team_id: String) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let telegram_id = match msg.from.as_ref() {
        Some(user) => user.id.0 as i64,
        None => return Ok(()),
    };
    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_default();

    let routed = RoutedMessage {
        telegram_id,
        chat_id: msg.chat.id.0,
        team_id,
        username,
        text: text.to_string(),
    };

    let reply = router.route(routed).await;
    for chunk in chunk_message(&reply.text) {
        if let Err(e) = bot.send_message(ChatId(reply.chat_id), chunk).await {
            warn!(error = %e, chat_id = reply.chat_id, "failed to deliver reply");
        }
    }
    Ok(())
}

#[async_trait]
impl BotWorker for TelegramBotWorker {
    fn team_id(&self) -> &str {
        &self.team_id
    }

    async fn run(self: Arc<Self>) -> Result<(), FleetError> {
        let handler = Update::filter_message().endpoint(handle_message);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.router.clone(), self.team_id.clone()])
            .build();

        *self.shutdown_token.lock().await = Some(dispatcher.shutdown_token());
        dispatcher.dispatch().await;
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(token) = self.shutdown_token.lock().await.take() {
            if let Err(e) = token.shutdown() {
                error!(team_id = %self.team_id, error = %e, "dispatcher already shut down");
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), FleetError> {
        for chunk in chunk_message(text) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .map_err(|e| FleetError::Transport(self.team_id.clone(), e.to_string()))?;
        }
        Ok(())
    }
}

/// Builds one [`TelegramBotWorker`] per team, sharing a single
/// [`MessageRouter`] since routing is stateless and keyed by `team_id` in
/// the inbound message, not by which bot token received it.
pub struct TelegramBotWorkerFactory {
    router: Arc<MessageRouter>,
}

impl TelegramBotWorkerFactory {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl BotWorkerFactory for TelegramBotWorkerFactory {
    async fn create(&self, team: Team) -> Result<Arc<dyn BotWorker>, FleetError> {
        let bot = Bot::new(team.bot_token.clone());
        Ok(Arc::new(TelegramBotWorker::new(team.team_id, bot, self.router.clone())))
    }
}
