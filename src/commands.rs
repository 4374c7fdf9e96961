//! Chat command handling: turns one incoming text message into replies,
//! county selection, and on-demand dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use korona_cases::MetricCache;
use korona_core::error::Result;
use korona_core::traits::{Transport, UserStore};
use korona_core::types::{IncomingMessage, UserTarget};
use korona_scheduler::{DispatchOutcome, Dispatcher, REGION_PROMPT};

const GREETING: &str = "😎";

pub const USAGE: &str = "Usage:\n\
    /county - gets or sets current county\n\
    /get - get today's data if you missed it\n\
    /stop - stop the daily notification";

const FAILED: &str = "Sorry, that did not work. Please try again later or pick your county with /county.";
const UNSUBSCRIBED: &str = "You will no longer get the daily notification. Send /start to subscribe again.";

/// What the user asked for. Also the key handlers are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    County,
    Usage,
    Get,
    Cancel,
    Stop,
    /// A `/command` the bot does not know.
    Unknown,
    /// Anything else is a county search.
    Search,
}

impl Command {
    /// First space-separated token decides; `/cmd@botname` counts as `/cmd`.
    pub fn parse(text: &str) -> Self {
        let token = text.trim().split(' ').next().unwrap_or_default();
        let name = token.split('@').next().unwrap_or_default();
        match name {
            "/start" => Command::Start,
            "/county" => Command::County,
            "/usage" | "/help" => Command::Usage,
            "/get" => Command::Get,
            "/cancel" => Command::Cancel,
            "/stop" => Command::Stop,
            other if other.starts_with('/') => Command::Unknown,
            _ => Command::Search,
        }
    }
}

/// A registered command handler.
pub type Handler = for<'a> fn(&'a Bot, &'a IncomingMessage) -> BoxFuture<'a, Result<()>>;

/// Reply text for a county search with several hits.
fn ambiguous_reply(matches: &[String]) -> String {
    format!(
        "Please be more specific. Found the following matches:\n{}",
        matches.join("\n")
    )
}

fn not_found_reply(query: &str) -> String {
    format!("No county found for \"{query}\". Try a name like \"LK Fulda\" or \"SK Kassel\".")
}

/// The bot's conversational side. One instance is shared by every message
/// task and by the daily batch (through the dispatcher).
pub struct Bot {
    users: Arc<dyn UserStore>,
    cases: Arc<MetricCache>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    handlers: HashMap<Command, Handler>,
}

impl Bot {
    pub fn new(
        users: Arc<dyn UserStore>,
        cases: Arc<MetricCache>,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let mut bot = Self {
            users,
            cases,
            transport,
            dispatcher,
            handlers: HashMap::new(),
        };
        bot.register(Command::Start, on_start);
        bot.register(Command::County, on_county);
        bot.register(Command::Usage, on_usage);
        bot.register(Command::Unknown, on_usage);
        bot.register(Command::Get, on_get);
        bot.register(Command::Cancel, on_cancel);
        bot.register(Command::Stop, on_stop);
        bot.register(Command::Search, on_search);
        bot
    }

    /// Route `command` to `handler`, replacing any earlier registration.
    pub fn register(&mut self, command: Command, handler: Handler) {
        self.handlers.insert(command, handler);
    }

    /// Handle one message. On error the chat still gets the generic failure
    /// reply; the error is returned for the caller to log.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<()> {
        let command = Command::parse(&msg.content);
        tracing::info!(
            "💬 [{}] {} ({}): {:?}",
            msg.channel,
            msg.chat_id,
            msg.sender_name.as_deref().unwrap_or("?"),
            command
        );

        let result = match self.handlers.get(&command) {
            Some(handler) => handler(self, msg).await,
            None => self.reply(&msg.chat_id, USAGE).await,
        };
        if let Err(e) = &result {
            tracing::warn!("⚠️ {command:?} failed for {}: {e}", msg.chat_id);
            if let Err(reply_err) = self.reply(&msg.chat_id, FAILED).await {
                tracing::debug!("Failure reply to {} not sent: {reply_err}", msg.chat_id);
            }
        }
        result
    }

    async fn reply(&self, chat: &str, text: &str) -> Result<()> {
        self.transport.send_text(chat, text).await
    }

    async fn start(&self, chat: &str) -> Result<()> {
        if self.users.get_user(chat).await?.is_none() {
            self.users.upsert(&UserTarget::unregistered(chat)).await?;
        }
        self.reply(chat, GREETING).await?;
        self.reply(chat, USAGE).await?;
        self.show_county(chat).await
    }

    async fn show_county(&self, chat: &str) -> Result<()> {
        let current = self.users.get_user(chat).await?.and_then(|u| u.region);
        let text = match current {
            Some(region) => format!("{REGION_PROMPT}\n\nCurrently selected: {region}"),
            None => REGION_PROMPT.to_string(),
        };
        self.reply(chat, &text).await
    }

    async fn stop(&self, chat: &str) -> Result<()> {
        self.users.delete(&UserTarget::unregistered(chat)).await?;
        tracing::info!("👋 User {chat} unsubscribed");
        self.reply(chat, UNSUBSCRIBED).await
    }

    async fn select_county(&self, chat: &str, query: &str) -> Result<()> {
        let matches = match self.cases.find_regions(query).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("⚠️ County search failed for {chat}: {e}");
                return self.reply(chat, FAILED).await;
            }
        };

        match matches.as_slice() {
            [] => self.reply(chat, &not_found_reply(query)).await,
            [county] => {
                let user = UserTarget::new(chat, Some(county.clone()));
                self.users.upsert(&user).await?;
                self.reply(chat, &format!("{county} selected")).await?;
                self.send_outcome(chat, &user).await
            }
            several => self.reply(chat, &ambiguous_reply(several)).await,
        }
    }

    /// On-demand dispatch for one chat (`/get`).
    async fn notify(&self, chat: &str) -> Result<()> {
        let user = self
            .users
            .get_user(chat)
            .await?
            .unwrap_or_else(|| UserTarget::unregistered(chat));
        self.send_outcome(chat, &user).await
    }

    async fn send_outcome(&self, chat: &str, user: &UserTarget) -> Result<()> {
        match self.dispatcher.dispatch_to_one(user).await {
            DispatchOutcome::Failed(_) => self.reply(chat, FAILED).await,
            DispatchOutcome::Delivered(_) | DispatchOutcome::NeedsRegion => Ok(()),
        }
    }
}

fn on_start<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.start(&msg.chat_id))
}

fn on_county<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.show_county(&msg.chat_id))
}

fn on_usage<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.reply(&msg.chat_id, USAGE))
}

fn on_get<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.notify(&msg.chat_id))
}

fn on_cancel<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.reply(&msg.chat_id, GREETING))
}

fn on_stop<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.stop(&msg.chat_id))
}

fn on_search<'a>(bot: &'a Bot, msg: &'a IncomingMessage) -> BoxFuture<'a, Result<()>> {
    Box::pin(bot.select_county(&msg.chat_id, msg.content.trim()))
}
