//! Composition root and foreground dispatch loop.
//!
//! `Bot::new` wires every component explicitly - scheduler, event registry,
//! send gate, connection manager, command registry, plugins - with no
//! process-wide state. `Bot::run` owns the foreground loop: it blocks on
//! the transport event channel and dispatches inbound frames through an
//! explicit match, so an unknown event type is one well-defined fall-through
//! rather than a silent lookup miss.

use crate::commands::{CommandContext, CommandRegistry, Outbound};
use crate::config::Config;
use crate::events::{ChatEvent, EventRegistry, ON_MESSAGE, ON_PUBMSG, ON_QUIT, Verdict};
use crate::network::{Client, TransportEvent};
use crate::plugins::PluginManager;
use crate::scheduler::Scheduler;
use std::sync::Arc;
use stray_proto::{Command, Message, RPL_WELCOME};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the inbound transport event channel.
const EVENT_CHANNEL_SIZE: usize = 1024;

pub struct Bot {
    config: Config,
    scheduler: Arc<Scheduler>,
    events: Arc<EventRegistry>,
    registry: Arc<CommandRegistry>,
    #[allow(dead_code)] // runtime enable/disable surface, exercised in tests
    plugins: PluginManager,
    client: Arc<Client>,
    rx: mpsc::Receiver<TransportEvent>,
    prefix: char,
}

impl Bot {
    pub fn new(config: Config) -> Self {
        let scheduler = Arc::new(Scheduler::new());

        let events = Arc::new(EventRegistry::new());
        events.create_event(ON_PUBMSG);
        events.create_event(ON_MESSAGE);
        events.create_event(ON_QUIT);

        let (event_tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let client = Client::new(&config, Arc::clone(&scheduler), Arc::clone(&events), event_tx);

        let registry = Arc::new(CommandRegistry::new());
        let mut plugins = PluginManager::with_builtin_plugins();
        let chat: Arc<dyn Outbound> = client.clone();
        plugins.reload(&config.plugins, &chat, &registry);

        let prefix = config.bot.prefix_char();

        Self {
            config,
            scheduler,
            events,
            registry,
            plugins,
            client,
            rx,
            prefix,
        }
    }

    #[allow(dead_code)] // readiness probe, `run` performs the same check
    pub fn is_ready(&self) -> bool {
        self.config.ready_errors().is_empty()
    }

    /// Connect and run the foreground loop until `quit` is requested.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let problems = self.config.ready_errors();
        if !problems.is_empty() {
            for problem in problems {
                error!(problem, "configuration incomplete");
            }
            error!("bot is not ready, refusing to start");
            return Ok(());
        }

        if let Err(e) = self.client.start().await {
            // Cannot happen on the first call; logged for completeness.
            warn!(code = e.error_code(), "initial connect deferred");
        }

        let shutdown = self.client.shutdown_token();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(TransportEvent::Message(message)) => self.dispatch(message),
                    Some(TransportEvent::Disconnected { generation, reason }) => {
                        self.client.handle_disconnect(generation, &reason).await;
                    }
                    None => break,
                },
            }
        }

        info!("bot stopped");
        Ok(())
    }

    /// Route one inbound frame.
    fn dispatch(&self, message: Message) {
        match &message.command {
            Command::PING(token) => self.client.pong(token),
            Command::Response(code, _) if *code == RPL_WELCOME => self.client.handle_welcome(),
            Command::PRIVMSG(target, text) => self.handle_privmsg(&message, target, text),
            other => trace!(command = ?other, "unhandled inbound frame"),
        }
    }

    fn handle_privmsg(&self, message: &Message, channel: &str, text: &str) {
        let Some(source) = message.source_nickname() else {
            return;
        };
        // The relay echoes our own messages back; never react to them.
        if source.eq_ignore_ascii_case(&self.config.server.nick) {
            return;
        }

        let pubmsg = ChatEvent::Pubmsg {
            source: source.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        };
        if self.events.trigger(ON_PUBMSG, true, &pubmsg) == Verdict::Reject {
            debug!(source = %source, "message vetoed by an on_pubmsg handler");
            return;
        }

        let msg_event = ChatEvent::Message {
            source: source.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
            message: message.clone(),
        };
        if self.events.trigger(ON_MESSAGE, true, &msg_event) == Verdict::Reject {
            debug!(source = %source, "message vetoed by an on_message handler");
            return;
        }

        let Some((token, args)) = parse_command(text, self.prefix) else {
            return;
        };

        let ctx = CommandContext {
            chat: self.client.clone(),
            invoker: source.to_string(),
            channel: channel.to_string(),
            args: args.to_string(),
            message: message.clone(),
        };
        let attempted =
            self.registry
                .execute(token, ctx, self.is_admin(source), &self.scheduler);
        if attempted {
            info!(command = %token, invoker = %source, "command executed");
        }
    }

    fn is_admin(&self, nick: &str) -> bool {
        self.config
            .bot
            .admins
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(nick))
    }
}

/// Split a chat line into an invocation token and its argument text, if the
/// line starts with the command prefix.
fn parse_command(text: &str, prefix: char) -> Option<(&str, &str)> {
    let rest = text.trim().strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, ' ');
    let token = parts.next().filter(|t| !t.is_empty())?;
    let args = parts.next().unwrap_or("").trim();
    Some((token, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_splits_token_and_args() {
        assert_eq!(parse_command("!echo hi there", '!'), Some(("echo", "hi there")));
        assert_eq!(parse_command("!quit", '!'), Some(("quit", "")));
        assert_eq!(parse_command("  !join chan  ", '!'), Some(("join", "chan")));
    }

    #[test]
    fn parse_command_ignores_unprefixed_text() {
        assert_eq!(parse_command("hello !echo", '!'), None);
        assert_eq!(parse_command("", '!'), None);
        assert_eq!(parse_command("!", '!'), None);
    }

    #[test]
    fn parse_command_respects_the_configured_prefix() {
        assert_eq!(parse_command("?echo hi", '?'), Some(("echo", "hi")));
        assert_eq!(parse_command("!echo hi", '?'), None);
    }

    #[tokio::test]
    async fn bot_refuses_to_run_when_not_ready() {
        let bot = Bot::new(Config::default());
        assert!(!bot.is_ready());
        // Completes without connecting anywhere.
        bot.run().await.unwrap();
    }

    #[tokio::test]
    async fn admin_check_is_case_insensitive() {
        let mut config = Config::default();
        config.bot.admins = vec!["Alice".to_string()];
        let bot = Bot::new(config);

        assert!(bot.is_admin("alice"));
        assert!(bot.is_admin("ALICE"));
        assert!(!bot.is_admin("bob"));
    }
}
