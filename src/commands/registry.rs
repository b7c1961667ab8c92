//! Command registry: merge algorithm and execution path.
//!
//! The merged lookup table is rebuilt whenever the active plugin set
//! changes: internal commands first, then every enabled plugin's commands in
//! registration order. Plain commands are last-writer-wins; composite meets
//! composite concatenates, so several plugins can stack behavior under one
//! token. The table is swapped wholesale under a write lock because it is
//! read from the foreground loop while background tasks run commands.

use super::action::CommandContext;
use super::command::{Command, CommandOptions};
use crate::scheduler::Scheduler;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// An ordered command source: (invocation token, command) pairs.
pub type CommandSource = Vec<(String, Arc<Command>)>;

/// Merged command lookup, combining the internal table and plugin tables.
pub struct CommandRegistry {
    internal: CommandSource,
    merged: RwLock<HashMap<String, Arc<Command>>>,
}

impl CommandRegistry {
    /// Registry seeded with the internal commands and no plugin sources.
    pub fn new() -> Self {
        let registry = Self {
            internal: internal_commands(),
            merged: RwLock::new(HashMap::new()),
        };
        registry.rebuild(&[]);
        registry
    }

    /// Rebuild the merged table from the internal commands plus the given
    /// plugin sources, in registration order.
    pub fn rebuild(&self, plugin_sources: &[CommandSource]) {
        let mut table = HashMap::new();
        for (token, cmd) in &self.internal {
            merge_command(&mut table, token, cmd);
        }
        for source in plugin_sources {
            for (token, cmd) in source {
                merge_command(&mut table, token, cmd);
            }
        }

        let count = table.len();
        *self.merged.write() = table;
        debug!(commands = count, "command table rebuilt");
    }

    /// Look up a token in the merged table.
    pub fn get(&self, token: &str) -> Option<Arc<Command>> {
        self.merged.read().get(token).cloned()
    }

    /// Execute a command by token.
    ///
    /// Unknown tokens are a silent no-op: not every prefixed word is a
    /// command. Disabled commands and non-admin invokers are denied without
    /// side effects or cooldown consumption. Returns whether execution was
    /// attempted.
    pub fn execute(
        &self,
        token: &str,
        ctx: CommandContext,
        is_admin: bool,
        scheduler: &Scheduler,
    ) -> bool {
        let Some(cmd) = self.get(token) else {
            return false;
        };

        if !cmd.is_enabled() {
            debug!(command = %token, "command is disabled");
            return false;
        }
        if !is_admin {
            debug!(command = %token, invoker = %ctx.invoker, "invoker is not an admin");
            return false;
        }

        let now = Instant::now();
        if let Some(remaining) = cmd.cooldown_remaining(now) {
            debug!(
                command = %token,
                remaining_secs = remaining.as_secs_f64(),
                "command on cooldown"
            );
            return false;
        }

        let action = cmd.action_snapshot();
        if cmd.run_in_background() {
            // Background commands stamp at dispatch time, not completion.
            cmd.stamp_last_run(now);
            debug!(command = %token, "running command on the scheduler");
            scheduler.execute_now("background-command", move || async move {
                action.run(&ctx);
                Ok(())
            });
        } else {
            action.run(&ctx);
            cmd.stamp_last_run(now);
        }

        true
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge one command into the output table.
fn merge_command(table: &mut HashMap<String, Arc<Command>>, token: &str, cmd: &Arc<Command>) {
    // Any sub-actions appended by a previous rebuild are dropped first.
    cmd.reset_action();

    if let Some(existing) = table.get(token) {
        if existing.is_multi() {
            if let Some(incoming) = cmd.sub_actions() {
                // Composite meets composite: concatenate, preserving order.
                if !Arc::ptr_eq(existing, cmd) {
                    existing.append_sub_actions(&incoming);
                }
                return;
            }
        }
    }
    table.insert(token.to_string(), Arc::clone(cmd));
}

/// Commands that are always present, independent of plugins.
fn internal_commands() -> CommandSource {
    let join = Arc::new(Command::raw(
        "join",
        |ctx: &CommandContext| {
            let Some(name) = ctx.args.split_whitespace().next() else {
                warn!("join command invoked without a channel");
                return Ok(());
            };
            let channel = if name.starts_with('#') {
                name.to_string()
            } else {
                format!("#{name}")
            };
            if let Err(e) = ctx.chat.join_channel(&channel) {
                warn!(channel = %channel, code = e.error_code(), error = %e, "join failed");
            }
            Ok(())
        },
        CommandOptions {
            description: Some("Join the specified channel".to_string()),
            ..Default::default()
        },
    ));

    let quit = Arc::new(Command::raw(
        "quit",
        |ctx: &CommandContext| {
            ctx.chat.request_quit();
            Ok(())
        },
        CommandOptions {
            description: Some("Shut down the bot".to_string()),
            ..Default::default()
        },
    ));

    vec![
        ("join".to_string(), join),
        ("quit".to_string(), Arc::clone(&quit)),
        // Alias sharing the same command object, cooldown included.
        ("stop".to_string(), quit),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::action::{Outbound, sub_action};
    use crate::error::SendError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use stray_proto::Message;

    struct RecordingChat {
        sent: Mutex<Vec<(String, String)>>,
        joined: Mutex<Vec<String>>,
        quit_requested: AtomicBool,
    }

    impl RecordingChat {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                joined: Mutex::new(Vec::new()),
                quit_requested: AtomicBool::new(false),
            })
        }
    }

    impl Outbound for RecordingChat {
        fn privmsg(&self, channel: &str, text: &str) -> Result<(), SendError> {
            self.sent.lock().push((channel.to_string(), text.to_string()));
            Ok(())
        }

        fn join_channel(&self, channel: &str) -> Result<(), SendError> {
            self.joined.lock().push(channel.to_string());
            Ok(())
        }

        fn request_quit(&self) {
            self.quit_requested.store(true, Ordering::SeqCst);
        }
    }

    fn ctx(chat: &Arc<RecordingChat>, args: &str) -> CommandContext {
        CommandContext {
            chat: Arc::clone(chat) as Arc<dyn Outbound>,
            invoker: "alice".to_string(),
            channel: "#chan".to_string(),
            args: args.to_string(),
            message: Message::privmsg("#chan", "irrelevant"),
        }
    }

    fn echo_source(reply: &'static str) -> CommandSource {
        vec![(
            "echo".to_string(),
            Arc::new(Command::raw(
                "echo",
                move |ctx: &CommandContext| {
                    ctx.say(reply);
                    Ok(())
                },
                CommandOptions {
                    cooldown_secs: 0.0,
                    ..Default::default()
                },
            )),
        )]
    }

    fn greet_source(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> CommandSource {
        let log = Arc::clone(log);
        vec![(
            "greet".to_string(),
            Arc::new(Command::new(
                "greet",
                crate::commands::Action::multi(vec![sub_action(move |_| {
                    log.lock().push(tag);
                    Ok(())
                })]),
                CommandOptions {
                    cooldown_secs: 0.0,
                    ..Default::default()
                },
            )),
        )]
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_token_is_a_silent_no_op() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        assert!(!registry.execute("nosuch", ctx(&chat, ""), true, &scheduler));
        assert!(chat.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_admins_are_denied_without_consuming_cooldown() {
        let registry = CommandRegistry::new();
        registry.rebuild(&[echo_source("hi")]);
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        assert!(!registry.execute("echo", ctx(&chat, ""), false, &scheduler));
        assert!(chat.sent.lock().is_empty());

        // The denied invocation left no cooldown behind.
        assert!(registry.execute("echo", ctx(&chat, ""), true, &scheduler));
        assert_eq!(chat.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_denies_then_allows() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        // `join` carries the default 5-second cooldown.
        assert!(registry.execute("join", ctx(&chat, "extra"), true, &scheduler));

        tokio::time::advance(Duration::from_millis(4900)).await;
        assert!(!registry.execute("join", ctx(&chat, "extra"), true, &scheduler));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(registry.execute("join", ctx(&chat, "extra"), true, &scheduler));

        assert_eq!(*chat.joined.lock(), vec!["#extra", "#extra"]);
    }

    #[tokio::test(start_paused = true)]
    async fn quit_and_stop_share_one_command() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        assert!(registry.execute("quit", ctx(&chat, ""), true, &scheduler));
        assert!(chat.quit_requested.load(Ordering::SeqCst));

        // The alias shares the command object, so its cooldown is shared too.
        assert!(!registry.execute("stop", ctx(&chat, ""), true, &scheduler));
    }

    #[tokio::test(start_paused = true)]
    async fn composite_commands_merge_across_sources() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.rebuild(&[greet_source(&log, "plugin-a"), greet_source(&log, "plugin-b")]);

        assert!(registry.execute("greet", ctx(&chat, ""), true, &scheduler));
        assert_eq!(*log.lock(), vec!["plugin-a", "plugin-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_resets_composite_accumulators() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sources = [greet_source(&log, "plugin-a"), greet_source(&log, "plugin-b")];
        registry.rebuild(&sources);
        registry.rebuild(&sources);

        assert!(registry.execute("greet", ctx(&chat, ""), true, &scheduler));
        // Two sub-actions, not four: the second rebuild reset the composite.
        assert_eq!(*log.lock(), vec!["plugin-a", "plugin-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn later_plain_command_replaces_earlier() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        registry.rebuild(&[echo_source("first"), echo_source("second")]);

        assert!(registry.execute("echo", ctx(&chat, ""), true, &scheduler));
        assert_eq!(
            *chat.sent.lock(),
            vec![("#chan".to_string(), "second".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn plain_command_replaces_composite() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut plain = echo_source("plain");
        plain[0].0 = "greet".to_string();
        registry.rebuild(&[greet_source(&log, "composite"), plain]);

        assert!(registry.execute("greet", ctx(&chat, ""), true, &scheduler));
        assert!(log.lock().is_empty());
        assert_eq!(chat.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_command_runs_on_the_scheduler() {
        let registry = CommandRegistry::new();
        let scheduler = Scheduler::new();
        let chat = RecordingChat::new();

        let source = vec![(
            "bg".to_string(),
            Arc::new(Command::raw(
                "bg",
                |ctx: &CommandContext| {
                    ctx.say("done");
                    Ok(())
                },
                CommandOptions {
                    run_in_background: true,
                    ..Default::default()
                },
            )),
        )];
        registry.rebuild(&[source]);

        assert!(registry.execute("bg", ctx(&chat, ""), true, &scheduler));
        // Dispatch-time cooldown stamp: denied before the action even runs.
        assert!(!registry.execute("bg", ctx(&chat, ""), true, &scheduler));

        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(chat.sent.lock().len(), 1);
    }
}
