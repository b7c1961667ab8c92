//! Actions: the callable payload of a command.
//!
//! An action is either a plain callback or a composite of several callbacks
//! run in registration order. Composites are what lets multiple plugins
//! contribute alternate behavior under one invocation token: merging two
//! composite commands appends sub-actions instead of replacing the command.

use crate::error::SendError;
use std::sync::Arc;
use stray_proto::Message;
use tracing::warn;

/// Outbound surface of the connection manager, as seen by commands and
/// plugins. Narrow on purpose: actions reply, join and shut down, nothing
/// else, and tests substitute a recorder.
pub trait Outbound: Send + Sync {
    /// Send a chat message. Deferred internally when rate limited.
    fn privmsg(&self, channel: &str, text: &str) -> Result<(), SendError>;
    /// Join a channel. Rate-limit denial propagates to the caller.
    fn join_channel(&self, channel: &str) -> Result<(), SendError>;
    /// Begin client shutdown.
    fn request_quit(&self);
}

/// Everything an action gets to see about its invocation.
#[derive(Clone)]
pub struct CommandContext {
    /// Outbound path for replies.
    pub chat: Arc<dyn Outbound>,
    /// Nickname that invoked the command.
    pub invoker: String,
    /// Channel the command arrived on.
    pub channel: String,
    /// Text after the invocation token, trimmed.
    pub args: String,
    /// The full inbound frame.
    pub message: Message,
}

impl CommandContext {
    /// Reply into the channel the command came from. Send failures are
    /// logged; the outbound path has its own retry behavior.
    pub fn say(&self, text: &str) {
        if let Err(e) = self.chat.privmsg(&self.channel, text) {
            warn!(
                channel = %self.channel,
                code = e.error_code(),
                error = %e,
                "failed to send reply"
            );
        }
    }
}

/// A plain action callback.
pub type ActionFn = dyn Fn(&CommandContext) -> anyhow::Result<()> + Send + Sync;

/// Wrap a closure as a shareable sub-action.
pub fn sub_action<F>(f: F) -> Arc<ActionFn>
where
    F: Fn(&CommandContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A composite action: sub-actions invoked in registration order.
///
/// Sub-actions appended by a registry merge sit after the composite's own
/// base set; [`MultiAction::reset`] drops them again so a rebuild never
/// double-appends.
#[derive(Clone)]
pub struct MultiAction {
    actions: Vec<Arc<ActionFn>>,
    base: usize,
}

impl MultiAction {
    /// A composite over its own base sub-actions.
    pub fn new(actions: Vec<Arc<ActionFn>>) -> Self {
        let base = actions.len();
        Self { actions, base }
    }

    /// Drop everything appended since construction.
    pub fn reset(&mut self) {
        self.actions.truncate(self.base);
    }

    /// Append another composite's sub-actions after this one's.
    pub fn append(&mut self, actions: &[Arc<ActionFn>]) {
        self.actions.extend(actions.iter().map(Arc::clone));
    }

    /// The current sub-action list.
    pub fn actions(&self) -> &[Arc<ActionFn>] {
        &self.actions
    }
}

/// The callable payload of a command.
#[derive(Clone)]
pub enum Action {
    /// A single callback.
    Func(Arc<ActionFn>),
    /// A composite of callbacks.
    Multi(MultiAction),
}

impl Action {
    /// A plain action from a closure.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&CommandContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Action::Func(Arc::new(f))
    }

    /// A composite action from sub-actions.
    pub fn multi(actions: Vec<Arc<ActionFn>>) -> Self {
        Action::Multi(MultiAction::new(actions))
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Action::Multi(_))
    }

    /// Reset any merge-appended sub-actions. No-op for plain actions.
    pub fn reset(&mut self) {
        if let Action::Multi(multi) = self {
            multi.reset();
        }
    }

    /// Run the action. Each callback is isolated: an error is logged and
    /// the remaining sub-actions still run.
    pub fn run(&self, ctx: &CommandContext) {
        match self {
            Action::Func(f) => {
                if let Err(e) = f.as_ref()(ctx) {
                    warn!(invoker = %ctx.invoker, channel = %ctx.channel, error = %e, "command action failed");
                }
            }
            Action::Multi(multi) => {
                for f in multi.actions() {
                    if let Err(e) = f.as_ref()(ctx) {
                        warn!(invoker = %ctx.invoker, channel = %ctx.channel, error = %e, "command sub-action failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    pub(crate) struct RecordingChat {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingChat {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl Outbound for RecordingChat {
        fn privmsg(&self, channel: &str, text: &str) -> Result<(), SendError> {
            self.sent.lock().push((channel.to_string(), text.to_string()));
            Ok(())
        }

        fn join_channel(&self, _channel: &str) -> Result<(), SendError> {
            Ok(())
        }

        fn request_quit(&self) {}
    }

    fn ctx(chat: Arc<dyn Outbound>) -> CommandContext {
        CommandContext {
            chat,
            invoker: "alice".to_string(),
            channel: "#chan".to_string(),
            args: String::new(),
            message: Message::privmsg("#chan", "!test"),
        }
    }

    #[test]
    fn multi_runs_sub_actions_in_order_and_isolates_errors() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);

        let action = Action::multi(vec![
            sub_action(move |_| {
                a.lock().push("first");
                anyhow::bail!("first fails")
            }),
            sub_action(move |_| {
                b.lock().push("second");
                Ok(())
            }),
        ]);

        action.run(&ctx(RecordingChat::new()));
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn reset_drops_appended_sub_actions_only() {
        let mut base = MultiAction::new(vec![sub_action(|_| Ok(()))]);
        base.append(&[sub_action(|_| Ok(())), sub_action(|_| Ok(()))]);
        assert_eq!(base.actions().len(), 3);

        base.reset();
        assert_eq!(base.actions().len(), 1);
    }

    #[test]
    fn say_sends_to_the_origin_channel() {
        let chat = RecordingChat::new();
        ctx(Arc::clone(&chat) as Arc<dyn Outbound>).say("hi");
        assert_eq!(*chat.sent.lock(), vec![("#chan".to_string(), "hi".to_string())]);
    }
}
