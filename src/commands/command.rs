//! The command model.

use super::action::{Action, ActionFn, CommandContext};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cooldown applied when a command doesn't specify one.
pub const DEFAULT_COOLDOWN_SECS: f64 = 5.0;

/// Optional knobs for a command. Negative cooldowns are clamped to zero.
#[derive(Clone)]
pub struct CommandOptions {
    /// Stable identifier assigned by the command's source, if it has one.
    pub id: Option<u32>,
    pub description: Option<String>,
    pub cooldown_secs: f64,
    pub enabled: bool,
    /// Run the action off the dispatch path, on the scheduler.
    pub run_in_background: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            id: None,
            description: None,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            enabled: true,
            run_in_background: false,
        }
    }
}

/// An invocable command.
///
/// Owned by whichever source created it (the internal table or a plugin);
/// the registry's merged table holds shared references. The action sits
/// behind a lock because composite merges mutate it, and `last_run` is
/// mutated from both the foreground loop and background executions.
pub struct Command {
    id: Option<u32>,
    token: String,
    description: Option<String>,
    cooldown: Duration,
    enabled: bool,
    run_in_background: bool,
    action: RwLock<Action>,
    last_run: Mutex<Option<Instant>>,
}

impl Command {
    pub fn new(token: impl Into<String>, action: Action, options: CommandOptions) -> Self {
        let cooldown = if options.cooldown_secs > 0.0 {
            Duration::from_secs_f64(options.cooldown_secs)
        } else {
            Duration::ZERO
        };
        Self {
            id: options.id,
            token: token.into(),
            description: options.description,
            cooldown,
            enabled: options.enabled,
            run_in_background: options.run_in_background,
            action: RwLock::new(action),
            last_run: Mutex::new(None),
        }
    }

    /// A command wrapping a plain callback.
    pub fn raw<F>(token: impl Into<String>, f: F, options: CommandOptions) -> Self
    where
        F: Fn(&CommandContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(token, Action::func(f), options)
    }

    #[allow(dead_code)] // introspection surface for a future help command
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    #[allow(dead_code)] // introspection surface for a future help command
    pub fn token(&self) -> &str {
        &self.token
    }

    #[allow(dead_code)] // introspection surface for a future help command
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn run_in_background(&self) -> bool {
        self.run_in_background
    }

    #[allow(dead_code)] // introspection surface for a future help command
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_multi(&self) -> bool {
        self.action.read().is_multi()
    }

    /// Drop merge-appended sub-actions, restoring the action's base set.
    pub fn reset_action(&self) {
        self.action.write().reset();
    }

    /// Clone of the composite's sub-action list, if this is a composite.
    pub fn sub_actions(&self) -> Option<Vec<Arc<ActionFn>>> {
        match &*self.action.read() {
            Action::Multi(multi) => Some(multi.actions().to_vec()),
            Action::Func(_) => None,
        }
    }

    /// Append sub-actions to this command's composite. No-op for plain
    /// actions; the merge only calls this for composite-composite pairs.
    pub fn append_sub_actions(&self, actions: &[Arc<ActionFn>]) {
        if let Action::Multi(multi) = &mut *self.action.write() {
            multi.append(actions);
        }
    }

    /// Snapshot of the action for running without holding the lock.
    pub fn action_snapshot(&self) -> Action {
        self.action.read().clone()
    }

    /// Time left on the cooldown, or `None` when the command may run.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last_run = self.last_run.lock();
        let last = (*last_run)?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Record a run. `last_run` only ever moves forward, even when a
    /// background execution stamps out of order.
    pub fn stamp_last_run(&self, now: Instant) {
        let mut last_run = self.last_run.lock();
        *last_run = Some(match *last_run {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}
