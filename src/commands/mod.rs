//! Command model, merge algorithm and execution path.

mod action;
mod command;
mod registry;

pub use action::{Action, ActionFn, CommandContext, MultiAction, Outbound, sub_action};
pub use command::{Command, CommandOptions, DEFAULT_COOLDOWN_SECS};
pub use registry::{CommandRegistry, CommandSource};
