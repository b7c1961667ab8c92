//! Echo plugin: repeat the invoker's arguments back into the channel.

use super::settings::{PluginSetting, SettingKind, SettingValue, SettingsMap};
use super::Plugin;
use crate::commands::{Command, CommandContext, CommandOptions, CommandSource};
use std::sync::Arc;

pub struct EchoPlugin {
    commands: CommandSource,
}

impl EchoPlugin {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for EchoPlugin {
    fn id(&self) -> &'static str {
        "echo"
    }

    fn name(&self) -> &'static str {
        "Echo"
    }

    fn description(&self) -> &'static str {
        "Gives admins access to the !echo command"
    }

    fn settings_spec(&self) -> Vec<PluginSetting> {
        vec![PluginSetting {
            key: "online_global_cd",
            label: "Global cooldown (seconds)",
            kind: SettingKind::Number {
                min_value: Some(0),
                max_value: Some(120),
            },
            default: SettingValue::Number(4),
        }]
    }

    fn load(&mut self, settings: &SettingsMap) {
        let cooldown = settings
            .get("online_global_cd")
            .and_then(SettingValue::as_i64)
            .unwrap_or(4);

        self.commands = vec![(
            "echo".to_string(),
            Arc::new(Command::raw(
                "echo",
                |ctx: &CommandContext| {
                    if ctx.args.is_empty() {
                        return Ok(());
                    }
                    ctx.say(&ctx.args);
                    Ok(())
                },
                CommandOptions {
                    description: Some("Echo a phrase".to_string()),
                    cooldown_secs: cooldown as f64,
                    ..Default::default()
                },
            )),
        )];
    }

    fn commands(&self) -> CommandSource {
        self.commands.clone()
    }
}
