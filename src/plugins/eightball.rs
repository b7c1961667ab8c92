//! 8-ball plugin: answer a question with a random phrase.

use super::settings::{PluginSetting, SettingKind, SettingValue, SettingsMap};
use super::Plugin;
use crate::commands::{Action, Command, CommandContext, CommandOptions, CommandSource, sub_action};
use rand::seq::SliceRandom;
use std::sync::Arc;

const PHRASES: &[&str] = &[
    "sure",
    "are you kidding?!",
    "yeah",
    "no",
    "i think so",
    "don't bet on it",
    "doubtful",
    "for sure",
    "forget about it",
    "maybe",
    "it is so",
    "leaning towards no",
    "look deep in your heart and you will see the answer",
    "most definitely",
    "most likely",
    "my sources say yes",
    "never",
    "outlook good",
    "outlook not so good",
    "perhaps",
    "that's a tough one",
    "the heavens point to yes",
    "who knows?",
    "without a doubt",
    "you will have to wait",
];

pub struct EightBallPlugin {
    commands: CommandSource,
}

impl EightBallPlugin {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl Default for EightBallPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for EightBallPlugin {
    fn id(&self) -> &'static str {
        "eightball"
    }

    fn name(&self) -> &'static str {
        "8-ball"
    }

    fn description(&self) -> &'static str {
        "Gives admins access to the !8ball command"
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

        // Composite on purpose: other plugins can stack their own phrasings
        // under the same token and the registry merge will concatenate them.
        let answer = sub_action(|ctx: &CommandContext| {
            if ctx.args.is_empty() {
                return Ok(());
            }
            if let Some(phrase) = PHRASES.choose(&mut rand::thread_rng()) {
                ctx.say(&format!("{}, the 8-ball says... {phrase}", ctx.invoker));
            }
            Ok(())
        });

        self.commands = vec![(
            "8ball".to_string(),
            Arc::new(Command::new(
                "8ball",
                Action::multi(vec![answer]),
                CommandOptions {
                    description: Some(
                        "Need help with a decision? Ask the !8ball".to_string(),
                    ),
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
