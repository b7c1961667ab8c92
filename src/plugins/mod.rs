//! Plugin lifecycle management.
//!
//! Plugins contribute commands to the registry. The lifecycle is:
//! constructed (disabled) -> `load` builds the command set from resolved
//! settings -> `enable` marks the plugin an active source -> `disable`
//! removes it. After any change to the active set the command registry is
//! rebuilt, so a disabled plugin can never leave orphaned commands behind.

mod echo;
mod eightball;
mod settings;

pub use echo::EchoPlugin;
pub use eightball::EightBallPlugin;
pub use settings::{PluginSetting, SettingKind, SettingValue, SettingsMap, resolve_settings};

use crate::commands::{CommandRegistry, CommandSource, Outbound};
use crate::config::PluginsConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A source of commands with a managed lifecycle.
pub trait Plugin: Send + Sync {
    /// Stable identifier, used in config and for parent/child links.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// One-line description.
    #[allow(dead_code)] // shown by a future plugin listing command
    fn description(&self) -> &'static str;

    /// Declared settings; resolved against config overrides before `load`.
    fn settings_spec(&self) -> Vec<PluginSetting> {
        Vec::new()
    }

    /// Id of the plugin this one extends, if any. A child whose parent is
    /// not enabled is removed during reload.
    fn parent_id(&self) -> Option<&'static str> {
        None
    }

    /// Build the plugin's command set from its resolved settings.
    fn load(&mut self, settings: &SettingsMap);

    /// The commands this plugin contributes, in registration order.
    fn commands(&self) -> CommandSource;

    /// The plugin became an active source.
    fn enable(&mut self, _chat: &Arc<dyn Outbound>) {}

    /// The plugin is no longer an active source.
    fn disable(&mut self, _chat: &Arc<dyn Outbound>) {}

    /// Called once after the whole enabled set (including children) is wired.
    fn on_loaded(&mut self) {}
}

/// Owns every known plugin and tracks which are enabled.
pub struct PluginManager {
    all: Vec<Box<dyn Plugin>>,
    /// Indices into `all`, in registration (enable) order.
    enabled: Vec<usize>,
    /// Parent id -> ids of enabled children, rebuilt on reload.
    children: HashMap<&'static str, Vec<&'static str>>,
}

impl PluginManager {
    pub fn new(all: Vec<Box<dyn Plugin>>) -> Self {
        Self {
            all,
            enabled: Vec::new(),
            children: HashMap::new(),
        }
    }

    /// The built-in plugin set.
    pub fn with_builtin_plugins() -> Self {
        Self::new(vec![
            Box::new(EchoPlugin::new()),
            Box::new(EightBallPlugin::new()),
        ])
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.all.iter().position(|p| p.id() == id)
    }

    #[allow(dead_code)] // runtime plugin management surface
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled
            .iter()
            .any(|&idx| self.all[idx].id() == id)
    }

    /// Enabled children of the given plugin.
    #[allow(dead_code)] // runtime plugin management surface
    pub fn children_of(&self, id: &str) -> &[&'static str] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tear down and rebuild the enabled set from configuration, then
    /// rebuild the command registry.
    pub fn reload(
        &mut self,
        config: &PluginsConfig,
        chat: &Arc<dyn Outbound>,
        registry: &CommandRegistry,
    ) {
        // Disable everything first; a reload starts from a clean slate.
        let enabled = std::mem::take(&mut self.enabled);
        for idx in enabled {
            self.all[idx].disable(chat);
        }

        for id in &config.enabled {
            let Some(idx) = self.index_of(id) else {
                error!(plugin = %id, "no plugin with this id");
                continue;
            };
            if self.enabled.contains(&idx) {
                error!(plugin = %id, "plugin listed twice in config");
                continue;
            }

            let plugin = &mut self.all[idx];
            let resolved = resolve_settings(
                plugin.id(),
                &plugin.settings_spec(),
                config.settings.get(plugin.id()),
            );
            plugin.load(&resolved);
            plugin.enable(chat);
            debug!(plugin = %id, name = plugin.name(), "plugin enabled");
            self.enabled.push(idx);
        }

        self.link_children(chat);

        for &idx in &self.enabled {
            self.all[idx].on_loaded();
        }

        self.rebuild_registry(registry);
        info!(enabled = self.enabled.len(), "plugins reloaded");
    }

    /// Enable one plugin at runtime.
    #[allow(dead_code)] // runtime plugin management surface
    pub fn enable_plugin(
        &mut self,
        id: &str,
        overrides: Option<&toml::value::Table>,
        chat: &Arc<dyn Outbound>,
        registry: &CommandRegistry,
    ) -> bool {
        let Some(idx) = self.index_of(id) else {
            error!(plugin = %id, "no plugin with this id");
            return false;
        };
        if self.enabled.contains(&idx) {
            error!(plugin = %id, "plugin is already enabled");
            return false;
        }

        let plugin = &mut self.all[idx];
        let resolved = resolve_settings(plugin.id(), &plugin.settings_spec(), overrides);
        plugin.load(&resolved);
        plugin.enable(chat);
        self.enabled.push(idx);

        self.link_children(chat);
        self.rebuild_registry(registry);
        true
    }

    /// Disable one plugin at runtime. The registry rebuild guarantees its
    /// commands are gone from the merged table.
    #[allow(dead_code)] // runtime plugin management surface
    pub fn disable_plugin(
        &mut self,
        id: &str,
        chat: &Arc<dyn Outbound>,
        registry: &CommandRegistry,
    ) -> bool {
        let Some(idx) = self.index_of(id) else {
            error!(plugin = %id, "no plugin with this id");
            return false;
        };
        let Some(pos) = self.enabled.iter().position(|&i| i == idx) else {
            error!(plugin = %id, "plugin is not enabled");
            return false;
        };

        self.all[idx].disable(chat);
        self.enabled.remove(pos);

        self.link_children(chat);
        self.rebuild_registry(registry);
        true
    }

    /// Resolve parent/child links by id and drop children whose parent is
    /// not enabled.
    fn link_children(&mut self, chat: &Arc<dyn Outbound>) {
        self.children.clear();

        let enabled_ids: Vec<&'static str> =
            self.enabled.iter().map(|&idx| self.all[idx].id()).collect();

        let mut orphans = Vec::new();
        for &idx in &self.enabled {
            if let Some(parent) = self.all[idx].parent_id() {
                if enabled_ids.contains(&parent) {
                    self.children
                        .entry(parent)
                        .or_default()
                        .push(self.all[idx].id());
                } else {
                    orphans.push(idx);
                }
            }
        }

        for idx in orphans {
            error!(
                plugin = %self.all[idx].id(),
                "parent plugin is not enabled, disabling"
            );
            self.all[idx].disable(chat);
            self.enabled.retain(|&i| i != idx);
        }
    }

    fn rebuild_registry(&self, registry: &CommandRegistry) {
        let sources: Vec<CommandSource> = self
            .enabled
            .iter()
            .map(|&idx| self.all[idx].commands())
            .collect();
        registry.rebuild(&sources);
    }
}
