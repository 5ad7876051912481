use crate::config::UpgradeConfig;
use crate::core::StoreResult;
use crate::hooks::HookRegistry;
use crate::install::Installer;
use crate::options;
use crate::storage::{OptionStore, SchemaBackend};

/// Everything a sequencer run, installer pass or migration step touches.
pub struct UpgradeContext {
    pub(crate) options: Box<dyn OptionStore>,
    pub(crate) schema: Box<dyn SchemaBackend>,
    pub(crate) hooks: HookRegistry,
    pub(crate) config: UpgradeConfig,
}

impl UpgradeContext {
    pub fn new(
        options: Box<dyn OptionStore>,
        schema: Box<dyn SchemaBackend>,
        config: UpgradeConfig,
    ) -> Self {
        Self {
            options,
            schema,
            hooks: HookRegistry::new(),
            config,
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn options(&self) -> &dyn OptionStore {
        self.options.as_ref()
    }

    pub fn options_mut(&mut self) -> &mut dyn OptionStore {
        self.options.as_mut()
    }

    pub fn schema(&self) -> &dyn SchemaBackend {
        self.schema.as_ref()
    }

    pub fn schema_mut(&mut self) -> &mut dyn SchemaBackend {
        self.schema.as_mut()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    pub fn installer(&self) -> Installer {
        Installer::new(&self.config)
    }

    /// Non-destructive seed of the default option table.
    pub fn seed_default_options(&mut self) -> StoreResult<usize> {
        options::add_default_options(self.options.as_mut(), &self.hooks, &self.config)
    }
}
