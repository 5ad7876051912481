//! Ordered lifecycle callbacks.
//!
//! Callbacks for a hook run synchronously, lowest priority first; equal
//! priorities run in registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::component::Stage;
use crate::core::SchemaVersion;

pub const DEFAULT_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Activation,
    Deactivation,
    Uninstall,
    PreSchemaUpgrade,
    SchemaInstalled,
    StepApplied,
    VersionBumped,
    UpgradeFailed,
    AddOptions,
    DeleteOptions,
    ComponentStage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Activation,
    Deactivation,
    Uninstall,
    PreSchemaUpgrade {
        from: Option<SchemaVersion>,
        to: SchemaVersion,
    },
    SchemaInstalled {
        components: Vec<String>,
    },
    StepApplied {
        threshold: SchemaVersion,
        name: String,
    },
    VersionBumped {
        from: Option<SchemaVersion>,
        to: SchemaVersion,
    },
    UpgradeFailed {
        error: String,
    },
    AddOptions,
    DeleteOptions,
    ComponentStage {
        component: String,
        stage: Stage,
    },
}

impl HookEvent {
    pub fn hook(&self) -> Hook {
        match self {
            HookEvent::Activation => Hook::Activation,
            HookEvent::Deactivation => Hook::Deactivation,
            HookEvent::Uninstall => Hook::Uninstall,
            HookEvent::PreSchemaUpgrade { .. } => Hook::PreSchemaUpgrade,
            HookEvent::SchemaInstalled { .. } => Hook::SchemaInstalled,
            HookEvent::StepApplied { .. } => Hook::StepApplied,
            HookEvent::VersionBumped { .. } => Hook::VersionBumped,
            HookEvent::UpgradeFailed { .. } => Hook::UpgradeFailed,
            HookEvent::AddOptions => Hook::AddOptions,
            HookEvent::DeleteOptions => Hook::DeleteOptions,
            HookEvent::ComponentStage { .. } => Hook::ComponentStage,
        }
    }
}

pub type HookCallback = Arc<dyn Fn(&HookEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Clone)]
struct Registration {
    id: HookId,
    priority: i32,
    callback: HookCallback,
}

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<Hook, Vec<Registration>>,
    next_id: u64,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(h, regs)| (*h, regs.len())).collect();
        f.debug_struct("HookRegistry").field("callbacks", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` on `hook` at the default priority.
    pub fn add<F>(&mut self, hook: Hook, callback: F) -> HookId
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        self.add_with_priority(hook, DEFAULT_PRIORITY, callback)
    }

    pub fn add_with_priority<F>(&mut self, hook: Hook, priority: i32, callback: F) -> HookId
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        let id = HookId(self.next_id);
        self.next_id += 1;

        let registrations = self.hooks.entry(hook).or_default();
        // After every registration of the same or lower priority.
        let at = registrations.partition_point(|r| r.priority <= priority);
        registrations.insert(
            at,
            Registration {
                id,
                priority,
                callback: Arc::new(callback),
            },
        );
        id
    }

    pub fn remove(&mut self, id: HookId) -> bool {
        for registrations in self.hooks.values_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn has(&self, hook: Hook) -> bool {
        self.count(hook) > 0
    }

    pub fn count(&self, hook: Hook) -> usize {
        self.hooks.get(&hook).map_or(0, Vec::len)
    }

    pub fn fire(&self, event: &HookEvent) {
        let Some(registrations) = self.hooks.get(&event.hook()) else {
            return;
        };
        for registration in registrations {
            (registration.callback)(event);
        }
    }
}
