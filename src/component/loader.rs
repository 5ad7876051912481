use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::warn;
use tracing::{Level, event};

use super::ComponentSet;
use crate::config::UpgradeConfig;
use crate::core::ComponentError;
use crate::hooks::{DEFAULT_PRIORITY, HookEvent, HookRegistry};

/// Bootstrap stages, in the order the loader runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Includes,
    SetupGlobals,
    SetupCacheGroups,
    SetupNav,
    SetupAdminBar,
    SetupTitle,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Includes,
        Stage::SetupGlobals,
        Stage::SetupCacheGroups,
        Stage::SetupNav,
        Stage::SetupAdminBar,
        Stage::SetupTitle,
    ];

    pub fn default_priority(self) -> i32 {
        match self {
            Stage::Includes => 8,
            _ => DEFAULT_PRIORITY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Includes => "includes",
            Stage::SetupGlobals => "setup_globals",
            Stage::SetupCacheGroups => "setup_cache_groups",
            Stage::SetupNav => "setup_nav",
            Stage::SetupAdminBar => "setup_admin_bar",
            Stage::SetupTitle => "setup_title",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description a component hands to the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentParams {
    pub slug: Option<String>,
    pub root_slug: Option<String>,
    pub has_directory: bool,
    pub search_query_arg: Option<String>,
    /// Table key -> suffix under `{prefix}bp_`.
    pub global_tables: Vec<(String, String)>,
    pub meta_tables: Vec<(String, String)>,
    /// Components that must be active for this one to boot.
    pub requires: Vec<String>,
    /// Priority of the admin bar stage, lets menus order themselves.
    pub adminbar_order: Option<i32>,
}

/// Globals resolved for a component during [`Stage::SetupGlobals`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentGlobals {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub root_slug: String,
    pub has_directory: bool,
    pub search_query_arg: String,
    pub global_tables: BTreeMap<String, String>,
    pub meta_tables: BTreeMap<String, String>,
}

impl ComponentGlobals {
    fn resolve(id: &str, name: &str, params: &ComponentParams, config: &UpgradeConfig) -> Self {
        let slug = params.slug.clone().unwrap_or_else(|| id.to_string());
        let root_slug = params.root_slug.clone().unwrap_or_else(|| slug.clone());
        let search_query_arg = params
            .search_query_arg
            .clone()
            .unwrap_or_else(|| format!("{}_search", id.replace('-', "_")));

        let prefix_all = |tables: &[(String, String)]| -> BTreeMap<String, String> {
            tables
                .iter()
                .map(|(key, suffix)| (key.clone(), config.table_name(suffix)))
                .collect()
        };

        Self {
            id: id.to_string(),
            name: name.to_string(),
            slug,
            root_slug,
            has_directory: params.has_directory,
            search_query_arg,
            global_tables: prefix_all(&params.global_tables),
            meta_tables: prefix_all(&params.meta_tables),
        }
    }
}

/// A pluggable component. Every stage callback defaults to a no-op.
pub trait Component: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn params(&self) -> ComponentParams {
        ComponentParams::default()
    }

    fn includes(&mut self) {}

    fn setup_globals(&mut self, _globals: &ComponentGlobals) {}

    fn setup_cache_groups(&mut self) {}

    fn setup_nav(&mut self) {}

    fn setup_admin_bar(&mut self) {}

    fn setup_title(&mut self) {}
}

/// Component with no behavior beyond its descriptor.
#[derive(Debug, Clone)]
pub struct BuiltinComponent {
    id: String,
    name: String,
    params: ComponentParams,
}

impl BuiltinComponent {
    pub fn new(id: &str, name: &str, params: ComponentParams) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            params,
        }
    }
}

impl Component for BuiltinComponent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> ComponentParams {
        self.params.clone()
    }
}

fn tables(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn directory(global: &[(&str, &str)], meta: &[(&str, &str)]) -> ComponentParams {
    ComponentParams {
        has_directory: true,
        global_tables: tables(global),
        meta_tables: tables(meta),
        ..ComponentParams::default()
    }
}

/// The packaged components and the tables each one owns.
pub fn builtin_components() -> Vec<BuiltinComponent> {
    vec![
        BuiltinComponent::new("core", "BuddyPress Core", ComponentParams::default()),
        BuiltinComponent::new(
            "members",
            "Community Members",
            ComponentParams {
                has_directory: true,
                global_tables: tables(&[("table_name_signups", "signups")]),
                ..ComponentParams::default()
            },
        ),
        BuiltinComponent::new(
            "activity",
            "Activity Streams",
            directory(&[("table_name", "activity")], &[("activity", "activity_meta")]),
        ),
        BuiltinComponent::new(
            "blogs",
            "Site Tracking",
            ComponentParams {
                requires: vec!["activity".to_string()],
                ..directory(&[("table_name", "user_blogs")], &[("blog", "user_blogs_blogmeta")])
            },
        ),
        BuiltinComponent::new(
            "friends",
            "Friend Connections",
            ComponentParams {
                global_tables: tables(&[("table_name", "friends")]),
                ..ComponentParams::default()
            },
        ),
        BuiltinComponent::new(
            "groups",
            "User Groups",
            directory(
                &[("table_name", "groups"), ("table_name_members", "groups_members")],
                &[("group", "groups_groupmeta")],
            ),
        ),
        BuiltinComponent::new(
            "messages",
            "Private Messaging",
            ComponentParams {
                global_tables: tables(&[
                    ("table_name_notices", "messages_notices"),
                    ("table_name_messages", "messages_messages"),
                    ("table_name_recipients", "messages_recipients"),
                ]),
                meta_tables: tables(&[("message", "messages_meta")]),
                ..ComponentParams::default()
            },
        ),
        BuiltinComponent::new(
            "notifications",
            "Notifications",
            ComponentParams {
                global_tables: tables(&[("table_name", "notifications")]),
                ..ComponentParams::default()
            },
        ),
        BuiltinComponent::new("settings", "Account Settings", ComponentParams::default()),
        BuiltinComponent::new(
            "xprofile",
            "Extended Profiles",
            ComponentParams {
                slug: Some("profile".to_string()),
                global_tables: tables(&[
                    ("table_name_data", "xprofile_data"),
                    ("table_name_groups", "xprofile_groups"),
                    ("table_name_fields", "xprofile_fields"),
                ]),
                meta_tables: tables(&[("xprofile", "xprofile_meta")]),
                ..ComponentParams::default()
            },
        ),
    ]
}

struct Entry {
    component: Box<dyn Component>,
    params: ComponentParams,
    globals: Option<ComponentGlobals>,
}

/// Registers components and drives them through the bootstrap stages.
#[derive(Default)]
pub struct ComponentLoader {
    entries: Vec<Entry>,
}

impl ComponentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Result<Self, ComponentError> {
        let mut loader = Self::new();
        for component in builtin_components() {
            loader.register(Box::new(component))?;
        }
        Ok(loader)
    }

    pub fn register(&mut self, component: Box<dyn Component>) -> Result<(), ComponentError> {
        let id = component.id().to_string();
        if id.trim().is_empty() {
            return Err(ComponentError::EmptyId);
        }
        if self.entries.iter().any(|e| e.component.id() == id) {
            return Err(ComponentError::Duplicate(id));
        }
        let params = component.params();
        self.entries.push(Entry {
            component,
            params,
            globals: None,
        });
        Ok(())
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.component.id()).collect()
    }

    pub fn globals(&self, id: &str) -> Option<&ComponentGlobals> {
        self.entries
            .iter()
            .find(|e| e.component.id() == id)
            .and_then(|e| e.globals.as_ref())
    }

    /// Runs every stage for every bootable component and returns the ids booted.
    ///
    /// A component boots when it is active and all of its `requires` are
    /// active and registered.
    pub fn bootstrap(
        &mut self,
        active: &ComponentSet,
        config: &UpgradeConfig,
        hooks: &HookRegistry,
    ) -> Vec<String> {
        let bootable = self.bootable(active);

        for stage in Stage::ALL {
            let mut order: Vec<(i32, usize)> = bootable
                .iter()
                .map(|&idx| (self.priority_of(idx, stage), idx))
                .collect();
            // Stable: equal priorities keep registration order.
            order.sort_by_key(|(priority, _)| *priority);

            for (_, idx) in order {
                self.run_stage(idx, stage, config);
                let id = self.entries[idx].component.id().to_string();
                event!(Level::DEBUG, component = %id, stage = %stage, "component stage complete");
                hooks.fire(&HookEvent::ComponentStage {
                    component: id,
                    stage,
                });
            }
        }

        bootable
            .into_iter()
            .map(|idx| self.entries[idx].component.id().to_string())
            .collect()
    }

    fn bootable(&self, active: &ComponentSet) -> Vec<usize> {
        let registered: HashSet<&str> = self.entries.iter().map(|e| e.component.id()).collect();

        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| active.is_active(entry.component.id()))
            .filter(|(_, entry)| {
                let missing: Vec<&str> = entry
                    .params
                    .requires
                    .iter()
                    .map(String::as_str)
                    .filter(|dep| !active.is_active(dep) || !registered.contains(dep))
                    .collect();
                if !missing.is_empty() {
                    warn!(
                        "component '{}' skipped, missing dependencies: {}",
                        entry.component.id(),
                        missing.join(", ")
                    );
                }
                missing.is_empty()
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn priority_of(&self, idx: usize, stage: Stage) -> i32 {
        match stage {
            Stage::SetupAdminBar => self.entries[idx]
                .params
                .adminbar_order
                .unwrap_or_else(|| stage.default_priority()),
            _ => stage.default_priority(),
        }
    }

    fn run_stage(&mut self, idx: usize, stage: Stage, config: &UpgradeConfig) {
        let entry = &mut self.entries[idx];
        match stage {
            Stage::Includes => entry.component.includes(),
            Stage::SetupGlobals => {
                let globals = ComponentGlobals::resolve(
                    entry.component.id(),
                    entry.component.name(),
                    &entry.params,
                    config,
                );
                entry.component.setup_globals(&globals);
                entry.globals = Some(globals);
            }
            Stage::SetupCacheGroups => entry.component.setup_cache_groups(),
            Stage::SetupNav => entry.component.setup_nav(),
            Stage::SetupAdminBar => entry.component.setup_admin_bar(),
            Stage::SetupTitle => entry.component.setup_title(),
        }
    }
}
