//! Default site options and typed accessors over an [`OptionStore`].

use log::warn;
use serde_json::{Value, json};

use crate::config::UpgradeConfig;
use crate::core::StoreResult;
use crate::hooks::{HookEvent, HookRegistry};
use crate::storage::OptionStore;

pub mod keys {
    pub const DB_VERSION: &str = "_bp_db_version";
    pub const ACTIVE_COMPONENTS: &str = "bp-active-components";
    pub const DEACTIVATED_COMPONENTS: &str = "bp-deactivated-components";
    pub const PAGES: &str = "bp-pages";
    pub const IGNORE_DEPRECATED_CODE: &str = "_bp_ignore_deprecated_code";
    pub const RETAIN_BP_DEFAULT: &str = "_bp_retain_bp_default";
    pub const THEME_PACKAGE_ID: &str = "_bp_theme_package_id";
    pub const SIGNUPS_MIGRATED: &str = "_bp_signups_migrated";
    pub const ACTIVATION_REDIRECT: &str = "_bp_activation_redirect";
    pub const UPGRADE_LOCK: &str = "_bp_upgrade_lock";
    pub const TEMPLATE: &str = "template";
    pub const COMMENT_MAX_LINKS: &str = "comment_max_links";
    pub const MODERATION_KEYS: &str = "moderation_keys";
    pub const BLACKLIST_KEYS: &str = "blacklist_keys";
    pub const THROTTLE_TIME: &str = "bp_throttle_time";
}

/// Option names and values seeded when the plugin is first activated.
pub fn default_options(config: &UpgradeConfig) -> Vec<(&'static str, Value)> {
    vec![
        /* Components */
        (keys::DEACTIVATED_COMPONENTS, json!([])),
        /* Legacy bbPress config location */
        ("bb-config-location", json!(format!("{}bb-config.php", config.abspath))),
        /* XProfile */
        ("bp-xprofile-base-group-name", json!("Base")),
        ("bp-xprofile-fullname-field-name", json!("Name")),
        /* Blogs: used to decide if blogs need indexing */
        ("bp-blogs-first-install", json!(false)),
        /* Settings */
        ("bp-disable-profile-sync", json!(false)),
        ("hide-loggedout-adminbar", json!(false)),
        ("bp-disable-avatar-uploads", json!(false)),
        ("bp-disable-cover-image-uploads", json!(false)),
        ("bp-disable-group-avatar-uploads", json!(false)),
        ("bp-disable-group-cover-image-uploads", json!(false)),
        ("bp-disable-account-deletion", json!(false)),
        ("bp-disable-blogforum-comments", json!(true)),
        (keys::THEME_PACKAGE_ID, json!("legacy")),
        /* Groups */
        ("bp_restrict_group_creation", json!(false)),
        /* Akismet */
        ("_bp_enable_akismet", json!(true)),
        /* Activity heartbeat */
        ("_bp_enable_heartbeat_refresh", json!(true)),
        /* BuddyBar */
        ("_bp_force_buddybar", json!(false)),
        /* Legacy theme */
        (keys::RETAIN_BP_DEFAULT, json!(false)),
        /* Widgets */
        ("widget_bp_core_login_widget", json!(false)),
        ("widget_bp_core_members_widget", json!(false)),
        ("widget_bp_core_whos_online_widget", json!(false)),
        ("widget_bp_core_recently_active_widget", json!(false)),
        ("widget_bp_groups_widget", json!(false)),
        ("widget_bp_messages_sitewide_notices_widget", json!(false)),
    ]
}

/// Seeds every default option that is not already set. Existing values win.
///
/// Returns the number of options written.
pub fn add_default_options(
    store: &mut dyn OptionStore,
    hooks: &HookRegistry,
    config: &UpgradeConfig,
) -> StoreResult<usize> {
    let mut added = 0;
    for (key, value) in default_options(config) {
        if store.add(key, value)? {
            added += 1;
        }
    }
    hooks.fire(&HookEvent::AddOptions);
    Ok(added)
}

/// Removes every default option. Destructive; only used on uninstall.
pub fn delete_default_options(
    store: &mut dyn OptionStore,
    hooks: &HookRegistry,
    config: &UpgradeConfig,
) -> StoreResult<usize> {
    let mut deleted = 0;
    for (key, _) in default_options(config) {
        if store.delete(key)? {
            deleted += 1;
        }
    }
    hooks.fire(&HookEvent::DeleteOptions);
    Ok(deleted)
}

/// Raw option value, or `default` when unset.
pub fn get_option(store: &dyn OptionStore, key: &str, default: Value) -> StoreResult<Value> {
    Ok(store.get(key)?.unwrap_or(default))
}

/// Reads a flag the way the host coerces it: `1`, `"1"`, `"true"` and `true` are on.
pub fn get_bool(store: &dyn OptionStore, key: &str, default: bool) -> StoreResult<bool> {
    let Some(value) = store.get(key)? else {
        return Ok(default);
    };
    Ok(match &value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        Value::Null => false,
        other => {
            warn!("option '{}' holds {} where a flag was expected", key, other);
            default
        }
    })
}

pub fn get_string(store: &dyn OptionStore, key: &str, default: &str) -> StoreResult<String> {
    let Some(value) = store.get(key)? else {
        return Ok(default.to_string());
    };
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null => String::new(),
        other => {
            warn!("option '{}' holds {} where text was expected", key, other);
            default.to_string()
        }
    })
}

pub fn get_u64(store: &dyn OptionStore, key: &str, default: u64) -> StoreResult<u64> {
    let Some(value) = store.get(key)? else {
        return Ok(default);
    };
    let parsed = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(false) | Value::Null => Some(0),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        warn!("option '{}' holds {} where a number was expected", key, value);
        default
    }))
}
