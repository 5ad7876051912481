//! Content moderation, blacklist and flood predicates.
//!
//! All three return `true` when the content may be published as-is.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use log::warn;
use regex::{Regex, RegexBuilder};

use crate::capabilities::{User, user_can};
use crate::config::UpgradeConfig;
use crate::core::StoreResult;
use crate::options::{self, keys};
use crate::storage::OptionStore;

lazy_static! {
    static ref LINK_PATTERN: Regex = Regex::new(r"(?i)<a [^>]*href").unwrap();
}

/// Operator-configured moderation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationRules {
    /// `0` disables the link limit.
    pub max_links: u64,
    pub moderation_keys: Vec<String>,
    pub blacklist_keys: Vec<String>,
    /// Minimum seconds between two posts by the same user; `0` disables.
    pub throttle_seconds: u64,
    pub network_active: bool,
}

impl ModerationRules {
    pub fn from_options(store: &dyn OptionStore, config: &UpgradeConfig) -> StoreResult<Self> {
        Ok(Self {
            max_links: options::get_u64(store, keys::COMMENT_MAX_LINKS, 0)?,
            moderation_keys: split_keys(&options::get_string(store, keys::MODERATION_KEYS, "")?),
            blacklist_keys: split_keys(&options::get_string(store, keys::BLACKLIST_KEYS, "")?),
            throttle_seconds: options::get_u64(store, keys::THROTTLE_TIME, 0)?,
            network_active: config.network_active,
        })
    }

    /// `false` when the post should be held for moderation.
    pub fn check_for_moderation(&self, user: &User, title: &str, content: &str) -> bool {
        if user.super_admin {
            return true;
        }

        if self.max_links > 0 {
            let links = LINK_PATTERN.find_iter(content).count() as u64;
            if links >= self.max_links {
                return false;
            }
        }

        !matches_any(&self.moderation_keys, user, title, content)
    }

    /// `false` when the post contains a blacklisted word.
    pub fn check_for_blacklist(&self, user: &User, title: &str, content: &str) -> bool {
        if user.super_admin {
            return true;
        }
        !matches_any(&self.blacklist_keys, user, title, content)
    }

    /// `false` when the user posted again inside the throttle window.
    pub fn check_for_flood(
        &self,
        user: &User,
        last_posted: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.throttle_seconds == 0 {
            return true;
        }
        if user.is_anonymous() {
            return false;
        }

        let Some(last_posted) = last_posted else {
            return true;
        };
        let within_window = match i64::try_from(self.throttle_seconds)
            .ok()
            .and_then(Duration::try_seconds)
        {
            Some(window) => now.signed_duration_since(last_posted) < window,
            // Too large to represent: the window never closes.
            None => true,
        };
        if within_window {
            return user_can(user, "throttle", self.network_active);
        }
        true
    }
}

/// One key per line; blank lines are ignored.
fn split_keys(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn matches_any(words: &[String], user: &User, title: &str, content: &str) -> bool {
    let fields = [
        user.login.as_str(),
        user.email.as_str(),
        user.url.as_str(),
        title,
        content,
    ];

    words.iter().any(|word| {
        let pattern = match RegexBuilder::new(&regex::escape(word))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!("Skipping moderation key '{}': {}", word, err);
                return false;
            }
        };
        fields.iter().any(|field| pattern.is_match(field))
    })
}
