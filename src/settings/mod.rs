/// User preference synchronization
///
/// Holds the typed preference model shared by the synchronizer and the
/// local snapshot store:
/// - Closed set of preference keys and their remote field names
/// - Typed preference values
/// - Remote theme / derived UI theme mode
/// - Density options

pub mod ledger;
pub mod patch;
pub mod store;
pub mod synchronizer;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use ledger::*;
pub use patch::*;
pub use store::*;
pub use synchronizer::*;

/// Recognized preference keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PreferenceKey {
    /// Remote theme (`bright`, `darcula`, `auto`)
    #[serde(rename = "theme")]
    Theme,
    /// Card density
    #[serde(rename = "spaciness")]
    Spaciness,
    /// Open links in a new tab
    #[serde(rename = "openNewTab")]
    OpenNewTab,
    /// Compact (list) layout
    #[serde(rename = "insaneMode")]
    InsaneMode,
    /// Show custom shortcuts
    #[serde(rename = "showTopSites")]
    ShowTopSites,
    /// Show feed sorting menu
    #[serde(rename = "sortingEnabled")]
    SortingEnabled,
    /// Hide the weekly goal widget
    #[serde(rename = "optOutWeeklyGoal")]
    OptOutWeeklyGoal,
    /// Disable the companion
    #[serde(rename = "optOutCompanion")]
    OptOutCompanion,
    /// Automatically dismiss notifications
    #[serde(rename = "autoDismissNotifications")]
    AutoDismissNotifications,
    /// Custom shortcut links
    #[serde(rename = "customLinks")]
    CustomLinks,
    /// Sidebar expanded
    #[serde(rename = "sidebarExpanded")]
    SidebarExpanded,
    /// Companion expanded
    #[serde(rename = "companionExpanded")]
    CompanionExpanded,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 12] = [
        PreferenceKey::Theme,
        PreferenceKey::Spaciness,
        PreferenceKey::OpenNewTab,
        PreferenceKey::InsaneMode,
        PreferenceKey::ShowTopSites,
        PreferenceKey::SortingEnabled,
        PreferenceKey::OptOutWeeklyGoal,
        PreferenceKey::OptOutCompanion,
        PreferenceKey::AutoDismissNotifications,
        PreferenceKey::CustomLinks,
        PreferenceKey::SidebarExpanded,
        PreferenceKey::CompanionExpanded,
    ];

    /// Remote field name
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::Theme => "theme",
            PreferenceKey::Spaciness => "spaciness",
            PreferenceKey::OpenNewTab => "openNewTab",
            PreferenceKey::InsaneMode => "insaneMode",
            PreferenceKey::ShowTopSites => "showTopSites",
            PreferenceKey::SortingEnabled => "sortingEnabled",
            PreferenceKey::OptOutWeeklyGoal => "optOutWeeklyGoal",
            PreferenceKey::OptOutCompanion => "optOutCompanion",
            PreferenceKey::AutoDismissNotifications => "autoDismissNotifications",
            PreferenceKey::CustomLinks => "customLinks",
            PreferenceKey::SidebarExpanded => "sidebarExpanded",
            PreferenceKey::CompanionExpanded => "companionExpanded",
        }
    }

    /// Whether the key holds a boolean and can be toggled
    pub fn is_boolean(&self) -> bool {
        !matches!(
            self,
            PreferenceKey::Theme | PreferenceKey::Spaciness | PreferenceKey::CustomLinks
        )
    }

    /// Keys that may only be changed by a logged-in user
    pub fn requires_login(&self) -> bool {
        matches!(self, PreferenceKey::OptOutWeeklyGoal)
    }

    fn expected_type(&self) -> &'static str {
        match self {
            PreferenceKey::Theme => "theme",
            PreferenceKey::Spaciness => "spaciness",
            PreferenceKey::CustomLinks => "link list",
            _ => "boolean",
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PreferenceKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::UnknownPreference(s.to_string()))
    }
}

/// Theme as stored remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTheme {
    Bright,
    Darcula,
    Auto,
}

/// Theme as presented to the UI, derived from [`RemoteTheme`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    Light,
    Auto,
}

impl From<RemoteTheme> for ThemeMode {
    fn from(theme: RemoteTheme) -> Self {
        match theme {
            RemoteTheme::Bright => ThemeMode::Light,
            RemoteTheme::Darcula => ThemeMode::Dark,
            RemoteTheme::Auto => ThemeMode::Auto,
        }
    }
}

impl From<ThemeMode> for RemoteTheme {
    fn from(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => RemoteTheme::Bright,
            ThemeMode::Dark => RemoteTheme::Darcula,
            ThemeMode::Auto => RemoteTheme::Auto,
        }
    }
}

/// Card density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spaciness {
    Eco,
    Roomy,
    Cozy,
}

/// A single typed preference value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Theme(RemoteTheme),
    Spaciness(Spaciness),
    Links(Option<Vec<String>>),
}

impl PreferenceValue {
    /// Decode a JSON value for a known key
    pub fn decode(key: PreferenceKey, value: serde_json::Value) -> Result<Self> {
        let decoded = match key {
            PreferenceKey::Theme => PreferenceValue::Theme(serde_json::from_value(value)?),
            PreferenceKey::Spaciness => PreferenceValue::Spaciness(serde_json::from_value(value)?),
            PreferenceKey::CustomLinks => PreferenceValue::Links(serde_json::from_value(value)?),
            _ => PreferenceValue::Bool(serde_json::from_value(value)?),
        };
        Ok(decoded)
    }

    /// Check that this value fits `key`
    pub fn check(&self, key: PreferenceKey) -> Result<()> {
        let fits = matches!(
            (key, self),
            (PreferenceKey::Theme, PreferenceValue::Theme(_))
                | (PreferenceKey::Spaciness, PreferenceValue::Spaciness(_))
                | (PreferenceKey::CustomLinks, PreferenceValue::Links(_))
        ) || (key.is_boolean() && matches!(self, PreferenceValue::Bool(_)));

        if fits {
            Ok(())
        } else {
            Err(Error::TypeMismatch { key, expected: key.expected_type() })
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PreferenceValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Bool(value)
    }
}

impl From<RemoteTheme> for PreferenceValue {
    fn from(value: RemoteTheme) -> Self {
        PreferenceValue::Theme(value)
    }
}

impl From<Spaciness> for PreferenceValue {
    fn from(value: Spaciness) -> Self {
        PreferenceValue::Spaciness(value)
    }
}

/// The full set of user preferences, mirroring the remote settings object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceState {
    pub theme: RemoteTheme,
    pub spaciness: Spaciness,
    pub open_new_tab: bool,
    pub insane_mode: bool,
    pub show_top_sites: bool,
    pub sorting_enabled: bool,
    pub opt_out_weekly_goal: bool,
    pub opt_out_companion: bool,
    pub auto_dismiss_notifications: bool,
    pub custom_links: Option<Vec<String>>,
    pub sidebar_expanded: bool,
    pub companion_expanded: bool,
}

impl Default for PreferenceState {
    fn default() -> Self {
        Self {
            theme: RemoteTheme::Darcula,
            spaciness: Spaciness::Eco,
            open_new_tab: true,
            insane_mode: false,
            show_top_sites: true,
            sorting_enabled: false,
            opt_out_weekly_goal: false,
            opt_out_companion: false,
            auto_dismiss_notifications: true,
            custom_links: None,
            sidebar_expanded: true,
            companion_expanded: false,
        }
    }
}

impl PreferenceState {
    /// UI-facing theme, never stored on its own
    pub fn theme_mode(&self) -> ThemeMode {
        self.theme.into()
    }

    pub fn get(&self, key: PreferenceKey) -> PreferenceValue {
        match key {
            PreferenceKey::Theme => PreferenceValue::Theme(self.theme),
            PreferenceKey::Spaciness => PreferenceValue::Spaciness(self.spaciness),
            PreferenceKey::OpenNewTab => PreferenceValue::Bool(self.open_new_tab),
            PreferenceKey::InsaneMode => PreferenceValue::Bool(self.insane_mode),
            PreferenceKey::ShowTopSites => PreferenceValue::Bool(self.show_top_sites),
            PreferenceKey::SortingEnabled => PreferenceValue::Bool(self.sorting_enabled),
            PreferenceKey::OptOutWeeklyGoal => PreferenceValue::Bool(self.opt_out_weekly_goal),
            PreferenceKey::OptOutCompanion => PreferenceValue::Bool(self.opt_out_companion),
            PreferenceKey::AutoDismissNotifications => {
                PreferenceValue::Bool(self.auto_dismiss_notifications)
            }
            PreferenceKey::CustomLinks => PreferenceValue::Links(self.custom_links.clone()),
            PreferenceKey::SidebarExpanded => PreferenceValue::Bool(self.sidebar_expanded),
            PreferenceKey::CompanionExpanded => PreferenceValue::Bool(self.companion_expanded),
        }
    }

    /// Set a single key, returning the value it replaced
    pub fn set(&mut self, key: PreferenceKey, value: PreferenceValue) -> Result<PreferenceValue> {
        value.check(key)?;
        let previous = self.get(key);

        match (key, value) {
            (PreferenceKey::Theme, PreferenceValue::Theme(theme)) => self.theme = theme,
            (PreferenceKey::Spaciness, PreferenceValue::Spaciness(density)) => {
                self.spaciness = density
            }
            (PreferenceKey::CustomLinks, PreferenceValue::Links(links)) => self.custom_links = links,
            (key, PreferenceValue::Bool(flag)) => *self.bool_slot(key) = flag,
            // check() above rejects every other pairing
            _ => unreachable!(),
        }

        Ok(previous)
    }

    fn bool_slot(&mut self, key: PreferenceKey) -> &mut bool {
        match key {
            PreferenceKey::OpenNewTab => &mut self.open_new_tab,
            PreferenceKey::InsaneMode => &mut self.insane_mode,
            PreferenceKey::ShowTopSites => &mut self.show_top_sites,
            PreferenceKey::SortingEnabled => &mut self.sorting_enabled,
            PreferenceKey::OptOutWeeklyGoal => &mut self.opt_out_weekly_goal,
            PreferenceKey::OptOutCompanion => &mut self.opt_out_companion,
            PreferenceKey::AutoDismissNotifications => &mut self.auto_dismiss_notifications,
            PreferenceKey::SidebarExpanded => &mut self.sidebar_expanded,
            PreferenceKey::CompanionExpanded => &mut self.companion_expanded,
            PreferenceKey::Theme | PreferenceKey::Spaciness | PreferenceKey::CustomLinks => {
                unreachable!("{} is not a boolean preference", key)
            }
        }
    }
}
