//! Persisted user preferences.
//!
//! Stored as one JSON object under `userSettings`. Reading never fails:
//! missing, unknown or malformed fields fall back to their defaults one by
//! one, and an unreadable blob yields the defaults altogether.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::{AppEvent, EventBus};
use crate::store::{keys, KeyValueStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
  #[default]
  #[serde(rename = "en")]
  English,
  #[serde(rename = "es")]
  Spanish,
  #[serde(rename = "fr")]
  French,
  #[serde(rename = "de")]
  German,
  #[serde(rename = "it")]
  Italian,
  #[serde(rename = "pt")]
  Portuguese,
  #[serde(rename = "ja")]
  Japanese,
  #[serde(rename = "ko")]
  Korean,
  #[serde(rename = "zh")]
  Chinese,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Dark,
  Light,
  /// Follow the terminal's background
  Auto,
}

/// A theme after `Auto` has been decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTheme {
  Dark,
  Light,
}

impl Theme {
  /// Resolve `Auto` from a `COLORFGBG` style hint ("fg;bg", with bg 7 or 15
  /// meaning a light background). No hint means dark.
  pub fn resolve(self, colorfgbg: Option<&str>) -> ResolvedTheme {
    match self {
      Theme::Dark => ResolvedTheme::Dark,
      Theme::Light => ResolvedTheme::Light,
      Theme::Auto => {
        let background = colorfgbg
          .and_then(|hint| hint.rsplit(';').next())
          .and_then(|bg| bg.trim().parse::<u8>().ok());
        match background {
          Some(7) | Some(15) => ResolvedTheme::Light,
          _ => ResolvedTheme::Dark,
        }
      }
    }
  }

  pub fn resolve_from_env(self) -> ResolvedTheme {
    self.resolve(std::env::var("COLORFGBG").ok().as_deref())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
  #[serde(rename = "auto")]
  Auto,
  #[serde(rename = "480p")]
  Sd,
  #[serde(rename = "720p")]
  Hd,
  #[default]
  #[serde(rename = "1080p")]
  FullHd,
  #[serde(rename = "4k")]
  Uhd,
}

/// `ALL`, `next` and `as_str` for a settings enum, from `Variant => "wire name"`.
macro_rules! setting_options {
  ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
    impl $ty {
      pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

      /// The option after this one, wrapping around.
      pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
      }

      /// Stored name, e.g. `"1080p"`.
      pub fn as_str(self) -> &'static str {
        match self {
          $($ty::$variant => $name),+
        }
      }
    }
  };
}

setting_options!(Language {
  English => "en",
  Spanish => "es",
  French => "fr",
  German => "de",
  Italian => "it",
  Portuguese => "pt",
  Japanese => "ja",
  Korean => "ko",
  Chinese => "zh",
});
setting_options!(Theme { Dark => "dark", Light => "light", Auto => "auto" });
setting_options!(Quality {
  Auto => "auto",
  Sd => "480p",
  Hd => "720p",
  FullHd => "1080p",
  Uhd => "4k",
});

impl Language {
  pub fn label(self) -> &'static str {
    match self {
      Language::English => "English",
      Language::Spanish => "Español",
      Language::French => "Français",
      Language::German => "Deutsch",
      Language::Italian => "Italiano",
      Language::Portuguese => "Português",
      Language::Japanese => "日本語",
      Language::Korean => "한국어",
      Language::Chinese => "中文",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for Quality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
  pub notifications: bool,
  pub email_updates: bool,
  pub auto_play: bool,
  pub language: Language,
  pub theme: Theme,
  pub quality: Quality,
}

impl Default for UserSettings {
  fn default() -> Self {
    Self {
      notifications: true,
      email_updates: false,
      auto_play: true,
      language: Language::English,
      theme: Theme::Dark,
      quality: Quality::FullHd,
    }
  }
}

impl UserSettings {
  /// Parse a stored blob field by field.
  pub fn parse_lenient(raw: &str) -> Self {
    let object: Map<String, Value> = match serde_json::from_str(raw) {
      Ok(Value::Object(object)) => object,
      Ok(_) | Err(_) => {
        warn!("stored settings are not a JSON object, using defaults");
        return Self::default();
      }
    };
    let defaults = Self::default();
    Self {
      notifications: field(&object, "notifications", defaults.notifications),
      email_updates: field(&object, "emailUpdates", defaults.email_updates),
      auto_play: field(&object, "autoPlay", defaults.auto_play),
      language: field(&object, "language", defaults.language),
      theme: field(&object, "theme", defaults.theme),
      quality: field(&object, "quality", defaults.quality),
    }
  }
}

fn field<T: DeserializeOwned>(object: &Map<String, Value>, name: &str, default: T) -> T {
  match object.get(name) {
    None => default,
    Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
      debug!(field = name, %value, "ignoring invalid setting");
      default
    }),
  }
}

/// Settings persisted in the key/value store. Saving broadcasts
/// `SettingsChanged` so every open view rereads.
#[derive(Clone)]
pub struct SettingsStore {
  store: Arc<dyn KeyValueStore>,
  bus: EventBus,
}

impl SettingsStore {
  pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
    Self { store, bus }
  }

  pub fn get(&self) -> UserSettings {
    match self.store.get(keys::USER_SETTINGS) {
      Ok(Some(raw)) => UserSettings::parse_lenient(&raw),
      Ok(None) => UserSettings::default(),
      Err(e) => {
        warn!(error = %e, "failed to read settings");
        UserSettings::default()
      }
    }
  }

  pub fn save(&self, settings: &UserSettings) -> Result<()> {
    let raw =
      serde_json::to_string(settings).map_err(|e| eyre!("Failed to encode settings: {}", e))?;
    self
      .store
      .set(keys::USER_SETTINGS, &raw)
      .map_err(|e| eyre!("Failed to save settings: {}", e))?;
    self.bus.emit(AppEvent::SettingsChanged(*settings));
    Ok(())
  }

  pub fn reset(&self) -> Result<UserSettings> {
    let defaults = UserSettings::default();
    self.save(&defaults)?;
    Ok(defaults)
  }

  pub fn video_quality(&self) -> Quality {
    self.get().quality
  }

  pub fn autoplay_trailers(&self) -> bool {
    self.get().auto_play
  }

  pub fn language(&self) -> Language {
    self.get().language
  }

  pub fn theme(&self) -> Theme {
    self.get().theme
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::Topic;
  use crate::store::MemoryStore;

  fn store() -> (SettingsStore, Arc<MemoryStore>, EventBus) {
    let memory = Arc::new(MemoryStore::new());
    let bus = EventBus::default();
    (SettingsStore::new(memory.clone(), bus.clone()), memory, bus)
  }

  #[test]
  fn test_empty_storage_returns_defaults() {
    let (settings, _, _) = store();
    let defaults = settings.get();
    assert_eq!(defaults, UserSettings::default());
    assert!(defaults.notifications);
    assert!(!defaults.email_updates);
    assert_eq!(defaults.quality, Quality::FullHd);
  }

  #[test]
  fn test_round_trip_every_option() {
    let (settings, _, _) = store();
    let rounds = Language::ALL.len().max(Quality::ALL.len());
    for i in 0..rounds {
      let value = UserSettings {
        notifications: i % 2 == 0,
        email_updates: i % 3 == 0,
        auto_play: i % 2 == 1,
        language: Language::ALL[i % Language::ALL.len()],
        theme: Theme::ALL[i % Theme::ALL.len()],
        quality: Quality::ALL[i % Quality::ALL.len()],
      };
      settings.save(&value).unwrap();
      assert_eq!(settings.get(), value);
    }
  }

  #[test]
  fn test_stored_shape() {
    let (settings, memory, _) = store();
    settings.save(&UserSettings::default()).unwrap();
    let raw: Value = serde_json::from_str(&memory.get(keys::USER_SETTINGS).unwrap().unwrap()).unwrap();
    assert_eq!(
      raw,
      serde_json::json!({
        "notifications": true,
        "emailUpdates": false,
        "autoPlay": true,
        "language": "en",
        "theme": "dark",
        "quality": "1080p"
      })
    );
  }

  #[test]
  fn test_invalid_fields_fall_back_individually() {
    let (settings, memory, _) = store();
    memory
      .set(
        keys::USER_SETTINGS,
        r#"{"theme": "light", "quality": "8k", "autoPlay": "yes", "extra": 1}"#,
      )
      .unwrap();
    let loaded = settings.get();
    assert_eq!(loaded.theme, Theme::Light);
    assert_eq!(loaded.quality, Quality::FullHd);
    assert!(loaded.auto_play);

    memory.set(keys::USER_SETTINGS, "not json").unwrap();
    assert_eq!(settings.get(), UserSettings::default());
  }

  #[test]
  fn test_every_language_code_is_kept() {
    let loaded = UserSettings::parse_lenient(r#"{"language":"de","theme":"light"}"#);
    assert_eq!(loaded.language, Language::German);
    assert_eq!(loaded.theme, Theme::Light);

    for code in ["en", "es", "fr", "de", "it", "pt", "ja", "ko", "zh"] {
      let loaded = UserSettings::parse_lenient(&format!(r#"{{"language":"{}"}}"#, code));
      assert_eq!(loaded.language.as_str(), code);
    }
    assert_eq!(Language::Chinese.next(), Language::English);
  }

  #[test]
  fn test_save_broadcasts() {
    let (settings, _, bus) = store();
    let mut events = bus.subscribe(&[Topic::Settings]);
    let mut value = UserSettings::default();
    value.theme = Theme::Auto;
    settings.save(&value).unwrap();
    assert_eq!(events.drain(), vec![AppEvent::SettingsChanged(value)]);
  }

  #[test]
  fn test_auto_theme_resolution() {
    assert_eq!(Theme::Auto.resolve(Some("0;15")), ResolvedTheme::Light);
    assert_eq!(Theme::Auto.resolve(Some("15;0")), ResolvedTheme::Dark);
    assert_eq!(Theme::Auto.resolve(None), ResolvedTheme::Dark);
    assert_eq!(Theme::Light.resolve(Some("15;0")), ResolvedTheme::Light);
  }

  #[test]
  fn test_option_cycling() {
    assert_eq!(Quality::Uhd.next(), Quality::Auto);
    assert_eq!(Theme::Dark.next(), Theme::Light);
    assert_eq!(Quality::Sd.to_string(), "480p");
  }
}
