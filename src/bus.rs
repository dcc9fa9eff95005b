//! Process-wide event bus for cross-view state changes.
//!
//! Producers emit a closed set of [`AppEvent`] variants; views subscribe to the
//! topics they display when they are mounted and drop their [`Subscription`]
//! when they are unmounted. Every view that shows favorite or watchlist
//! membership refetches on receipt, which keeps all consumers consistent
//! without a shared reactive store.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::api::types::MovieId;
use crate::settings::UserSettings;

/// Default channel capacity. A slow subscriber that falls further behind
/// than this skips the oldest events (and is told so via a warning).
pub const DEFAULT_CAPACITY: usize = 64;

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  Added,
  Removed,
}

/// Why the authentication state changed.
///
/// Subscribers react differently: `Expired` and `LoggedOut` clear displayed
/// user data immediately, `LoggedIn` and `Refreshed` may refetch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeReason {
  LoggedIn,
  LoggedOut,
  Expired,
  Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Error,
  Warning,
  Info,
}

/// A user-facing message for the centralized notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub title: String,
  pub message: String,
  pub level: NoticeLevel,
}

impl Notice {
  pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      message: message.into(),
      level: NoticeLevel::Error,
    }
  }

  pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      message: message.into(),
      level: NoticeLevel::Warning,
    }
  }

  pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      message: message.into(),
      level: NoticeLevel::Info,
    }
  }
}

/// Application events
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
  /// A favorite was added or removed (`movie_id` is unknown for removals by record id)
  FavoritesChanged {
    movie_id: Option<MovieId>,
    change: Change,
  },
  /// A watchlist entry was added or removed
  WatchlistChanged {
    movie_id: Option<MovieId>,
    change: Change,
  },
  /// The user rated a movie
  RatingsChanged { movie_id: MovieId },
  /// Profile fields were updated
  ProfileChanged,
  /// Sign-in state changed
  AuthStateChanged { reason: AuthChangeReason },
  /// Preferences were saved
  SettingsChanged(UserSettings),
  /// Something the user must see, regardless of which view caused it
  Notice(Notice),
}

/// Subscription topics, one per event family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
  Favorites,
  Watchlist,
  Ratings,
  Profile,
  Auth,
  Settings,
  Notice,
}

impl AppEvent {
  pub fn topic(&self) -> Topic {
    match self {
      AppEvent::FavoritesChanged { .. } => Topic::Favorites,
      AppEvent::WatchlistChanged { .. } => Topic::Watchlist,
      AppEvent::RatingsChanged { .. } => Topic::Ratings,
      AppEvent::ProfileChanged => Topic::Profile,
      AppEvent::AuthStateChanged { .. } => Topic::Auth,
      AppEvent::SettingsChanged(_) => Topic::Settings,
      AppEvent::Notice(_) => Topic::Notice,
    }
  }
}

/// Broadcast channel shared by every component of one [`crate::services::Services`].
#[derive(Clone)]
pub struct EventBus {
  tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  /// Emit an event to every live subscriber. Returns how many received it.
  pub fn emit(&self, event: AppEvent) -> usize {
    debug!(topic = ?event.topic(), "emitting event");
    // No subscribers is not an error: nothing is mounted that cares
    self.tx.send(event).unwrap_or(0)
  }

  /// Subscribe to the given topics. Dropping the subscription unsubscribes.
  pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
    Subscription {
      rx: self.tx.subscribe(),
      topics: Some(topics.to_vec()),
    }
  }

  /// Subscribe to every topic.
  pub fn subscribe_all(&self) -> Subscription {
    Subscription {
      rx: self.tx.subscribe(),
      topics: None,
    }
  }

  /// Number of live subscriptions.
  pub fn subscriber_count(&self) -> usize {
    self.tx.receiver_count()
  }
}

/// A filtered handle onto the bus.
pub struct Subscription {
  rx: broadcast::Receiver<AppEvent>,
  topics: Option<Vec<Topic>>,
}

impl Subscription {
  fn wants(&self, event: &AppEvent) -> bool {
    match &self.topics {
      Some(topics) => topics.contains(&event.topic()),
      None => true,
    }
  }

  /// Wait for the next matching event. Returns `None` once the bus is gone.
  pub async fn recv(&mut self) -> Option<AppEvent> {
    loop {
      match self.rx.recv().await {
        Ok(event) if self.wants(&event) => return Some(event),
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, "subscriber lagged behind event bus");
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Take the next matching event without waiting.
  pub fn try_recv(&mut self) -> Option<AppEvent> {
    loop {
      match self.rx.try_recv() {
        Ok(event) if self.wants(&event) => return Some(event),
        Ok(_) => continue,
        Err(TryRecvError::Lagged(skipped)) => {
          warn!(skipped, "subscriber lagged behind event bus");
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
      }
    }
  }

  /// Take every pending matching event.
  pub fn drain(&mut self) -> Vec<AppEvent> {
    std::iter::from_fn(|| self.try_recv()).collect()
  }
}
