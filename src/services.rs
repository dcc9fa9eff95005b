//! Application context: every long-lived service, constructed once.
//!
//! Nothing in the crate is a global. `main` builds one `Services` and hands
//! clones of the pieces it needs to the views; tests build their own against
//! a fake transport.

#![allow(deprecated)]

use color_eyre::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{AuthApi, HttpClient, MovieClient, MutationBroadcaster, Transport};
use crate::auth::{spawn_expiry_monitor, AuthSession, TokenStore};
use crate::bus::EventBus;
use crate::cache::CacheLayer;
use crate::config::Config;
use crate::legacy::LegacyFavorites;
use crate::preload::Preloader;
use crate::settings::SettingsStore;
use crate::store::KeyValueStore;

pub struct Services {
  pub config: Config,
  pub store: Arc<dyn KeyValueStore>,
  pub bus: EventBus,
  pub cache: CacheLayer,
  pub session: AuthSession,
  pub http: HttpClient,
  pub movies: MovieClient,
  pub mutations: MutationBroadcaster,
  pub auth: AuthApi,
  pub settings: SettingsStore,
  pub legacy: LegacyFavorites,
  monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Services {
  /// Wire the services together. Restores any persisted session; does not
  /// start background tasks.
  pub fn init(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
  ) -> Result<Self> {
    let bus = EventBus::default();
    let cache = CacheLayer::new(config.cache.max_entries, config.cache.ttl_policy());
    let tokens = TokenStore::load(store.clone());
    let session = AuthSession::restore(tokens, cache.clone(), bus.clone());
    let http = HttpClient::new(
      transport,
      &config.api.base_url,
      config.http.retry_policy(),
      session.clone(),
    )?;
    let movies = MovieClient::new(http.clone(), cache.clone());
    let mutations = MutationBroadcaster::new(http.clone(), movies.clone(), cache.clone(), bus.clone());
    let auth = AuthApi::new(http.clone(), session.clone(), mutations.clone());
    let settings = SettingsStore::new(store.clone(), bus.clone());
    let legacy = LegacyFavorites::new(store.clone());

    debug!(base_url = %config.api.base_url, state = ?session.state(), "services initialized");

    Ok(Self {
      config,
      store,
      bus,
      cache,
      session,
      http,
      movies,
      mutations,
      auth,
      settings,
      legacy,
      monitor: Mutex::new(None),
    })
  }

  /// Start the periodic session expiry check. Restarting replaces the
  /// previous monitor.
  pub fn start_monitor(&self) {
    let handle = spawn_expiry_monitor(self.http.clone(), self.config.auth.expiry_check_interval());
    let previous = self
      .monitor
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .replace(handle);
    if let Some(previous) = previous {
      previous.abort();
    }
  }

  pub fn preloader(&self) -> Preloader {
    Preloader::new(self.movies.clone(), self.store.clone(), self.config.preload.clone())
  }

  /// Stop background work and drop every cached response. Persisted state
  /// (tokens, settings) is left alone.
  pub fn dispose(&self) {
    if let Some(monitor) = self
      .monitor
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      monitor.abort();
    }
    self.cache.clear();
    info!("services disposed");
  }

  pub fn is_monitoring(&self) -> bool {
    self
      .monitor
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|handle| !handle.is_finished())
  }
}
