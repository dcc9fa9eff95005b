use crate::bus::{AppEvent, Subscription};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and query polling
  Tick,
  /// Something happened elsewhere in the app
  Bus(AppEvent),
}

/// Event handler that merges terminal input, a tick timer and the event bus
/// into one stream
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
  forwarder: JoinHandle<()>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration, mut bus: Subscription) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, so it gets its own thread
    let terminal_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if key.kind == KeyEventKind::Press && terminal_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if terminal_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    let forwarder = tokio::spawn(async move {
      while let Some(event) = bus.recv().await {
        if tx.send(Event::Bus(event)).is_err() {
          break;
        }
      }
    });

    Self { rx, forwarder }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

impl Drop for EventHandler {
  fn drop(&mut self) {
    self.forwarder.abort();
  }
}
