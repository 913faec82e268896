//! Shared realtime subscription to a user's notifications.
//!
//! Many consumers (a badge, a list, a toast layer) want the same stream of
//! notification changes. [`SubscriptionManager`] keeps exactly one underlying
//! channel open for the session's user and hands each consumer a
//! [`SubscriptionHandle`]. The channel is opened by the first acquisition and
//! torn down when the last handle is dropped.
//!
//! Acquiring for a different user than the one the channel was opened for
//! tears the old channel down and opens a new one; existing handles keep
//! receiving, now from the new channel.
//!
//! The manager is an ordinary value owned by whoever composes the
//! application; there is no global state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::{
  sync::broadcast::{self, error::RecvError, error::TryRecvError},
  task::JoinHandle,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{notification::NotificationEvent, store::GeoStore};

/// Buffered events per consumer before the slowest one starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

// ─── Opening channels ────────────────────────────────────────────────────────

/// Opens a realtime channel filtered to one user's notifications.
pub trait ChannelOpener: Send + Sync + 'static {
  /// Start forwarding `user_id`'s notification events into `sink`. The
  /// returned task drives the channel; aborting it closes the channel.
  fn open(
    &self,
    user_id: Uuid,
    sink: broadcast::Sender<NotificationEvent>,
  ) -> JoinHandle<()>;
}

/// Opens channels on a store's in-process change feed, keeping only events
/// whose `user_id` matches.
pub struct StoreOpener<S>(pub Arc<S>);

impl<S: GeoStore + 'static> ChannelOpener for StoreOpener<S> {
  fn open(
    &self,
    user_id: Uuid,
    sink: broadcast::Sender<NotificationEvent>,
  ) -> JoinHandle<()> {
    let mut feed = self.0.notification_events();
    tokio::spawn(async move {
      loop {
        match feed.recv().await {
          Ok(event) if event.user_id == user_id => {
            // No receivers only means every consumer is between polls.
            let _ = sink.send(event);
          }
          Ok(_) => {}
          Err(RecvError::Lagged(n)) => {
            warn!(%user_id, skipped = n, "notification feed lagged");
          }
          Err(RecvError::Closed) => {
            debug!(%user_id, "notification feed closed");
            break;
          }
        }
      }
    })
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

struct Channel {
  user_id: Uuid,
  task:    JoinHandle<()>,
}

impl Drop for Channel {
  fn drop(&mut self) { self.task.abort(); }
}

#[derive(Default)]
struct State {
  channel:     Option<Channel>,
  subscribers: usize,
  /// Fan-out to every handle; lives as long as there are subscribers, across
  /// channel replacements.
  sink:        Option<broadcast::Sender<NotificationEvent>>,
}

pub struct SubscriptionManager<O> {
  opener:   O,
  capacity: usize,
  state:    Mutex<State>,
}

impl<O: ChannelOpener> SubscriptionManager<O> {
  pub fn new(opener: O) -> Arc<Self> {
    Self::with_capacity(opener, DEFAULT_EVENT_CAPACITY)
  }

  pub fn with_capacity(opener: O, capacity: usize) -> Arc<Self> {
    Arc::new(Self {
      opener,
      capacity: capacity.max(1),
      state: Mutex::new(State::default()),
    })
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a consumer for `user_id`'s notifications.
  pub fn acquire(self: &Arc<Self>, user_id: Uuid) -> SubscriptionHandle<O> {
    let mut state = self.lock();
    state.subscribers += 1;

    let sink = state
      .sink
      .get_or_insert_with(|| broadcast::channel(self.capacity).0)
      .clone();

    let stale = state
      .channel
      .as_ref()
      .is_none_or(|c| c.user_id != user_id);
    if stale {
      if let Some(old) = state.channel.take() {
        debug!(from = %old.user_id, to = %user_id, "switching notification channel");
      }
      debug!(%user_id, "opening notification channel");
      let task = self.opener.open(user_id, sink.clone());
      state.channel = Some(Channel { user_id, task });
    }

    SubscriptionHandle {
      manager: Arc::clone(self),
      user_id,
      events: sink.subscribe(),
    }
  }

  fn release(&self) {
    let mut state = self.lock();
    state.subscribers = state.subscribers.saturating_sub(1);
    if state.subscribers == 0 {
      if let Some(channel) = state.channel.take() {
        debug!(user_id = %channel.user_id, "closing notification channel");
      }
      state.sink = None;
    }
  }

  pub fn subscriber_count(&self) -> usize { self.lock().subscribers }

  /// The user the open channel is filtered to, if one is open.
  pub fn current_user(&self) -> Option<Uuid> {
    self.lock().channel.as_ref().map(|c| c.user_id)
  }

  pub fn is_open(&self) -> bool { self.lock().channel.is_some() }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// One consumer's view of the shared channel. Dropping it releases the
/// subscription.
pub struct SubscriptionHandle<O: ChannelOpener> {
  manager: Arc<SubscriptionManager<O>>,
  user_id: Uuid,
  events:  broadcast::Receiver<NotificationEvent>,
}

impl<O: ChannelOpener> SubscriptionHandle<O> {
  /// The user this consumer asked for.
  pub fn user_id(&self) -> Uuid { self.user_id }

  /// Wait for the next event. Returns `None` once the channel is gone.
  pub async fn recv(&mut self) -> Option<NotificationEvent> {
    loop {
      match self.events.recv().await {
        Ok(event) => return Some(event),
        Err(RecvError::Lagged(n)) => {
          warn!(skipped = n, "notification consumer lagged");
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Non-blocking poll for UI loops.
  pub fn try_recv(&mut self) -> Option<NotificationEvent> {
    loop {
      match self.events.try_recv() {
        Ok(event) => return Some(event),
        Err(TryRecvError::Lagged(n)) => {
          warn!(skipped = n, "notification consumer lagged");
        }
        Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
      }
    }
  }
}

impl<O: ChannelOpener> Drop for SubscriptionHandle<O> {
  fn drop(&mut self) { self.manager.release(); }
}
