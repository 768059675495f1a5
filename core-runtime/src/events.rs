//! # Session Event Bus
//!
//! Broadcasts authentication lifecycle changes to the rest of the application.
//!
//! ## Overview
//!
//! The session manager publishes an [`AuthEvent`] every time the session moves
//! between states (signing in, signed in, refreshed, signed out, failed). UI
//! layers and API clients subscribe to react without polling the session.
//!
//! Built on `tokio::sync::broadcast`: every subscriber receives every event
//! emitted after it subscribed, and slow subscribers observe
//! `RecvError::Lagged` instead of blocking the publisher.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(AuthEvent::SignedIn {
//!         user_id: "u1".to_string(),
//!     })
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, AuthEvent::SignedIn { .. }));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::SendError, Receiver};

/// Default capacity for the event bus buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events related to the credential session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Tokens were stored and are being verified.
    SigningIn,
    /// Tokens were verified against the identity endpoint.
    SignedIn {
        /// Provider user id returned by verification.
        user_id: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing {
        /// Whether the renewal timer triggered the refresh.
        scheduled: bool,
    },
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// Lifetime of the new access token in seconds.
        expires_in: u64,
    },
    /// Session state was cleared.
    SignedOut,
    /// Authentication error occurred.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// Whether the session survived the error.
        recoverable: bool,
    },
}

impl AuthEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Verifying access token",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SignedOut => "User signed out",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            AuthEvent::AuthError {
                recoverable: false, ..
            } => EventSeverity::Error,
            AuthEvent::AuthError { .. } => EventSeverity::Warning,
            AuthEvent::SignedIn { .. } | AuthEvent::SignedOut => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Broadcast channel for [`AuthEvent`]s.
///
/// Cloning an `EventBus` yields another handle onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: AuthEvent) -> Result<usize, SendError<AuthEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(AuthEvent::SignedOut).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = AuthEvent::TokenRefreshed { expires_in: 3600 };
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_cloned_bus_shares_channel() {
        let bus = EventBus::default();
        let clone = bus.clone();
        let mut sub = bus.subscribe();

        clone.emit(AuthEvent::SigningIn).unwrap();
        assert_eq!(sub.recv().await.unwrap(), AuthEvent::SigningIn);
    }

    #[tokio::test]
    async fn test_lagging_subscriber() {
        let bus = EventBus::new(1);
        let mut sub = bus.subscribe();

        bus.emit(AuthEvent::SigningIn).unwrap();
        bus.emit(AuthEvent::SignedOut).unwrap();

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(sub.recv().await.unwrap(), AuthEvent::SignedOut);
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(
            AuthEvent::AuthError {
                message: "refresh failed".to_string(),
                recoverable: false,
            }
            .severity(),
            EventSeverity::Error
        );
        assert_eq!(
            AuthEvent::AuthError {
                message: "verification failed".to_string(),
                recoverable: true,
            }
            .severity(),
            EventSeverity::Warning
        );
        assert_eq!(AuthEvent::SignedOut.severity(), EventSeverity::Info);
        assert_eq!(
            AuthEvent::TokenRefreshing { scheduled: true }.severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(AuthEvent::SignedIn {
            user_id: "u1".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "SignedIn");
        assert_eq!(json["user_id"], "u1");

        let json = serde_json::to_value(AuthEvent::SignedOut).unwrap();
        assert_eq!(json["event"], "SignedOut");
    }
}
