use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BookingEvent, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking events, fanned out per tutor plus a firehose
/// channel for the dispatcher. Fire-and-forget: sending never fails and
/// never affects the mutation that produced the event.
pub struct NotifyHub {
    channels: DashMap<UserId, broadcast::Sender<BookingEvent>>,
    all: broadcast::Sender<BookingEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one tutor's booking events. Creates the channel if needed.
    pub fn subscribe(&self, tutor_id: UserId) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(tutor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to every booking event.
    pub fn subscribe_all(&self) -> broadcast::Receiver<BookingEvent> {
        self.all.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn send(&self, tutor_id: UserId, event: &BookingEvent) {
        if let Some(sender) = self.channels.get(&tutor_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}

/// Where delivered events go. The real notification service lives outside
/// this core; anything implementing this trait can stand in for it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &BookingEvent);
}

/// Default sink: structured log lines.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &BookingEvent) {
        let booking = event.booking();
        match event {
            BookingEvent::Created { .. } => {
                tracing::info!(
                    booking = %booking.id,
                    tutor = %booking.tutor_id,
                    student = %booking.student_id,
                    "booking created"
                );
            }
            BookingEvent::StatusChanged { previous, .. } => {
                tracing::info!(
                    booking = %booking.id,
                    from = %previous,
                    to = %booking.status,
                    "booking status changed"
                );
            }
        }
    }
}

/// Drain the firehose into a sink. Lagging (slow sink, burst of events)
/// skips to the oldest retained event rather than stopping.
pub async fn run_dispatcher(mut rx: broadcast::Receiver<BookingEvent>, sink: impl NotificationSink) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL).increment(1);
                sink.deliver(&event).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("notification dispatcher lagged, dropped {missed} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
