// ── EventChannel ──
//
// Per-target publish point backed by a tokio broadcast channel. Publishing
// never blocks: a subscriber that falls behind skips what it missed and
// keeps going, and the other subscribers are unaffected.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::event::{AlarmEvent, ErrorReport, Signal, SignalKind};

const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Publish/subscribe surface for one connection target.
///
/// Cheaply cloneable; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<Arc<Signal>>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_capacity(SIGNAL_CHANNEL_CAPACITY)
    }

    /// `capacity` is how far a subscriber may lag before it starts skipping.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every signal published from now on.
    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            rx: self.tx.subscribe(),
            kind: None,
        }
    }

    /// Receive only signals of one category.
    pub fn subscribe_to(&self, kind: SignalKind) -> SignalReceiver {
        SignalReceiver {
            rx: self.tx.subscribe(),
            kind: Some(kind),
        }
    }

    /// Fire-and-forget; returns how many subscribers were live.
    pub fn publish(&self, signal: Signal) -> usize {
        // No subscribers is not an error
        self.tx.send(Arc::new(signal)).unwrap_or(0)
    }

    pub fn alarm(&self, alarm: AlarmEvent) -> usize {
        self.publish(Signal::Alarm(alarm))
    }

    pub fn error(&self, report: ErrorReport) -> usize {
        self.publish(Signal::Error(report))
    }

    pub fn debug(&self, message: impl Into<String>) -> usize {
        self.publish(Signal::Debug(message.into()))
    }

    pub fn reconnecting(&self, message: impl Into<String>) -> usize {
        self.publish(Signal::Reconnecting(message.into()))
    }
}

/// A subscription, optionally filtered to one [`SignalKind`].
#[derive(Debug)]
pub struct SignalReceiver {
    rx: broadcast::Receiver<Arc<Signal>>,
    kind: Option<SignalKind>,
}

impl SignalReceiver {
    /// Wait for the next matching signal.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<Arc<Signal>> {
        loop {
            match self.rx.recv().await {
                Ok(signal) if self.accepts(&signal) => return Some(signal),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "signal subscriber lagged, skipping missed signals");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching signal if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Signal>> {
        loop {
            match self.rx.try_recv() {
                Ok(signal) if self.accepts(&signal) => return Some(signal),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "signal subscriber lagged, skipping missed signals");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Arc<Signal>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn accepts(&self, signal: &Signal) -> bool {
        self.kind.is_none_or(|kind| signal.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AlarmAction;

    fn alarm(index: i64) -> AlarmEvent {
        AlarmEvent {
            event_type: "VideoMotion".into(),
            action: AlarmAction::Start,
            index,
            host: "10.0.0.5".into(),
        }
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let channel = EventChannel::new();
        assert_eq!(channel.debug("nobody listening"), 0);
    }

    #[test]
    fn every_subscriber_sees_every_signal_in_order() {
        let channel = EventChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        assert_eq!(channel.alarm(alarm(0)), 2);
        channel.alarm(alarm(1));

        for rx in [&mut first, &mut second] {
            let indices: Vec<i64> = rx
                .drain()
                .iter()
                .filter_map(|s| s.as_alarm().map(|a| a.index))
                .collect();
            assert_eq!(indices, [0, 1]);
        }
    }

    #[test]
    fn filtered_subscription_skips_other_kinds() {
        let channel = EventChannel::new();
        let mut errors = channel.subscribe_to(SignalKind::Error);

        channel.debug("connected");
        channel.error(ErrorReport::new("boom", "details"));
        channel.reconnecting("Reconnecting to 10.0.0.5 in 10s");

        let got = errors.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), SignalKind::Error);
    }

    #[test]
    fn lagging_subscriber_does_not_block_publisher() {
        let channel = EventChannel::with_capacity(2);
        let mut slow = channel.subscribe();

        for i in 0..10 {
            channel.alarm(alarm(i));
        }

        // The oldest signals were overwritten; the newest survive.
        let indices: Vec<i64> = slow
            .drain()
            .iter()
            .filter_map(|s| s.as_alarm().map(|a| a.index))
            .collect();
        assert_eq!(indices, [8, 9]);
    }

    #[test]
    fn filtered_recv_waits_for_a_matching_signal() {
        let channel = EventChannel::new();
        let mut alarms = channel.subscribe_to(SignalKind::Alarm);
        let mut recv = tokio_test::task::spawn(async move { alarms.recv().await });

        tokio_test::assert_pending!(recv.poll());
        channel.debug("not an alarm");
        tokio_test::assert_pending!(recv.poll());

        channel.alarm(alarm(3));
        assert!(recv.is_woken());
        let signal = tokio_test::assert_ready!(recv.poll());
        assert_eq!(signal.and_then(|s| s.as_alarm().map(|a| a.index)), Some(3));
    }

    #[tokio::test]
    async fn recv_ends_when_channel_dropped() {
        let channel = EventChannel::new();
        let mut rx = channel.subscribe();
        channel.debug("last words");
        drop(channel);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
