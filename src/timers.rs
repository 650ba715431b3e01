use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tracing::debug;

/// Source of widget timer ids. Every stateful widget draws one id when it is
/// created so that ticks scheduled by a replaced widget can be told apart.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

#[derive(Debug)]
pub struct AtomicIdGenerator {
    last: AtomicU64,
}

impl AtomicIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            last: AtomicU64::new(first.saturating_sub(1)),
        }
    }
}

impl Default for AtomicIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for AtomicIdGenerator {
    fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub id: u64,
    pub fired_at: DateTime<Local>,
}

impl TimerTick {
    pub fn now(id: u64) -> Self {
        Self {
            id,
            fired_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub snapshot: Duration,
    pub logs: Duration,
    pub banner: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(5),
            logs: Duration::from_secs(2),
            banner: Duration::from_secs(5),
        }
    }
}

pub trait TickScheduler: Send + Sync {
    fn schedule(&self, id: u64, delay: Duration);
}

pub struct TokioScheduler {
    tx: UnboundedSender<TimerTick>,
}

impl TokioScheduler {
    pub fn new(tx: UnboundedSender<TimerTick>) -> Self {
        Self { tx }
    }
}

impl TickScheduler for TokioScheduler {
    fn schedule(&self, id: u64, delay: Duration) {
        debug!("schedule tick id={id} delay={delay:?}");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // the loop may already be gone on shutdown
            let _ = tx.send(TimerTick::now(id));
        });
    }
}
