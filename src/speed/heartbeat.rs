//! Per-connection heartbeat timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::db::Outbound;
use super::protocol::Message;

/// Periodic `Heartbeat` frames for one connection.
///
/// The timer task lives exactly as long as this value: dropping it aborts
/// the task, so every way out of a connection handler stops the ticks.
#[derive(Debug)]
pub struct Heartbeat {
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// First tick fires one `period` from now.
    pub fn start(period: Duration, outbound: Outbound) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if outbound.send(Message::Heartbeat).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
