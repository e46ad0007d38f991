//! PDCP Timers
//!
//! Discard timers (one per transmitted SDU) and t-Reordering run as tokio
//! tasks. Expiry callbacks re-enter the entity through its lock and carry a
//! generation id, so an expiry racing a stop is recognised as stale.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

struct TimerHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn abort(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Timer bookkeeping of one PDCP entity
#[derive(Default)]
pub struct PdcpTimers {
    next_id: u64,
    reordering: Option<TimerHandle>,
    discard: HashMap<u32, TimerHandle>,
}

fn spawn_timer<F, Fut>(id: u64, duration: Duration, on_expiry: F) -> Option<JoinHandle<()>>
where
    F: FnOnce(u64) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            tokio::time::sleep(duration).await;
            on_expiry(id).await;
        })),
        Err(_) => {
            warn!("No tokio runtime, timer {} will not fire", id);
            None
        }
    }
}

impl PdcpTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    /// Start t-Reordering, replacing a running instance
    pub fn start_reordering<F, Fut>(&mut self, duration: Duration, on_expiry: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop_reordering();
        let id = self.allocate_id();
        let task = spawn_timer(id, duration, on_expiry);
        self.reordering = Some(TimerHandle { id, task });
    }

    pub fn reordering_running(&self) -> bool {
        self.reordering.is_some()
    }

    pub fn stop_reordering(&mut self) {
        if let Some(timer) = self.reordering.take() {
            timer.abort();
        }
    }

    /// Called from the expiry task. Returns false if `id` was stopped or replaced.
    pub fn finish_reordering(&mut self, id: u64) -> bool {
        if self.reordering.as_ref().map(|timer| timer.id) != Some(id) {
            return false;
        }
        self.reordering = None;
        true
    }

    /// Start the discard timer of the SDU with this COUNT
    pub fn start_discard<F, Fut>(&mut self, count: u32, duration: Duration, on_expiry: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.allocate_id();
        let task = spawn_timer(id, duration, on_expiry);
        if let Some(previous) = self.discard.insert(count, TimerHandle { id, task }) {
            previous.abort();
        }
    }

    /// Called from the expiry task. Returns false if the timer was stopped meanwhile.
    pub fn finish_discard(&mut self, count: u32, id: u64) -> bool {
        if self.discard.get(&count).map(|timer| timer.id) != Some(id) {
            return false;
        }
        self.discard.remove(&count);
        true
    }

    /// Stop discard timers whose COUNT matches `pred`, returns how many were stopped
    pub fn stop_discard_where(&mut self, mut pred: impl FnMut(u32) -> bool) -> usize {
        let counts: Vec<u32> = self.discard.keys().copied().filter(|&c| pred(c)).collect();
        for count in &counts {
            if let Some(timer) = self.discard.remove(count) {
                timer.abort();
            }
        }
        counts.len()
    }

    pub fn discard_pending(&self) -> usize {
        self.discard.len()
    }

    /// Stop every timer
    pub fn stop_all(&mut self) {
        self.stop_reordering();
        for (_, timer) in self.discard.drain() {
            timer.abort();
        }
    }
}

impl Drop for PdcpTimers {
    fn drop(&mut self) {
        self.stop_all();
    }
}
