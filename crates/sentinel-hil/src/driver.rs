//! Stream driver
//!
//! Owns the producer task for one interface. Samples land in a bounded
//! queue; when the consumer cannot keep up the oldest sample is dropped,
//! a counter ticks, and a `SensorDropped` event goes out. The producer
//! is never blocked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sentinel_core::{Clock, Event, EventPayload, EventSink, Priority};
use sentinel_fusion::SensorSample;

use crate::interface::HilInterface;

/// Default per-stream queue depth.
pub const DEFAULT_STREAM_DEPTH: usize = 64;

struct StreamShared {
    queue: Mutex<VecDeque<SensorSample>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Consumer end of one interface's sample stream.
#[derive(Clone)]
pub struct SampleStream {
    shared: Arc<StreamShared>,
}

impl SampleStream {
    /// Next sample, in production order. `None` once the stream closed
    /// and the queue drained.
    pub async fn next_sample(&self) -> Option<SensorSample> {
        loop {
            if let Some(sample) = self.shared.queue.lock().expect("stream queue poisoned").pop_front()
            {
                return Some(sample);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Samples discarded to keep the producer unblocked.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn depth(&self) -> usize {
        self.shared.queue.lock().expect("stream queue poisoned").len()
    }
}

/// Producer task handle. Dropping the driver does not stop the task;
/// call [`StreamDriver::stop`].
pub struct StreamDriver {
    shared: Arc<StreamShared>,
    task: JoinHandle<()>,
}

impl StreamDriver {
    /// Connect the interface (if needed by the caller beforehand) and
    /// start the paced producer loop. The stream is restartable: spawn
    /// again after a stop or disconnect.
    pub fn spawn(
        mut interface: Box<dyn HilInterface + Send>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
        depth: usize,
    ) -> (Self, SampleStream) {
        let shared = Arc::new(StreamShared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: depth.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let stream = SampleStream {
            shared: shared.clone(),
        };

        let producer = shared.clone();
        let task = tokio::spawn(async move {
            let period = Duration::from_secs_f64(1.0 / interface.sampling_rate_hz().max(1e-3));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if producer.closed.load(Ordering::Acquire) {
                    break;
                }
                match interface.read_sample().await {
                    Ok(sample) => {
                        push_drop_oldest(&producer, sample, &clock, &sink);
                        producer.notify.notify_waiters();
                    }
                    Err(err) => {
                        warn!(
                            interface = interface.interface_id(),
                            %err,
                            "sample read failed; stream stopping"
                        );
                        break;
                    }
                }
            }
            producer.closed.store(true, Ordering::Release);
            producer.notify.notify_waiters();
            let _ = interface.disconnect().await;
            debug!("stream producer stopped");
        });

        (Self { shared, task }, stream)
    }

    /// Stop the producer and let the consumer drain what is queued.
    pub async fn stop(self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
        let _ = self.task.await;
    }
}

fn push_drop_oldest(
    shared: &StreamShared,
    sample: SensorSample,
    clock: &Arc<dyn Clock>,
    sink: &Arc<dyn EventSink>,
) {
    let dropped = {
        let mut queue = shared.queue.lock().expect("stream queue poisoned");
        let dropped = if queue.len() >= shared.capacity {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(sample);
        dropped
    };

    if let Some(dropped_sample) = dropped {
        let total = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        sink.emit(Event::new(
            dropped_sample.sensor_id.clone(),
            clock.now_ns(),
            Priority::Low,
            EventPayload::SensorDropped {
                sensor_id: dropped_sample.sensor_id,
                dropped_total: total,
            },
        ));
    }
}
