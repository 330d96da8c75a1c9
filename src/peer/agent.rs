use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::OutboundQueue;
use crate::core::{ClientId, Error, PeerConfig, Result, TdmaStatus};
use crate::protocol::{LineCodec, Message, MessageCodec};

/// Capacity of the display-event channel
const EVENT_CAPACITY: usize = 64;

/// Mirrored TDMA timing state
///
/// Updated exclusively by the receiver task from inbound protocol messages;
/// read by the transmit gate and by status queries.
#[derive(Debug, Default)]
struct TdmaInfo {
    my_slot: Option<u32>,
    current_slot: Option<u32>,
    slot_duration: Duration,
    my_turn: bool,
    time_to_my_slot: Duration,
}

/// Display-only happenings surfaced by the receiver
///
/// None of these feed back into protocol state; they exist so a frontend can
/// show what the coordinator said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The coordinator admitted us and assigned a slot
    Welcome {
        /// Assigned client id
        client_id: ClientId,
        /// Assigned slot
        slot: u32,
        /// Duration of a single slot
        slot_duration: Duration,
    },
    /// Another peer's transmission was relayed to us
    Message {
        /// Sending peer's id
        from: ClientId,
        /// Slot the transmission was accepted in
        slot: u32,
        /// The payload
        text: String,
    },
    /// We transmitted outside our slot and the payload was dropped
    Collision {
        /// Our assigned slot
        your_slot: u32,
        /// The slot that was active
        current_slot: u32,
    },
    /// A line that was not a protocol frame, verbatim
    Text(String),
    /// The coordinator closed the connection
    Disconnected,
}

/// Cumulative load-mode counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Payloads accepted into the queue
    pub queued: u64,
    /// Payloads written to the coordinator
    pub sent: u64,
}

/// State shared between the agent handle and its worker tasks
struct Shared {
    info: Mutex<TdmaInfo>,
    queue: OutboundQueue,
    client_id: AtomicU32,
    queued: AtomicU64,
    sent: AtomicU64,
}

impl Shared {
    fn info(&self) -> MutexGuard<'_, TdmaInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn my_turn(&self) -> bool {
        self.info().my_turn
    }

    fn enqueue(&self, payload: String) -> Result<()> {
        self.queue.enqueue(payload)?;
        self.queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Client-side TDMA state machine for one coordinator connection
///
/// Runs a receiver that mirrors the coordinator's timing state and a
/// transmit gate that drains the outbound queue only while this peer's slot
/// is active. Load-mode instrumentation (generator + reporter) is optional
/// and shares the same queue contract.
pub struct PeerAgent {
    config: PeerConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl PeerAgent {
    /// Connects to the coordinator and starts the receiver and transmit gate
    ///
    /// Returns the agent handle plus the channel of display events. A
    /// connection failure is fatal to the caller.
    pub async fn connect(config: PeerConfig) -> Result<(Self, mpsc::Receiver<PeerEvent>)> {
        config.validate()?;

        let stream = TcpStream::connect(config.server_addr)
            .await
            .map_err(|e| Error::network(format!("Failed to connect to {}: {}", config.server_addr, e)))?;
        info!(addr = %config.server_addr, "connected to coordinator");

        let (read_half, write_half) = stream.into_split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            info: Mutex::new(TdmaInfo::default()),
            queue: OutboundQueue::new(config.queue_capacity),
            client_id: AtomicU32::new(0),
            queued: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();

        let receiver = tokio::spawn(receiver_task(
            read_half,
            Arc::clone(&shared),
            events_tx,
            cancel.clone(),
        ));
        let gate = tokio::spawn(gate_task(
            write_half,
            Arc::clone(&shared),
            cancel.clone(),
            config.gate_interval,
        ));

        let agent = PeerAgent {
            config,
            shared,
            cancel,
            workers: vec![receiver, gate],
        };
        Ok((agent, events_rx))
    }

    /// Queues a payload for transmission during our slot
    ///
    /// Fails with [`Error::QueueFull`] when the queue is at capacity; the
    /// queue is left unchanged and the caller may retry later.
    pub fn enqueue(&self, payload: impl Into<String>) -> Result<()> {
        self.shared.enqueue(payload.into())
    }

    /// Snapshot of the mirrored timing state and queue depth
    pub fn status(&self) -> TdmaStatus {
        let (my_slot, current_slot, my_turn) = {
            let info = self.shared.info();
            (info.my_slot, info.current_slot, info.my_turn)
        };
        TdmaStatus {
            my_slot,
            current_slot,
            my_turn,
            queue_depth: self.shared.queue.depth(),
        }
    }

    /// Last reported wait until our slot becomes active
    pub fn time_to_slot(&self) -> Duration {
        self.shared.info().time_to_my_slot
    }

    /// Slot duration the coordinator last reported
    pub fn slot_duration(&self) -> Duration {
        self.shared.info().slot_duration
    }

    /// Client id assigned by the coordinator, once welcomed
    pub fn client_id(&self) -> Option<ClientId> {
        match self.shared.client_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(ClientId(id)),
        }
    }

    /// Cumulative load-mode counters
    pub fn stats(&self) -> LoadStats {
        LoadStats {
            queued: self.shared.queued.load(Ordering::Relaxed),
            sent: self.shared.sent.load(Ordering::Relaxed),
        }
    }

    /// Starts the synthetic load generator and the statistics reporter
    pub fn start_load(&mut self) {
        self.workers.push(tokio::spawn(generator_task(
            Arc::clone(&self.shared),
            self.cancel.clone(),
            self.config.load_interval,
        )));
        self.workers.push(tokio::spawn(reporter_task(
            Arc::clone(&self.shared),
            self.cancel.clone(),
            self.config.report_interval,
        )));
    }

    /// Stops every worker and waits for them to finish
    ///
    /// Dropping the workers' socket halves closes the connection; nothing
    /// keeps running afterwards.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

/// Applies one decoded message to the mirror and surfaces display events
///
/// Events are delivered best-effort: a slow or absent consumer never stalls
/// the receiver.
fn apply_message(shared: &Shared, events_tx: &mpsc::Sender<PeerEvent>, message: Message) {
    match message {
        Message::Welcome {
            client_id,
            slot,
            slot_duration,
        } => {
            shared.client_id.store(client_id.0, Ordering::Relaxed);
            {
                let mut info = shared.info();
                info.my_slot = Some(slot);
                info.slot_duration = slot_duration;
            }
            let _ = events_tx.try_send(PeerEvent::Welcome {
                client_id,
                slot,
                slot_duration,
            });
        }
        Message::Timing {
            slot,
            slot_duration,
            time_to_slot,
            ..
        } => {
            let mut info = shared.info();
            info.my_slot = Some(slot);
            info.slot_duration = slot_duration;
            info.time_to_my_slot = time_to_slot;
        }
        Message::YourTurn { slot, duration, .. } => {
            let mut info = shared.info();
            info.my_turn = true;
            info.current_slot = Some(slot);
            info.slot_duration = duration;
        }
        Message::WaitTurn {
            current_slot,
            your_slot,
            wait_time,
            ..
        } => {
            let mut info = shared.info();
            info.my_turn = false;
            info.current_slot = Some(current_slot);
            info.my_slot = Some(your_slot);
            info.time_to_my_slot = wait_time;
        }
        Message::Relay { from, slot, text } => {
            let _ = events_tx.try_send(PeerEvent::Message { from, slot, text });
        }
        Message::Collision {
            your_slot,
            current_slot,
        } => {
            debug!(your_slot, current_slot, "transmission collided");
            let _ = events_tx.try_send(PeerEvent::Collision {
                your_slot,
                current_slot,
            });
        }
        Message::Opaque(text) => {
            let _ = events_tx.try_send(PeerEvent::Text(text));
        }
    }
}

/// Mirrors inbound protocol messages until the connection ends
async fn receiver_task(
    read_half: OwnedReadHalf,
    shared: Arc<Shared>,
    events_tx: mpsc::Sender<PeerEvent>,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(read_half, MessageCodec::new());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            frame = frames.next() => match frame {
                Some(Ok(message)) => apply_message(&shared, &events_tx, message),
                Some(Err(e)) => {
                    warn!(error = %e, "read failed");
                    break;
                }
                None => {
                    info!("coordinator closed the connection");
                    break;
                }
            }
        }
    }
    let _ = events_tx.try_send(PeerEvent::Disconnected);
    cancel.cancel();
}

/// Drains the queue onto the wire, but only while our slot is active
///
/// The poll interval stays strictly below the slot duration so an opening
/// window is never missed; within one window several payloads may flush,
/// with the turn re-checked before each.
async fn gate_task(
    write_half: OwnedWriteHalf,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    gate_interval: Duration,
) {
    let mut sink = FramedWrite::new(write_half, LineCodec::new());
    let mut ticker = interval(gate_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        while shared.my_turn() {
            let payload = match shared.queue.dequeue() {
                Some(payload) => payload,
                None => break,
            };
            if let Err(e) = sink.send(payload).await {
                warn!(error = %e, "send failed");
                cancel.cancel();
                return;
            }
            shared.sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Enqueues a timestamped synthetic payload on a fixed period
async fn generator_task(shared: Arc<Shared>, cancel: CancellationToken, load_interval: Duration) {
    // Hold off until the coordinator has told us who we are.
    while shared.client_id.load(Ordering::Relaxed) == 0 {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(Duration::from_millis(10)) => {}
        }
    }

    info!(
        interval_ms = load_interval.as_millis() as u64,
        "load generator started"
    );
    let mut ticker = interval(load_interval);
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let client_id = shared.client_id.load(Ordering::Relaxed);
        let payload = format!(
            "[LOAD] client {} seq {} time {}",
            client_id,
            sequence,
            Utc::now().timestamp_millis()
        );
        sequence += 1;
        if shared.enqueue(payload).is_err() {
            debug!(sequence, "queue full, payload skipped");
        }
    }
}

/// Periodically logs cumulative load counters
async fn reporter_task(shared: Arc<Shared>, cancel: CancellationToken, report_interval: Duration) {
    let started = Instant::now();
    let mut ticker = interval(report_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        info!(
            runtime_s = started.elapsed().as_secs(),
            queued = shared.queued.load(Ordering::Relaxed),
            sent = shared.sent.load(Ordering::Relaxed),
            queue_depth = shared.queue.depth(),
            "load statistics"
        );
    }
}
