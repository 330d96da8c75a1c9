use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::Registry;
use super::scheduler::Scheduler;
use crate::core::{CoordinatorConfig, Error, Result};
use crate::protocol::{LineCodec, Message, MessageCodec};

/// Activity funneled from per-peer reader tasks into the control loop
enum CoordEvent {
    /// A complete inbound line from the peer at `slot`
    Line { slot: u32, line: String },
    /// The peer's connection ended (orderly close or read error)
    Closed { slot: u32 },
}

/// TDMA coordinator: accepts peers, drives the slot clock, and polices
/// transmissions
///
/// One control task owns the registry and scheduler; per-peer socket I/O is
/// delegated to reader/writer tasks that communicate with the control loop
/// over channels, so no shared state needs locking.
pub struct Coordinator {
    listener: TcpListener,
    events_tx: mpsc::Sender<CoordEvent>,
    events_rx: mpsc::Receiver<CoordEvent>,
    control: Control,
}

impl Coordinator {
    /// Binds the listening socket and prepares an empty schedule
    ///
    /// Startup failures here are fatal to the caller; there is no retry.
    pub async fn bind(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let listener = bind_listener(config.bind_addr)?;
        let (events_tx, events_rx) = mpsc::channel(256);

        let control = Control {
            registry: Registry::new(config.max_peers),
            scheduler: Scheduler::new(config.slot_duration, Instant::now()),
            advertised_slot: 0,
            config,
        };

        Ok(Coordinator {
            listener,
            events_tx,
            events_rx,
            control,
        })
    }

    /// Returns the bound listener address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }

    /// Runs the coordinator until the token is cancelled
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Coordinator {
            listener,
            events_tx,
            mut events_rx,
            mut control,
        } = self;

        info!(
            addr = %listener.local_addr()?,
            slot_ms = control.config.slot_duration.as_millis() as u64,
            max_peers = control.config.max_peers,
            "coordinator listening"
        );

        // The wait below is bounded by this ticker so slot transitions are
        // noticed promptly even with no socket activity.
        let mut ticker = interval(tick_interval(control.config.slot_duration));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            control.advance_clock();

            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => control.admit(stream, addr, &events_tx),
                    Err(e) => warn!(error = %e, "accept failed"),
                },

                Some(event) = events_rx.recv() => match event {
                    CoordEvent::Line { slot, line } => control.handle_line(slot, line),
                    CoordEvent::Closed { slot } => control.evict_peer(slot),
                },
            }
        }

        info!("coordinator shutting down");
        for peer in control.registry.drain() {
            peer.close().await;
        }
        Ok(())
    }
}

/// State owned by the control loop
struct Control {
    config: CoordinatorConfig,
    registry: Registry,
    scheduler: Scheduler,
    /// Active slot the peers were last told about
    advertised_slot: u32,
}

impl Control {
    /// Advances the slot clock and notifies peers of a changed active slot
    ///
    /// Comparing against the last advertised slot also catches changes made
    /// by membership-driven resizes between ticks.
    fn advance_clock(&mut self) {
        let now = Instant::now();
        self.scheduler.tick(now);
        if self.scheduler.current_slot() != self.advertised_slot {
            self.advertised_slot = self.scheduler.current_slot();
            self.broadcast_slot_change(now);
        }
    }

    /// Tells every peer whose turn it is now
    ///
    /// The peer holding the active slot gets a your-turn notice; everyone
    /// else learns the active slot and how long until their own.
    fn broadcast_slot_change(&mut self, now: Instant) {
        let current = self.scheduler.current_slot();
        let active_slots = Some(self.scheduler.slot_count());
        debug!(
            slot = current,
            frame = self.scheduler.frame_number(),
            "slot active"
        );

        let mut failed = Vec::new();
        for peer in self.registry.iter() {
            let notice = if peer.slot == current {
                Message::YourTurn {
                    slot: current,
                    duration: self.scheduler.slot_duration(),
                    active_slots,
                }
            } else {
                Message::WaitTurn {
                    current_slot: current,
                    your_slot: peer.slot,
                    wait_time: self.scheduler.time_until(peer.slot, now),
                    active_slots,
                }
            };
            if peer.send(notice).is_err() {
                failed.push(peer.slot);
            }
        }
        for slot in failed {
            self.evict_peer(slot);
        }
    }

    /// Admits a new connection, or closes it when the registry is full
    fn admit(&mut self, stream: TcpStream, addr: SocketAddr, events_tx: &mpsc::Sender<CoordEvent>) {
        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbox_capacity);
        let (id, slot) = match self.registry.admit(addr, outbox_tx) {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(%addr, error = %e, "connection rejected");
                return;
            }
        };

        let (read_half, write_half) = stream.into_split();
        let reader = tokio::spawn(reader_task(read_half, slot, events_tx.clone()));
        let writer = tokio::spawn(writer_task(write_half, outbox_rx));
        self.registry.attach_io(slot, reader, writer);
        self.scheduler.resize(self.registry.active_count());

        info!(
            %addr,
            client = %id,
            slot,
            total = self.registry.active_count(),
            "peer connected"
        );

        let now = Instant::now();
        let welcome = Message::Welcome {
            client_id: id,
            slot,
            slot_duration: self.scheduler.slot_duration(),
        };
        let snapshot = Message::Timing {
            slot,
            slot_duration: self.scheduler.slot_duration(),
            frame: self.scheduler.frame_number(),
            time_to_slot: self.scheduler.time_until(slot, now),
            active_slots: Some(self.scheduler.slot_count()),
        };

        let peer = match self.registry.peer_at_slot(slot) {
            Some(peer) => peer,
            None => return,
        };
        if peer.send(welcome).is_err() || peer.send(snapshot).is_err() {
            self.evict_peer(slot);
        }
    }

    /// Applies the slot discipline to one inbound transmission
    ///
    /// In-slot payloads are relayed verbatim to every other peer; anything
    /// else is dropped and answered with a collision notice to the sender
    /// alone.
    fn handle_line(&mut self, slot: u32, line: String) {
        let peer = match self.registry.peer_at_slot(slot) {
            Some(peer) => peer,
            None => return,
        };

        let current = self.scheduler.current_slot();
        if peer.slot != current {
            warn!(
                client = %peer.id,
                assigned = peer.slot,
                current,
                "collision, payload dropped"
            );
            let notice = Message::Collision {
                your_slot: peer.slot,
                current_slot: current,
            };
            if peer.send(notice).is_err() {
                self.evict_peer(slot);
            }
            return;
        }

        info!(client = %peer.id, slot, text = %line, "relaying");
        let relay = Message::Relay {
            from: peer.id,
            slot,
            text: line,
        };

        let mut failed = Vec::new();
        for other in self.registry.iter().filter(|p| p.slot != slot) {
            if other.send(relay.clone()).is_err() {
                failed.push(other.slot);
            }
        }
        for slot in failed {
            self.evict_peer(slot);
        }
    }

    /// Frees the peer's cell and shrinks the schedule
    fn evict_peer(&mut self, slot: u32) {
        if let Some(peer) = self.registry.evict(slot) {
            peer.halt();
            self.scheduler.resize(self.registry.active_count());
            info!(
                client = %peer.id,
                slot,
                total = self.registry.active_count(),
                "peer disconnected"
            );
        }
    }
}

/// Reads newline-framed payloads from one peer into the event channel
async fn reader_task(read_half: OwnedReadHalf, slot: u32, events_tx: mpsc::Sender<CoordEvent>) {
    let mut frames = FramedRead::new(read_half, LineCodec::new());
    while let Some(result) = frames.next().await {
        match result {
            Ok(line) => {
                if events_tx.send(CoordEvent::Line { slot, line }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(slot, error = %e, "read failed");
                break;
            }
        }
    }
    let _ = events_tx.send(CoordEvent::Closed { slot }).await;
}

/// Writes queued protocol messages to one peer's socket
async fn writer_task(write_half: OwnedWriteHalf, mut outbox_rx: mpsc::Receiver<Message>) {
    let mut sink = FramedWrite::new(write_half, MessageCodec::new());
    while let Some(message) = outbox_rx.recv().await {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

/// Bounded wait for the control loop, well below one slot duration
fn tick_interval(slot_duration: Duration) -> Duration {
    (slot_duration / 10).max(Duration::from_millis(1))
}

/// Binds a listener with address reuse enabled
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| Error::network(format!("Failed to create socket: {}", e)))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::network(format!("Failed to set SO_REUSEADDR: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::network(format!("Failed to set nonblocking: {}", e)))?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::network(format!("Failed to bind {}: {}", addr, e)))?;
    socket
        .listen(128)
        .map_err(|e| Error::network(format!("Failed to listen on {}: {}", addr, e)))?;
    TcpListener::from_std(socket.into())
        .map_err(|e| Error::network(format!("Failed to register listener: {}", e)))
}
