use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::{ClientId, Error, Result};
use crate::protocol::Message;

/// Coordinator-side handle to one connected peer
///
/// Owns the peer's outbound channel and the I/O worker tasks servicing its
/// socket halves. The slot number doubles as the registry index and never
/// changes while the peer stays connected.
#[derive(Debug)]
pub struct PeerHandle {
    /// Identifier reported to the peer at admission
    pub id: ClientId,
    /// Assigned slot number
    pub slot: u32,
    /// Remote address
    pub addr: SocketAddr,
    outbox: mpsc::Sender<Message>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl PeerHandle {
    /// Queues a message for delivery without blocking
    ///
    /// Fails when the peer's outbox is full or its writer has stopped; the
    /// caller treats either as a dead connection.
    pub fn send(&self, message: Message) -> Result<()> {
        self.outbox
            .try_send(message)
            .map_err(|_| Error::peer(format!("outbox unavailable for client {}", self.id)))
    }

    /// Stops the reader immediately; the writer drains and exits once the
    /// handle (and with it the outbox) is dropped
    pub fn halt(&self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }

    /// Stops both workers and waits for them to finish
    pub async fn close(self) {
        self.halt();
        let PeerHandle {
            outbox,
            reader,
            writer,
            ..
        } = self;
        drop(outbox);
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        if let Some(writer) = writer {
            let _ = writer.await;
        }
    }
}

/// Bounded registry of connected peers, indexed by slot number
///
/// Each cell exclusively owns one peer's connection state. Freed cells are
/// reused by later admissions, so slot numbers may have gaps while peers
/// remain connected.
#[derive(Debug)]
pub struct Registry {
    cells: Vec<Option<PeerHandle>>,
}

impl Registry {
    /// Creates a registry with a fixed number of cells
    pub fn new(capacity: usize) -> Self {
        Registry {
            cells: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Maximum number of simultaneously connected peers
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of currently connected peers
    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    /// Whether every cell is occupied
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_some())
    }

    /// Admits a peer into the first free cell
    ///
    /// Assigns the cell index as the slot number and derives the client id
    /// from it. Fails with a capacity error when no cell is free, in which
    /// case the caller must close the connection.
    pub fn admit(&mut self, addr: SocketAddr, outbox: mpsc::Sender<Message>) -> Result<(ClientId, u32)> {
        let slot = self
            .cells
            .iter()
            .position(|cell| cell.is_none())
            .ok_or_else(|| Error::capacity(format!("all {} slots taken", self.cells.len())))?;

        let slot = slot as u32;
        let id = ClientId::from_slot(slot);
        self.cells[slot as usize] = Some(PeerHandle {
            id,
            slot,
            addr,
            outbox,
            reader: None,
            writer: None,
        });
        Ok((id, slot))
    }

    /// Attaches the I/O worker tasks to an admitted peer
    pub fn attach_io(&mut self, slot: u32, reader: JoinHandle<()>, writer: JoinHandle<()>) {
        if let Some(Some(peer)) = self.cells.get_mut(slot as usize) {
            peer.reader = Some(reader);
            peer.writer = Some(writer);
        }
    }

    /// Frees a cell and returns its handle
    ///
    /// Idempotent: evicting a vacant or out-of-range slot is a no-op. Other
    /// peers' slot numbers are untouched.
    pub fn evict(&mut self, slot: u32) -> Option<PeerHandle> {
        self.cells.get_mut(slot as usize)?.take()
    }

    /// The peer occupying the given slot, if any
    pub fn peer_at_slot(&self, slot: u32) -> Option<&PeerHandle> {
        self.cells.get(slot as usize)?.as_ref()
    }

    /// Iterates over connected peers in slot order
    pub fn iter(&self) -> impl Iterator<Item = &PeerHandle> {
        self.cells.iter().filter_map(|cell| cell.as_ref())
    }

    /// Removes and returns every connected peer
    pub fn drain(&mut self) -> Vec<PeerHandle> {
        self.cells.iter_mut().filter_map(|cell| cell.take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn outbox() -> mpsc::Sender<Message> {
        mpsc::channel(8).0
    }

    #[test]
    fn test_admit_assigns_sequential_slots() {
        let mut registry = Registry::new(4);

        assert_eq!(registry.admit(test_addr(), outbox()).unwrap(), (ClientId(1), 0));
        assert_eq!(registry.admit(test_addr(), outbox()).unwrap(), (ClientId(2), 1));
        assert_eq!(registry.admit(test_addr(), outbox()).unwrap(), (ClientId(3), 2));
        assert_eq!(registry.active_count(), 3);
    }

    #[test]
    fn test_admit_reuses_freed_cell() {
        let mut registry = Registry::new(4);
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();

        registry.evict(1);
        assert_eq!(registry.admit(test_addr(), outbox()).unwrap(), (ClientId(2), 1));
    }

    #[test]
    fn test_admit_fails_at_capacity() {
        let mut registry = Registry::new(2);
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();

        assert!(registry.is_full());
        assert!(matches!(
            registry.admit(test_addr(), outbox()),
            Err(Error::Capacity(_))
        ));
    }

    #[test]
    fn test_evict_leaves_other_slots_untouched() {
        let mut registry = Registry::new(4);
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();

        let evicted = registry.evict(0).expect("peer at slot 0");
        assert_eq!(evicted.slot, 0);
        assert_eq!(registry.active_count(), 2);

        assert_eq!(registry.peer_at_slot(1).unwrap().id, ClientId(2));
        assert_eq!(registry.peer_at_slot(2).unwrap().id, ClientId(3));
    }

    #[test]
    fn test_evict_is_idempotent() {
        let mut registry = Registry::new(2);
        registry.admit(test_addr(), outbox()).unwrap();

        assert!(registry.evict(0).is_some());
        assert!(registry.evict(0).is_none());
        assert!(registry.evict(7).is_none());
    }

    #[test]
    fn test_peer_at_slot() {
        let mut registry = Registry::new(4);
        registry.admit(test_addr(), outbox()).unwrap();
        registry.admit(test_addr(), outbox()).unwrap();

        assert_eq!(registry.peer_at_slot(1).unwrap().id, ClientId(2));
        assert!(registry.peer_at_slot(3).is_none());
    }

    #[test]
    fn test_send_fails_after_receiver_drops() {
        let mut registry = Registry::new(1);
        let (tx, rx) = mpsc::channel(8);
        registry.admit(test_addr(), tx).unwrap();
        drop(rx);

        let peer = registry.peer_at_slot(0).unwrap();
        assert!(peer.send(Message::Opaque("ping".into())).is_err());
    }
}
