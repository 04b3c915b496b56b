//! Single consumer in front of the [`Database`].
//!
//! Connections never touch shared state directly. They send [`Event`]s
//! through a bounded channel and the registry task applies them one at a
//! time, in arrival order. A full inbox makes senders wait.

use std::collections::BTreeSet;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::client::{ClientId, ClientType};
use super::db::{Database, Outbound, Stats};
use super::error::RegistryClosed;
use super::protocol::{IAmCamera, Ticket};
use super::ticket::Sighting;

#[derive(Debug)]
pub enum Event {
    RegisterCamera {
        id: ClientId,
        camera: IAmCamera,
    },
    RegisterDispatcher {
        id: ClientId,
        roads: BTreeSet<u16>,
        outbound: Outbound,
    },
    DeregisterCamera {
        id: ClientId,
    },
    DeregisterDispatcher {
        id: ClientId,
    },
    RecordSighting(Sighting),
    /// Tickets a closing dispatcher never wrote to its socket.
    Requeue(Vec<Ticket>),
    Stats(oneshot::Sender<Stats>),
}

pub struct Registry {
    db: Database,
    inbox: mpsc::Receiver<Event>,
}

impl Registry {
    /// Spawn the registry task. It runs until every handle is dropped.
    pub fn start(capacity: usize) -> (RegistryHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(capacity.max(1));
        let registry = Registry {
            db: Database::new(),
            inbox,
        };
        let task = tokio::spawn(registry.run());
        (RegistryHandle { tx }, task)
    }

    async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            self.apply(event);
        }
        debug!(stats = ?self.db.stats(), "registry stopped");
    }

    fn apply(&mut self, event: Event) {
        trace!(?event, "registry event");
        match event {
            Event::RegisterCamera { id, camera } => self.db.register_camera(id, camera),
            Event::RegisterDispatcher {
                id,
                roads,
                outbound,
            } => self.db.register_dispatcher(id, roads, outbound),
            Event::DeregisterCamera { id } => self.db.deregister_camera(id),
            Event::DeregisterDispatcher { id } => self.db.deregister_dispatcher(id),
            Event::RecordSighting(sighting) => {
                self.db.record_sighting(sighting);
            }
            Event::Requeue(tickets) => self.db.requeue(tickets),
            Event::Stats(reply) => {
                let _ = reply.send(self.db.stats());
            }
        }
    }
}

/// Cheap to clone; one per connection.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Event>,
}

impl RegistryHandle {
    async fn send(&self, event: Event) -> Result<(), RegistryClosed> {
        self.tx.send(event).await.map_err(|_| RegistryClosed)
    }

    pub async fn register_camera(&self, id: ClientId, camera: IAmCamera) -> Result<(), RegistryClosed> {
        self.send(Event::RegisterCamera { id, camera }).await
    }

    pub async fn register_dispatcher(
        &self,
        id: ClientId,
        roads: BTreeSet<u16>,
        outbound: Outbound,
    ) -> Result<(), RegistryClosed> {
        self.send(Event::RegisterDispatcher {
            id,
            roads,
            outbound,
        })
        .await
    }

    pub async fn record_sighting(&self, sighting: Sighting) -> Result<(), RegistryClosed> {
        self.send(Event::RecordSighting(sighting)).await
    }

    pub async fn requeue(&self, tickets: Vec<Ticket>) -> Result<(), RegistryClosed> {
        self.send(Event::Requeue(tickets)).await
    }

    /// Remove whatever `client_type` registered. Unidentified clients have
    /// nothing to remove.
    pub async fn deregister(
        &self,
        id: ClientId,
        client_type: Option<&ClientType>,
    ) -> Result<(), RegistryClosed> {
        match client_type {
            Some(ClientType::Camera(_)) => self.send(Event::DeregisterCamera { id }).await,
            Some(ClientType::Dispatcher { .. }) => {
                self.send(Event::DeregisterDispatcher { id }).await
            }
            None => Ok(()),
        }
    }

    pub async fn stats(&self) -> Result<Stats, RegistryClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Stats(reply)).await?;
        rx.await.map_err(|_| RegistryClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::protocol::Message;
    use tokio::sync::mpsc::unbounded_channel;

    fn sighting(plate: &str, mile: u16, timestamp: u32) -> Sighting {
        Sighting {
            plate: plate.to_string(),
            road: 123,
            mile,
            limit: 60,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_events_are_applied_in_order() {
        let (registry, _task) = Registry::start(4);
        let camera = IAmCamera {
            road: 123,
            mile: 8,
            limit: 60,
        };
        registry.register_camera(1, camera).await.unwrap();
        registry.record_sighting(sighting("UN1X", 8, 0)).await.unwrap();
        registry.record_sighting(sighting("UN1X", 9, 45)).await.unwrap();

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.cameras, 1);
        assert_eq!(stats.sightings, 2);
        assert_eq!(stats.pending_tickets, 1);

        let (tx, mut rx) = unbounded_channel();
        registry
            .register_dispatcher(2, BTreeSet::from([123]), tx)
            .await
            .unwrap();

        let expected = Message::Ticket(Ticket {
            plate: "UN1X".to_string(),
            road: 123,
            mile1: 8,
            timestamp1: 0,
            mile2: 9,
            timestamp2: 45,
            speed: 8000,
        });
        assert_eq!(rx.recv().await, Some(expected));
        assert_eq!(registry.stats().await.unwrap().pending_tickets, 0);
    }

    #[tokio::test]
    async fn test_deregister_by_role() {
        let (registry, _task) = Registry::start(4);
        let (tx, _rx) = unbounded_channel();
        let roads = BTreeSet::from([1, 2]);
        registry.register_dispatcher(7, roads.clone(), tx).await.unwrap();
        assert_eq!(registry.stats().await.unwrap().dispatchers, 1);

        registry.deregister(8, None).await.unwrap();
        registry
            .deregister(7, Some(&ClientType::Dispatcher { roads }))
            .await
            .unwrap();
        assert_eq!(registry.stats().await.unwrap().dispatchers, 0);
    }

    #[tokio::test]
    async fn test_requeue_after_dispatcher_leaves() {
        let (registry, _task) = Registry::start(4);
        registry.record_sighting(sighting("UN1X", 8, 0)).await.unwrap();
        registry.record_sighting(sighting("UN1X", 9, 45)).await.unwrap();

        let roads = BTreeSet::from([123]);
        let (tx, mut first) = unbounded_channel();
        registry.register_dispatcher(1, roads.clone(), tx).await.unwrap();
        let Some(Message::Ticket(unsent)) = first.recv().await else {
            panic!("expected the pending ticket");
        };
        registry
            .deregister(1, Some(&ClientType::Dispatcher { roads: roads.clone() }))
            .await
            .unwrap();
        registry.requeue(vec![unsent.clone()]).await.unwrap();
        assert_eq!(registry.stats().await.unwrap().pending_tickets, 1);

        let (tx, mut second) = unbounded_channel();
        registry.register_dispatcher(2, roads, tx).await.unwrap();
        assert_eq!(second.recv().await, Some(Message::Ticket(unsent)));
        assert_eq!(registry.stats().await.unwrap().pending_tickets, 0);
    }

    #[tokio::test]
    async fn test_registry_stops_when_handles_drop() {
        let (registry, task) = Registry::start(1);
        drop(registry);
        task.await.unwrap();
    }
}
