//! State shared by every connection: cameras, dispatchers, sighting history,
//! ticketed days and tickets waiting for a dispatcher.
//!
//! [`Database`] is plain synchronous data. It is owned by the registry task
//! (see `registry.rs`), which applies one event at a time, so none of these
//! maps need a lock.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::client::ClientId;
use super::protocol::{IAmCamera, Message, Ticket};
use super::ticket::{self, Sighting};

/// Queue feeding a connection's writer task.
pub type Outbound = UnboundedSender<Message>;

struct Dispatcher {
    roads: BTreeSet<u16>,
    outbound: Outbound,
}

/// Counters for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub cameras: usize,
    pub dispatchers: usize,
    pub sightings: usize,
    pub pending_tickets: usize,
    pub tickets_issued: usize,
}

#[derive(Default)]
pub struct Database {
    cameras: HashMap<ClientId, IAmCamera>,
    dispatchers: HashMap<ClientId, Dispatcher>,
    /// Dispatchers per road, in registration order.
    roads: HashMap<u16, Vec<ClientId>>,
    /// Sightings per (plate, road), in arrival order.
    history: HashMap<(String, u16), Vec<Sighting>>,
    /// Days each plate has been ticketed for, on any road.
    ticketed_days: HashMap<String, BTreeSet<u32>>,
    pending: HashMap<u16, VecDeque<Ticket>>,
    tickets_issued: usize,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_camera(&mut self, id: ClientId, camera: IAmCamera) {
        info!(
            client_id = id,
            road = camera.road,
            mile = camera.mile,
            limit = camera.limit,
            "registered camera"
        );
        self.cameras.insert(id, camera);
    }

    pub fn deregister_camera(&mut self, id: ClientId) {
        if self.cameras.remove(&id).is_none() {
            warn!(client_id = id, "deregistering unknown camera");
        }
    }

    /// Route tickets for `roads` to `outbound`, then flush whatever was
    /// waiting for those roads.
    pub fn register_dispatcher(&mut self, id: ClientId, roads: BTreeSet<u16>, outbound: Outbound) {
        info!(client_id = id, ?roads, "registered dispatcher");
        for road in &roads {
            self.roads.entry(*road).or_default().push(id);
        }
        let flush: Vec<u16> = roads.iter().copied().collect();
        self.dispatchers.insert(id, Dispatcher { roads, outbound });

        for road in flush {
            self.drain_pending_for(road);
        }
    }

    pub fn deregister_dispatcher(&mut self, id: ClientId) {
        let Some(dispatcher) = self.dispatchers.remove(&id) else {
            warn!(client_id = id, "deregistering unknown dispatcher");
            return;
        };
        for road in dispatcher.roads {
            self.unroute(road, id);
        }
    }

    fn unroute(&mut self, road: u16, id: ClientId) {
        if let Some(ids) = self.roads.get_mut(&road) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.roads.remove(&road);
            }
        }
    }

    /// Deliver pending tickets for `road`, oldest first. Tickets that find
    /// no live dispatcher go back to the queue in their original order.
    pub fn drain_pending_for(&mut self, road: u16) {
        let Some(queue) = self.pending.remove(&road) else {
            return;
        };
        debug!(road, count = queue.len(), "draining pending tickets");
        for ticket in queue {
            self.deliver(ticket);
        }
    }

    /// Put tickets a dispatcher never wrote back at the front of their road
    /// queues, keeping their order, then offer them to the remaining
    /// dispatchers.
    pub fn requeue(&mut self, tickets: Vec<Ticket>) {
        let mut roads = BTreeSet::new();
        for ticket in tickets.into_iter().rev() {
            roads.insert(ticket.road);
            self.pending.entry(ticket.road).or_default().push_front(ticket);
        }
        for road in roads {
            self.drain_pending_for(road);
        }
    }

    /// Store a sighting and deliver the ticket it triggers, if any.
    pub fn record_sighting(&mut self, sighting: Sighting) -> Option<Ticket> {
        let key = (sighting.plate.clone(), sighting.road);
        let history = self.history.entry(key).or_default();
        history.push(sighting);
        let newest = history.last()?;

        let ticketed = self.ticketed_days.entry(newest.plate.clone()).or_default();
        let ticket = ticket::issue_ticket(history, newest, ticketed)?;

        info!(
            plate = %ticket.plate,
            road = ticket.road,
            speed = ticket.speed,
            day1 = ticket::day(ticket.timestamp1),
            day2 = ticket::day(ticket.timestamp2),
            "issued ticket"
        );
        self.tickets_issued += 1;
        self.deliver(ticket.clone());
        Some(ticket)
    }

    /// Hand a ticket to the first live dispatcher of its road, or queue it.
    pub fn deliver(&mut self, ticket: Ticket) {
        let road = ticket.road;
        let mut message = Message::Ticket(ticket);

        while let Some(id) = self.roads.get(&road).and_then(|ids| ids.first().copied()) {
            let Some(dispatcher) = self.dispatchers.get(&id) else {
                warn!(client_id = id, road, "routing entry without dispatcher");
                self.unroute(road, id);
                continue;
            };
            match dispatcher.outbound.send(message) {
                Ok(()) => {
                    debug!(client_id = id, road, "ticket sent to dispatcher");
                    return;
                }
                Err(returned) => {
                    // Writer is gone, the connection will deregister shortly
                    warn!(client_id = id, road, "dispatcher closed, dropping route");
                    message = returned.0;
                    self.deregister_dispatcher(id);
                }
            }
        }

        if let Message::Ticket(ticket) = message {
            info!(plate = %ticket.plate, road, "no dispatcher, ticket queued");
            self.pending.entry(road).or_default().push_back(ticket);
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            cameras: self.cameras.len(),
            dispatchers: self.dispatchers.len(),
            sightings: self.history.values().map(Vec::len).sum(),
            pending_tickets: self.pending.values().map(VecDeque::len).sum(),
            tickets_issued: self.tickets_issued,
        }
    }
}
