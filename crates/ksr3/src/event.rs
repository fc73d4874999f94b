//! Time-ordered event queue.
//!
//! Events are keyed by (time, insertion sequence): ties in time resolve
//! in FIFO order, which keeps replays deterministic. Stale events are
//! erased eagerly by the engine (by vertex, or by iedge within one
//! plane) before the structures they reference are edited.

use std::collections::BTreeSet;

use crate::igraph::{IEdgeId, IVertexId};
use crate::registry::PVertex;

/// What a moving vertex is about to hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventKind {
    /// A cycle-neighbor vertex of the same face.
    VertexVertex { pother: PVertex },
    /// An intersection edge crossing its path.
    VertexEdge { iedge: IEdgeId },
    /// An endpoint of the iedge it slides along.
    VertexIvertex { ivertex: IVertexId },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub pvertex: PVertex,
    pub kind: EventKind,
    pub time: f64,
}

#[derive(Clone, Debug)]
struct Queued {
    time: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for Queued {}
impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    set: BTreeSet<Queued>,
    next_seq: u64,
}

impl EventQueue {
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.set.insert(Queued {
            time: event.time,
            seq,
            event,
        });
    }

    /// Earliest pending event.
    pub fn pop_min(&mut self) -> Option<Event> {
        self.set.pop_first().map(|q| q.event)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn clear(&mut self) {
        self.set.clear();
    }

    /// Drop every event mentioning `pv`, as subject or as the other
    /// vertex of a vertex-vertex event.
    pub fn remove_vertex_events(&mut self, pv: PVertex) {
        self.set.retain(|q| {
            q.event.pvertex != pv
                && !matches!(q.event.kind, EventKind::VertexVertex { pother } if pother == pv)
        });
    }

    /// Drop every vertex-edge event against `iedge` on one support plane.
    pub fn remove_edge_events(&mut self, iedge: IEdgeId, plane: usize) {
        self.set.retain(|q| {
            !(q.event.pvertex.plane == plane
                && matches!(q.event.kind, EventKind::VertexEdge { iedge: e } if e == iedge))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::LVertex;

    fn pv(plane: usize, index: u32) -> PVertex {
        PVertex {
            plane,
            vertex: LVertex { index, gen: 0 },
        }
    }

    fn edge_event(p: PVertex, iedge: IEdgeId, time: f64) -> Event {
        Event {
            pvertex: p,
            kind: EventKind::VertexEdge { iedge },
            time,
        }
    }

    #[test]
    fn pops_in_time_order_fifo_on_ties() {
        let mut q = EventQueue::default();
        q.push(edge_event(pv(0, 0), IEdgeId(0), 2.0));
        q.push(edge_event(pv(0, 1), IEdgeId(1), 1.0));
        q.push(edge_event(pv(0, 2), IEdgeId(2), 1.0));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_min().unwrap().pvertex, pv(0, 1));
        assert_eq!(q.pop_min().unwrap().pvertex, pv(0, 2));
        assert_eq!(q.pop_min().unwrap().time, 2.0);
        assert!(q.pop_min().is_none());
    }

    #[test]
    fn removes_events_touching_a_vertex() {
        let mut q = EventQueue::default();
        let a = pv(0, 0);
        let b = pv(0, 1);
        q.push(edge_event(a, IEdgeId(0), 1.0));
        q.push(Event {
            pvertex: b,
            kind: EventKind::VertexVertex { pother: a },
            time: 2.0,
        });
        q.push(edge_event(b, IEdgeId(1), 3.0));
        q.remove_vertex_events(a);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_min().unwrap().time, 3.0);
    }

    #[test]
    fn removes_edge_events_per_plane() {
        let mut q = EventQueue::default();
        q.push(edge_event(pv(6, 0), IEdgeId(5), 1.0));
        q.push(edge_event(pv(7, 0), IEdgeId(5), 1.5));
        q.push(edge_event(pv(6, 1), IEdgeId(6), 2.0));
        q.remove_edge_events(IEdgeId(5), 6);
        assert_eq!(q.len(), 2);
        // The same edge seen from another plane keeps its event.
        assert_eq!(q.pop_min().unwrap().pvertex.plane, 7);
    }
}
