use std::collections::btree_set;
use std::collections::BTreeSet;
use std::sync::mpsc::{channel, Receiver, Sender};

use tracing::{debug, trace};

use crate::simulation::id::Id;
use crate::simulation::network::{Link, Node};

/// Working set of active elements of one kind plus an intake queue for activations.
///
/// Activations go through the intake queue and become visible only when the owner calls
/// [ActiveSet::drain], which it does once per phase before iterating. Elements activated while the
/// set is iterated are picked up in the next phase. The set is ordered, so that iteration happens in
/// ascending id order and runs are reproducible.
///
/// Ids at or above the bound are dropped while draining.
#[derive(Debug)]
pub struct ActiveSet<C> {
    active: BTreeSet<Id<C>>,
    sender: Sender<Id<C>>,
    intake: Receiver<Id<C>>,
    bound: usize,
}

impl<C> Default for ActiveSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ActiveSet<C> {
    pub fn new() -> Self {
        Self::with_bound(usize::MAX)
    }

    /// Set which only accepts ids with an index below `bound`.
    pub fn with_bound(bound: usize) -> Self {
        let (sender, intake) = channel();
        ActiveSet {
            active: BTreeSet::new(),
            sender,
            intake,
            bound,
        }
    }

    /// Producer handle for the intake queue.
    pub fn sender(&self) -> Sender<Id<C>> {
        self.sender.clone()
    }

    /// Moves everything from the intake queue into the working set. Returns the number of drained
    /// activations, including duplicates but without unknown ids.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(id) = self.intake.try_recv() {
            if id.index() >= self.bound {
                debug!("Ignoring activation of unknown id {id}");
                continue;
            }
            self.active.insert(id);
            count += 1;
        }
        count
    }

    pub fn deactivate(&mut self, id: &Id<C>) {
        self.active.remove(id);
    }

    pub fn contains(&self, id: &Id<C>) -> bool {
        self.active.contains(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Id<C>> {
        self.active.iter()
    }
}

impl<'a, C> IntoIterator for &'a ActiveSet<C> {
    type Item = &'a Id<C>;
    type IntoIter = btree_set::Iter<'a, Id<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.active.iter()
    }
}

/// Cloneable, `Send` handle which activates links and nodes of one engine. Activations are idempotent.
#[derive(Debug, Clone)]
pub struct Activator {
    links: Sender<Id<Link>>,
    nodes: Sender<Id<Node>>,
}

impl Activator {
    pub fn new(links: Sender<Id<Link>>, nodes: Sender<Id<Node>>) -> Self {
        Activator { links, nodes }
    }

    pub fn activate_link(&self, id: Id<Link>) {
        if self.links.send(id).is_err() {
            trace!("Engine is gone. Dropping activation of link {id}");
        }
    }

    pub fn activate_node(&self, id: Id<Node>) {
        if self.nodes.send(id).is_err() {
            trace!("Engine is gone. Dropping activation of node {id}");
        }
    }
}
