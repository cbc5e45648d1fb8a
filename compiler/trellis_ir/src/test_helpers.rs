//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::graph::Graph;
use crate::observer::{GraphEvent, GraphObserver};

/// Observer that appends every event to a shared log.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    events: Rc<RefCell<Vec<GraphEvent>>>,
}

impl EventLog {
    /// Register a fresh log on `graph` and return a handle to it.
    pub(crate) fn attach(graph: &mut Graph) -> Self {
        let log = Self::default();
        graph.add_observer(Box::new(log.clone()));
        log
    }

    pub(crate) fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl GraphObserver for EventLog {
    fn on_event(&mut self, event: &GraphEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
