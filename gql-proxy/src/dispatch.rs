use crate::fanout::FanOut;
use cluster::ClusterContext;
use shared::handler::Handler;
use std::collections::HashMap;
use std::sync::Arc;

/// Search operations that need every member's metadata to be answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GlobalSearch,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[Operation::GlobalSearch];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::GlobalSearch => "GlobalSearch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }
}

/// Where a classified query goes.
pub enum Dispatch<'a> {
    Cluster(Operation, &'a dyn Handler),
    Local,
}

/// Cluster-aware handlers keyed by operation.
pub struct DispatchTable {
    handlers: HashMap<Operation, Arc<dyn Handler>>,
}

impl DispatchTable {
    /// The table used in production: `GlobalSearch` fans out to all members.
    pub fn new(cluster: Arc<ClusterContext>) -> Self {
        let mut table = Self::empty();
        table.insert(
            Operation::GlobalSearch,
            FanOut::new(cluster, Operation::GlobalSearch),
        );
        table
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, operation: Operation, handler: impl Handler) {
        self.handlers.insert(operation, Arc::new(handler));
    }

    pub fn lookup(&self, operation: &str) -> Dispatch<'_> {
        let entry = Operation::from_name(operation)
            .and_then(|op| self.handlers.get(&op).map(|handler| (op, handler)));

        match entry {
            Some((op, handler)) => Dispatch::Cluster(op, handler.as_ref()),
            None => Dispatch::Local,
        }
    }
}
