//! Authored audio connections and loop prevention.

#[cfg(not(feature = "std"))]
use alloc::{format, vec::Vec};

use super::directed::DirectedGraph;
use super::{GraphError, NodeId};

/// A channel-scoped audio edge.
///
/// Routes `channels` consecutive channels: output `output + k` of `from` feeds
/// input `input + k` of `to` for every `k < channels`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Upstream node.
    pub from: NodeId,
    /// First output channel of `from`.
    pub output: usize,
    /// Downstream node.
    pub to: NodeId,
    /// First input channel of `to`.
    pub input: usize,
    /// Number of consecutive channels routed.
    pub channels: usize,
}

impl Connection {
    /// Single-channel connection `from.output → to.input`.
    pub const fn new(from: NodeId, output: usize, to: NodeId, input: usize) -> Self {
        Self {
            from,
            output,
            to,
            input,
            channels: 1,
        }
    }

    /// Returns a copy routing `channels` consecutive channels.
    pub const fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// One past the last output channel used, or `None` if it overflows.
    #[inline]
    pub const fn output_end(&self) -> Option<usize> {
        self.output.checked_add(self.channels)
    }

    /// One past the last input channel used, or `None` if it overflows.
    #[inline]
    pub const fn input_end(&self) -> Option<usize> {
        self.input.checked_add(self.channels)
    }

    /// `(output channel, input channel)` pairs covered by this connection.
    pub fn links(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let (output, input) = (self.output, self.input);
        (0..self.channels).map(move |k| (output + k, input + k))
    }

    /// Returns `true` if `node` is either end of the connection.
    #[inline]
    pub fn touches(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }
}

impl core::fmt::Display for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.from, self.output, self.to, self.input
        )?;
        if self.channels != 1 {
            write!(f, " (x{})", self.channels)?;
        }
        Ok(())
    }
}

/// The set of authored connections between nodes.
///
/// Every accepted edit bumps [`generation`](Self::generation). Owners of a
/// built plan compare generations to know when to rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    connections: Vec<Connection>,
    generation: u64,
}

impl ConnectionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection after checking it cannot close a loop.
    ///
    /// Returns `Ok(true)` if the connection was stored and `Ok(false)` if an
    /// identical one already exists. On error the table is unchanged.
    ///
    /// # Errors
    ///
    /// - [`GraphError::InvalidConnection`] if the connection spans no channels
    ///   or its channel range does not fit in `usize`
    /// - [`GraphError::CycleDetected`] if the edge would create a cycle
    pub fn connect(&mut self, connection: Connection) -> Result<bool, GraphError> {
        if connection.channels == 0 {
            return Err(GraphError::InvalidConnection(format!(
                "{connection} spans zero channels"
            )));
        }
        if connection.output_end().is_none() || connection.input_end().is_none() {
            return Err(GraphError::InvalidConnection(format!(
                "{connection} channel range overflows"
            )));
        }
        if self.contains(&connection) {
            return Ok(false);
        }
        if self.would_create_cycle(connection.from, connection.to) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%connection, "rejected connection: would create a cycle");
            return Err(GraphError::CycleDetected {
                from: connection.from,
                to: connection.to,
            });
        }

        self.connections.push(connection);
        self.generation += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(%connection, generation = self.generation, "connected");
        Ok(true)
    }

    /// Removes a connection. Returns `true` if it was present.
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        let Some(pos) = self.connections.iter().position(|c| c == connection) else {
            return false;
        };
        self.connections.remove(pos);
        self.generation += 1;
        true
    }

    /// Removes every connection from `from` to `to`. Returns how many went.
    pub fn disconnect_between(&mut self, from: NodeId, to: NodeId) -> usize {
        self.remove_where(|c| c.from == from && c.to == to)
    }

    /// Removes every connection touching `node`. Returns how many went.
    pub fn remove_node(&mut self, node: NodeId) -> usize {
        self.remove_where(|c| c.touches(node))
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&Connection) -> bool) -> usize {
        let before = self.connections.len();
        self.connections.retain(|c| !pred(c));
        let removed = before - self.connections.len();
        if removed > 0 {
            self.generation += 1;
        }
        removed
    }

    /// Removes every connection.
    pub fn clear(&mut self) {
        if !self.connections.is_empty() {
            self.connections.clear();
            self.generation += 1;
        }
    }

    /// Returns `true` if an identical connection is stored.
    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    /// Returns `true` if any connection leads from `from` to `to`.
    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.connections
            .iter()
            .any(|c| c.from == from && c.to == to)
    }

    /// Dry run: would an edge `from → to` close a loop?
    pub fn would_create_cycle(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut graph = self.graph();
        graph.add_edge(from, to);
        graph.make_linear().is_err()
    }

    /// Connections arriving at `node`, in insertion order.
    pub fn inputs(&self, node: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.to == node)
    }

    /// Connections leaving `node`, in insertion order.
    pub fn outputs(&self, node: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.from == node)
    }

    /// All connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter()
    }

    /// Number of stored connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connections are stored.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Edit counter, bumped by every accepted change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Builds the transient node graph over all stored connections.
    ///
    /// Nodes are inserted in order of first appearance.
    pub fn graph(&self) -> DirectedGraph<NodeId> {
        let mut graph = DirectedGraph::new();
        for c in &self.connections {
            graph.add_edge(c.from, c.to);
        }
        graph
    }
}

impl<'a> IntoIterator for &'a ConnectionTable {
    type Item = &'a Connection;
    type IntoIter = core::slice::Iter<'a, Connection>;

    fn into_iter(self) -> Self::IntoIter {
        self.connections.iter()
    }
}
