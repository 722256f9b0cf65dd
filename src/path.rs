// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::node::Node;
use crate::{Error, Result, MAX_PATH};

/// A root-to-cursor stack of latched node handles for one operation
///
/// Every node pushed here stays latched for the path's entire lifetime —
/// latch coupling is hand-over-hand without early release, per the
/// traversal discipline the engine relies on to make split/collapse
/// cascades observe a consistent view of the whole path. Dropping a `Path`
/// drops every `Node` in reverse order, releasing their latches through
/// `BufferGuard`'s own `Drop` impl.
pub struct Path {
    nodes: Vec<Node>,
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

impl Path {
    /// Creates an empty path with room for [`MAX_PATH`] nodes
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(MAX_PATH),
        }
    }

    /// Appends `node` as the new cursor
    pub fn push(&mut self, node: Node) -> Result<()> {
        if self.nodes.len() >= MAX_PATH {
            return Err(Error::InvariantViolation("path exceeded MAX_PATH depth"));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Splices `parent` in above the current root, becoming the new root of the path
    pub fn splice_root_parent(&mut self, parent: Node) -> Result<()> {
        if self.nodes.len() >= MAX_PATH {
            return Err(Error::InvariantViolation("path exceeded MAX_PATH depth"));
        }
        self.nodes.insert(0, parent);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The frontier node reached so far
    #[must_use]
    pub fn cursor(&self) -> &Node {
        self.nodes.last().expect("path is never empty once created")
    }

    pub fn cursor_mut(&mut self) -> &mut Node {
        self.nodes
            .last_mut()
            .expect("path is never empty once created")
    }

    /// The cursor's parent, if any (absent only at the root)
    #[must_use]
    pub fn parent(&self) -> Option<&Node> {
        let len = self.nodes.len();
        if len < 2 {
            None
        } else {
            Some(&self.nodes[len - 2])
        }
    }

    /// Immutable access to the node at `idx` (0 is the root)
    #[must_use]
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Mutable access to the node at `idx` (0 is the root)
    pub fn node_mut(&mut self, idx: usize) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}
