//! Circular dependency detection infrastructure.

use crate::error::{DiError, DiResult};
use crate::key::Key;

/// Default maximum resolution depth.
pub const MAX_DEPTH: usize = 1024;

/// Identities currently being resolved, outermost first.
///
/// One chain lives for the duration of a single top-level resolve (or a
/// single registration-time cycle check) and is discarded afterwards.
#[derive(Debug)]
pub struct DependencyChain {
    stack: Vec<Key>,
    max_depth: usize,
}

impl DependencyChain {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    /// Pushes `identity`, failing if it is already on the chain.
    ///
    /// The reported path is the chain followed by the repeated identity,
    /// e.g. `["dyn A", "dyn B", "dyn A"]`.
    pub(crate) fn enter(&mut self, identity: &Key) -> DiResult<()> {
        // Circular detection BEFORE pushing the new identity
        if self.stack.contains(identity) {
            let mut path: Vec<&'static str> = self.stack.iter().map(Key::display_name).collect();
            path.push(identity.display_name());
            return Err(DiError::CircularDependency(path));
        }

        if self.stack.len() >= self.max_depth {
            return Err(DiError::DepthExceeded(self.stack.len()));
        }

        self.stack.push(*identity);
        Ok(())
    }

    pub(crate) fn exit(&mut self, identity: &Key) {
        if let Some(last) = self.stack.pop() {
            debug_assert_eq!(&last, identity);
        }
    }

    /// Current depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Identity names on the chain, outermost first.
    pub fn path(&self) -> Vec<&'static str> {
        self.stack.iter().map(Key::display_name).collect()
    }
}
