use bytes::Bytes;
use std::ops::{Deref, DerefMut};

/// Re-entrancy state for one packet traversal.
///
/// Every containment wrapper on the call chain enters the same scope, so a fault seen by
/// several nested wrappers is reported once. One scope per connection direction; it is
/// never shared between concurrent traversals.
#[derive(Debug, Default)]
pub struct FaultScope {
    depth: usize,
    reported: bool,
    capture: Option<Bytes>,
}

impl FaultScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_idle(&self) -> bool {
        self.depth == 0
    }

    pub fn reported(&self) -> bool {
        self.reported
    }

    /// The packet as it was when the outermost wrapper was entered.
    pub fn capture(&self) -> Option<&Bytes> {
        self.capture.as_ref()
    }

    /// Returns whether this call marked the fault; `false` if it was already reported.
    pub(crate) fn mark_reported(&mut self) -> bool {
        !std::mem::replace(&mut self.reported, true)
    }

    /// Enter one wrapper level. The guard leaves it again when dropped, on every exit path.
    pub fn enter(&mut self, buf: &Bytes) -> DepthGuard<'_> {
        if self.depth == 0 {
            self.capture = Some(buf.clone());
        }
        self.depth += 1;
        DepthGuard { scope: self }
    }

    fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.reported = false;
            self.capture = None;
        }
    }
}

pub struct DepthGuard<'a> {
    scope: &'a mut FaultScope,
}

impl Deref for DepthGuard<'_> {
    type Target = FaultScope;

    fn deref(&self) -> &FaultScope {
        self.scope
    }
}

impl DerefMut for DepthGuard<'_> {
    fn deref_mut(&mut self) -> &mut FaultScope {
        self.scope
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.scope.exit();
    }
}
