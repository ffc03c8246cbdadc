/// The importer's view of its own sync position.
///
/// The two flags are independent: `on_tip` tracks the last tip signal
/// received from the fetcher, `importing` tracks whether an import future is
/// in flight. Transitions produce a new value; the service that owns the
/// state is its only writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImporterState {
    on_tip: bool,
    importing: bool,
}

// === impl ImporterState ===

impl ImporterState {
    /// Whether the fetcher last reported this node caught up with the
    /// network tip.
    pub fn is_on_tip(&self) -> bool {
        self.on_tip
    }

    /// Whether an import is currently in flight.
    pub fn is_importing(&self) -> bool {
        self.importing
    }

    /// Whether a mined or peer-announced block may start an import right
    /// now.
    ///
    /// Single blocks are only meaningful at the tip, and never start while
    /// another import is in flight.
    pub fn accepts_single_blocks(&self) -> bool {
        self.on_tip && !self.importing
    }

    /// Records that the fetcher caught up with the network tip.
    pub fn set_on_tip(self) -> Self {
        Self { on_tip: true, ..self }
    }

    /// Records that the fetcher fell behind the network tip.
    pub fn clear_on_tip(self) -> Self {
        Self { on_tip: false, ..self }
    }

    /// Marks an import as dispatched. At most one import is ever in flight.
    pub fn begin_import(self) -> Self {
        Self { importing: true, ..self }
    }

    /// Marks the in-flight import as finished.
    pub fn end_import(self) -> Self {
        Self { importing: false, ..self }
    }
}
