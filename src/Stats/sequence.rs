// Continuity check on the counter carried in each message

use tracing::warn;

/// True iff `current` directly follows `previous`. Wraps at `u32::MAX`
/// like the counter on the wire.
#[inline]
pub fn check(previous: u32, current: u32) -> bool {
    current.wrapping_sub(previous) == 1
}

/// Tracks the last counter seen and how many discontinuities occurred.
///
/// A gap is reported and counted, never fatal: the run keeps going and
/// the new counter becomes the reference for the next message.
#[derive(Debug, Default, Clone)]
pub struct SequenceValidator {
    previous: Option<u32>,
    gaps: u64,
}

impl SequenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current`; returns false when it does not follow the
    /// previous counter. The first observation always passes.
    pub fn observe(&mut self, current: u32) -> bool {
        let in_order = match self.previous {
            None => true,
            Some(previous) => {
                let ok = check(previous, current);
                if !ok {
                    self.gaps += 1;
                    warn!(
                        previous,
                        current, "counter discontinuity, data corrupt!"
                    );
                }
                ok
            }
        };
        self.previous = Some(current);
        in_order
    }

    pub fn previous(&self) -> Option<u32> {
        self.previous
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }
}
