//! Fixed-capacity slot table.
//!
//! One slot per possible line index. A slot is either fully populated or
//! absent; there is no half-built state to clean up.

use std::sync::Arc;

use pps_core::CaptureSource;

use crate::line::{DispatchToken, InputLine};

/// Number of line slots.
pub const MAX_LINES: usize = 8;

/// Bitmask selecting which line indices to enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineMask(u32);

impl LineMask {
    /// Mask with only line 0 enabled.
    pub const DEFAULT: Self = Self(1);

    /// Wrap a raw mask. Bits at or above [`MAX_LINES`] are kept here and
    /// reported by [`LineMask::ignored`].
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Bits that address no slot.
    pub const fn ignored(self) -> u32 {
        self.0 & !((1u32 << MAX_LINES) - 1)
    }

    /// Whether line `index` is enabled.
    pub fn contains(self, index: usize) -> bool {
        index < MAX_LINES && self.0 & (1 << index) != 0
    }

    /// Enabled line indices, ascending.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_LINES).filter(move |&i| self.contains(i))
    }

    /// Number of enabled line indices.
    pub fn count(self) -> usize {
        (self.0 & ((1u32 << MAX_LINES) - 1)).count_ones() as usize
    }
}

impl From<u32> for LineMask {
    fn from(bits: u32) -> Self {
        Self::new(bits)
    }
}

/// One enabled capture line.
///
/// Field order is drop order: the dispatch token goes first so the handler
/// is uninstalled before the source and the line are released.
pub struct LineSlot {
    pub(crate) dispatch: DispatchToken,
    pub(crate) source: Arc<CaptureSource>,
    pub(crate) line: Arc<dyn InputLine>,
    pub(crate) index: usize,
    pub(crate) irq: u32,
}

impl LineSlot {
    /// Line index in the mask.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Interrupt number of the line.
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// The capture source fed by this line.
    pub fn source(&self) -> &Arc<CaptureSource> {
        &self.source
    }

    /// Name of the input line.
    pub fn line_name(&self) -> &str {
        self.line.name()
    }
}

impl std::fmt::Debug for LineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSlot")
            .field("index", &self.index)
            .field("irq", &self.irq)
            .field("line", &self.line.name())
            .field("source", &self.source.name())
            .finish()
    }
}

/// Arena of slots indexed by line number.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: [Option<LineSlot>; MAX_LINES],
}

impl SlotTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any slot is populated.
    pub fn is_active(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        !self.is_active()
    }

    /// Slot at `index`, if populated.
    pub fn get(&self, index: usize) -> Option<&LineSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Populated slots, ascending by index.
    pub fn iter(&self) -> impl Iterator<Item = &LineSlot> {
        self.slots.iter().flatten()
    }

    pub(crate) fn install(&mut self, slot: LineSlot) {
        let index = slot.index;
        self.slots[index] = Some(slot);
    }

    /// Remove every slot, ascending by index.
    pub(crate) fn drain(&mut self) -> Vec<LineSlot> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_iteration() {
        let mask = LineMask::new(0b1010_0101);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 2, 5, 7]);
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.ignored(), 0);
    }

    #[test]
    fn test_mask_clips_high_bits() {
        let mask = LineMask::new(0x1_03);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.ignored(), 0x1_00);
        assert!(!mask.contains(8));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_empty_table() {
        let mut table = SlotTable::new();
        assert!(!table.is_active());
        assert_eq!(table.len(), 0);
        assert!(table.get(0).is_none());
        assert!(table.drain().is_empty());
    }
}
