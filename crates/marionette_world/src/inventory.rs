//! # Entity Inventory
//!
//! Fixed-size slot inventory carried by a scripted entity.
//!
//! All slots are allocated at creation time; add/remove never allocate.
//! Snapshot and restore are plain copies, which is what the snapshot store
//! relies on when it captures an inventory before the first change.

use crate::block::BlockKind;
use crate::error::{WorldError, WorldResult};
use serde::{Deserialize, Serialize};

/// Number of slots in an entity inventory.
pub const INVENTORY_SLOTS: usize = 36;

/// Maximum items per stack.
pub const MAX_STACK: u32 = 64;

/// A stack of items in one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// What the stack holds.
    pub kind: BlockKind,
    /// How many.
    pub count: u32,
}

impl ItemStack {
    /// Creates a stack.
    #[inline]
    #[must_use]
    pub const fn new(kind: BlockKind, count: u32) -> Self {
        Self { kind, count }
    }
}

/// Slot inventory with a selected slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    selected: usize,
}

impl Inventory {
    /// Creates an empty inventory with slot 0 selected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; INVENTORY_SLOTS],
            selected: 0,
        }
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn check_slot(&self, slot: usize) -> WorldResult<()> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(WorldError::InvalidSlot {
                slot,
                capacity: self.slots.len(),
            })
        }
    }

    /// Stack in a slot, if any.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<ItemStack> {
        self.slots.get(slot).copied().flatten()
    }

    /// Currently selected slot.
    #[inline]
    #[must_use]
    pub const fn selected_slot(&self) -> usize {
        self.selected
    }

    /// Stack in the selected slot, if any.
    #[must_use]
    pub fn selected(&self) -> Option<ItemStack> {
        self.get(self.selected)
    }

    /// Selects a slot.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InvalidSlot` for an out-of-range slot.
    pub fn select(&mut self, slot: usize) -> WorldResult<()> {
        self.check_slot(slot)?;
        self.selected = slot;
        Ok(())
    }

    /// Counts items of a kind across all slots.
    #[must_use]
    pub fn count(&self, kind: BlockKind) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.kind == kind)
            .map(|stack| stack.count)
            .sum()
    }

    /// First slot holding `kind`.
    #[must_use]
    pub fn find(&self, kind: BlockKind) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(stack) if stack.kind == kind))
    }

    /// Adds items, topping up existing stacks before using empty slots.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InventoryFull` if not everything fits. Nothing is
    /// added in that case.
    pub fn add(&mut self, kind: BlockKind, count: u32) -> WorldResult<()> {
        if kind.is_air() || count == 0 {
            return Ok(());
        }
        let room: u32 = self
            .slots
            .iter()
            .map(|slot| match slot {
                None => MAX_STACK,
                Some(stack) if stack.kind == kind => MAX_STACK.saturating_sub(stack.count),
                Some(_) => 0,
            })
            .sum();
        if room < count {
            return Err(WorldError::InventoryFull { amount: count });
        }

        let mut remaining = count;
        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.kind == kind && stack.count < MAX_STACK {
                let take = (MAX_STACK - stack.count).min(remaining);
                stack.count += take;
                remaining -= take;
            }
        }
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let take = remaining.min(MAX_STACK);
                *slot = Some(ItemStack::new(kind, take));
                remaining -= take;
            }
        }
        Ok(())
    }

    /// Removes up to `count` items from one slot and returns what was taken.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InvalidSlot` for an out-of-range slot.
    pub fn take(&mut self, slot: usize, count: u32) -> WorldResult<Option<ItemStack>> {
        self.check_slot(slot)?;
        let Some(stack) = self.slots[slot].as_mut() else {
            return Ok(None);
        };
        let taken = stack.count.min(count);
        stack.count -= taken;
        let kind = stack.kind;
        if stack.count == 0 {
            self.slots[slot] = None;
        }
        Ok((taken > 0).then_some(ItemStack::new(kind, taken)))
    }

    /// Overwrites one slot, returning what it held.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InvalidSlot` for an out-of-range slot.
    pub fn put(&mut self, slot: usize, stack: Option<ItemStack>) -> WorldResult<Option<ItemStack>> {
        self.check_slot(slot)?;
        let stack = stack.filter(|s| s.count > 0 && !s.kind.is_air());
        Ok(std::mem::replace(&mut self.slots[slot], stack))
    }

    /// Swaps two slots.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InvalidSlot` if either slot is out of range.
    pub fn swap(&mut self, a: usize, b: usize) -> WorldResult<()> {
        self.check_slot(a)?;
        self.check_slot(b)?;
        self.slots.swap(a, b);
        Ok(())
    }

    /// Moves a stack into another slot, merging when the kinds match.
    ///
    /// Returns false (and changes nothing) when the target holds a different
    /// kind or the merged stack would overflow.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::InvalidSlot` if either slot is out of range.
    pub fn move_stack(&mut self, from: usize, to: usize) -> WorldResult<bool> {
        self.check_slot(from)?;
        self.check_slot(to)?;
        if from == to {
            return Ok(true);
        }
        match (self.slots[from], self.slots[to]) {
            (None, _) => Ok(false),
            (Some(moving), None) => {
                self.slots[to] = Some(moving);
                self.slots[from] = None;
                Ok(true)
            }
            (Some(moving), Some(target))
                if moving.kind == target.kind && moving.count + target.count <= MAX_STACK =>
            {
                self.slots[to] = Some(ItemStack::new(target.kind, moving.count + target.count));
                self.slots[from] = None;
                Ok(true)
            }
            (Some(_), Some(_)) => Ok(false),
        }
    }

    /// Iterates over occupied slots.
    pub fn stacks(&self) -> impl Iterator<Item = (usize, ItemStack)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|stack| (index, stack)))
    }

    /// Returns true if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_stacks_then_spills() {
        let mut inv = Inventory::new();
        inv.add(BlockKind::Stone, 60).unwrap();
        inv.add(BlockKind::Stone, 10).unwrap();
        assert_eq!(inv.count(BlockKind::Stone), 70);
        assert_eq!(inv.get(0), Some(ItemStack::new(BlockKind::Stone, 64)));
        assert_eq!(inv.get(1), Some(ItemStack::new(BlockKind::Stone, 6)));
    }

    #[test]
    fn test_add_full_is_atomic() {
        let mut inv = Inventory::new();
        inv.add(BlockKind::Dirt, MAX_STACK * INVENTORY_SLOTS as u32).unwrap();
        let before = inv.clone();
        assert_eq!(
            inv.add(BlockKind::Stone, 1),
            Err(WorldError::InventoryFull { amount: 1 })
        );
        assert_eq!(inv, before);
    }

    #[test]
    fn test_take_and_find() {
        let mut inv = Inventory::new();
        inv.add(BlockKind::Torch, 3).unwrap();
        let slot = inv.find(BlockKind::Torch).unwrap();
        assert_eq!(inv.take(slot, 5).unwrap(), Some(ItemStack::new(BlockKind::Torch, 3)));
        assert!(inv.is_empty());
        assert_eq!(inv.take(slot, 1).unwrap(), None);
    }

    #[test]
    fn test_swap_and_move() {
        let mut inv = Inventory::new();
        inv.add(BlockKind::Stone, 10).unwrap();
        inv.swap(0, 5).unwrap();
        assert_eq!(inv.get(0), None);
        assert_eq!(inv.find(BlockKind::Stone), Some(5));

        inv.add(BlockKind::Stone, 64).unwrap();
        // slot 5 is full at 64; the overflow landed in slot 0.
        assert_eq!(inv.get(0), Some(ItemStack::new(BlockKind::Stone, 10)));
        assert!(!inv.move_stack(0, 5).unwrap());
        assert!(inv.move_stack(0, 7).unwrap());
        assert_eq!(inv.get(7), Some(ItemStack::new(BlockKind::Stone, 10)));
    }

    #[test]
    fn test_invalid_slot() {
        let mut inv = Inventory::new();
        assert_eq!(
            inv.select(INVENTORY_SLOTS),
            Err(WorldError::InvalidSlot {
                slot: INVENTORY_SLOTS,
                capacity: INVENTORY_SLOTS
            })
        );
        inv.select(3).unwrap();
        assert_eq!(inv.selected_slot(), 3);
    }

    #[test]
    fn test_put_replaces_slot() {
        let mut inv = Inventory::new();
        assert_eq!(inv.put(4, Some(ItemStack::new(BlockKind::Glass, 3))), Ok(None));
        assert_eq!(
            inv.put(4, Some(ItemStack::new(BlockKind::Air, 1))),
            Ok(Some(ItemStack::new(BlockKind::Glass, 3)))
        );
        assert!(inv.is_empty());
    }
}
