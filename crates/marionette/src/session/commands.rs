//! # Command Surface
//!
//! Blocking calls a script makes on its session. Every command follows the
//! same path:
//!
//! ```text
//!   script thread                         loop thread
//!   ─────────────                         ───────────
//!   ensure_live()
//!   admit(cost)  ── rejected? ──> Err(AdmissionRejected), nothing queued
//!   submit_for_result(delay) ───────────> action(world, scope)
//!   future.wait()  <───────── complete / fail ──┘
//! ```
//!
//! Mutating actions record every location they touch in the open checkpoint
//! before changing it, so `reset()` can put it back.

use super::EntitySession;
use crate::runtime::{DynWorld, WorldRunner};
use marionette_core::{CommandError, CommandResult, EntityId};
use marionette_world::{
    BlockKind, BlockPos, BlockState, Capabilities, CoordMode, Direction, Facing, Inventory,
    ItemStack, PlaceSide, Placement, RestoreReport, SnapshotStore, WorldAccess, WorldError,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of [`EntitySession::init_area`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointOpened {
    /// Placement the checkpoint will restore the entity to.
    pub origin: Placement,
    /// Entries dropped from a checkpoint that was still open, if any.
    pub replaced_entries: Option<usize>,
}

/// What a loop action may touch besides the world.
struct Scope {
    id: EntityId,
    snapshot: Arc<Mutex<SnapshotStore>>,
    runner: Arc<WorldRunner>,
}

impl Scope {
    fn placement(&self, world: &DynWorld) -> CommandResult<Placement> {
        world
            .placement_of(self.id)
            .ok_or_else(|| WorldError::ActorMissing.into())
    }

    fn record_block(&self, world: &DynWorld, pos: BlockPos) {
        self.snapshot.lock().record_block(world, pos);
    }

    fn record_inventory(&self, world: &DynWorld) {
        self.snapshot.lock().record_inventory(world);
    }

    fn target(
        &self,
        world: &DynWorld,
        offset: BlockPos,
        mode: CoordMode,
    ) -> CommandResult<BlockPos> {
        Ok(mode.resolve(self.placement(world)?, offset))
    }
}

impl EntitySession {
    /// Admits, schedules and waits for one loop action.
    fn run<T, F>(&self, cost: u32, delay_ticks: u64, action: F) -> CommandResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DynWorld, &Scope) -> CommandResult<T> + Send + 'static,
    {
        self.ensure_live()?;
        self.admit(cost)?;
        let scope = Scope {
            id: self.id,
            snapshot: Arc::clone(&self.snapshot),
            runner: Arc::clone(self.runtime.runner()),
        };
        self.runtime
            .runner()
            .submit_for_result(Some(self.id), delay_ticks, move |world| action(world, &scope))
            .wait()
    }

    fn command_delay(&self) -> u64 {
        self.runtime.config().scheduler.command_delay_ticks
    }

    fn flat_cost(&self) -> u32 {
        self.runtime.config().stamina.flat_cost
    }

    fn walk(&self, direction: Direction, steps: u32) -> CommandResult<bool> {
        if steps == 0 {
            return Ok(true);
        }
        let cost = self.runtime.config().stamina.movement_cost(steps);
        self.run(cost, self.command_delay(), move |world, scope| {
            for _ in 0..steps {
                let placement = scope.placement(world)?;
                let heading = direction.heading(placement.facing());
                let next = placement.pos.step(heading, 1);
                if !world.can_occupy(next) || !world.relocate(scope.id, placement.moved_to(next)) {
                    tracing::debug!(entity = %scope.id, blocked_at = %next, "move_blocked");
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    // ---- movement -------------------------------------------------------

    /// Walks `steps` blocks forward. Returns false at the first blocked step.
    ///
    /// # Errors
    ///
    /// `AdmissionRejected` without enough stamina, `Interrupted` if the
    /// session is interrupted while waiting, `ExecutionFailed` if the entity
    /// is not in the world.
    pub fn forward(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Forward, steps)
    }

    /// Walks backwards without turning.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn back(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Back, steps)
    }

    /// Rises `steps` blocks.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn up(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Up, steps)
    }

    /// Sinks `steps` blocks.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn down(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Down, steps)
    }

    /// Side-steps to the left.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn step_left(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Left, steps)
    }

    /// Side-steps to the right.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn step_right(&self, steps: u32) -> CommandResult<bool> {
        self.walk(Direction::Right, steps)
    }

    /// Moves straight to a resolved position if it can be occupied.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::forward`].
    pub fn teleport(&self, offset: BlockPos, mode: CoordMode) -> CommandResult<bool> {
        let cost = self.runtime.config().stamina.movement_cost(1);
        self.run(cost, self.command_delay(), move |world, scope| {
            let placement = scope.placement(world)?;
            let to = mode.resolve(placement, offset);
            Ok(world.can_occupy(to) && world.relocate(scope.id, placement.moved_to(to)))
        })
    }

    /// Rotates by `degrees`; positive turns right.
    ///
    /// # Errors
    ///
    /// `Interrupted` or `ExecutionFailed` as for movement.
    pub fn turn(&self, degrees: i32) -> CommandResult<Facing> {
        self.run(0, self.command_delay(), move |world, scope| {
            let turned = scope.placement(world)?.turned(degrees);
            if !world.relocate(scope.id, turned) {
                return Err(CommandError::failed("turn rejected by world"));
            }
            Ok(turned.facing())
        })
    }

    /// Quarter turn to the left.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::turn`].
    pub fn turn_left(&self) -> CommandResult<Facing> {
        self.turn(-90)
    }

    /// Quarter turn to the right.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::turn`].
    pub fn turn_right(&self) -> CommandResult<Facing> {
        self.turn(90)
    }

    /// Sets an absolute yaw without waiting for it to happen.
    ///
    /// # Errors
    ///
    /// Only scheduling errors; the outcome is logged, not returned.
    pub fn facing(&self, degrees: i32) -> CommandResult<()> {
        self.ensure_live()?;
        let id = self.id;
        self.runtime
            .runner()
            .submit(Some(id), self.command_delay(), move |world| {
                let placement = world.placement_of(id).ok_or(WorldError::ActorMissing)?;
                if world.relocate(id, Placement::new(placement.pos, degrees)) {
                    Ok(())
                } else {
                    Err(CommandError::failed("facing rejected by world"))
                }
            })
            .map(|_| ())
    }

    // ---- building -------------------------------------------------------

    /// Places the selected item in front of the entity.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::place_at`].
    pub fn place(&self, side: PlaceSide) -> CommandResult<bool> {
        self.place_at(BlockPos::new(0, 0, 1), CoordMode::Local, side)
    }

    /// Places the selected item at a resolved position, oriented by `side`.
    ///
    /// With nothing selected this digs the target instead. Returns false if
    /// the target is not replaceable or may not be changed.
    ///
    /// # Errors
    ///
    /// `AdmissionRejected`, `Interrupted`, or `ExecutionFailed` for an
    /// unloaded target or a missing entity.
    pub fn place_at(
        &self,
        offset: BlockPos,
        mode: CoordMode,
        side: PlaceSide,
    ) -> CommandResult<bool> {
        self.run(self.flat_cost(), self.command_delay(), move |world, scope| {
            let placement = scope.placement(world)?;
            let target = mode.resolve(placement, offset);
            let selected = world
                .inventory(scope.id)
                .ok_or(WorldError::ActorMissing)?
                .selected();
            let Some(stack) = selected else {
                return dig_block(world, scope, target);
            };

            let current = world
                .current_state_of(target)
                .ok_or(WorldError::Unloaded(target))?;
            if !current.kind.has(Capabilities::REPLACEABLE)
                || !world.can_mutate_at(target, scope.id)
            {
                return Ok(false);
            }

            scope.record_block(world, target);
            scope.record_inventory(world);
            let state = BlockState::of(stack.kind).facing(side.resolve(placement.facing()));
            if !world.apply_state(target, state) {
                return Ok(false);
            }
            let inventory = world.inventory_mut(scope.id).ok_or(WorldError::ActorMissing)?;
            let slot = inventory.selected_slot();
            inventory.take(slot, 1)?;
            Ok(true)
        })
    }

    /// Sets a block without consuming anything from the inventory.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::place_at`].
    pub fn set_block(
        &self,
        offset: BlockPos,
        mode: CoordMode,
        kind: BlockKind,
        side: PlaceSide,
    ) -> CommandResult<bool> {
        self.run(self.flat_cost(), self.command_delay(), move |world, scope| {
            let placement = scope.placement(world)?;
            let target = mode.resolve(placement, offset);
            if world.current_state_of(target).is_none() {
                return Err(WorldError::Unloaded(target).into());
            }
            if !world.can_mutate_at(target, scope.id) {
                return Ok(false);
            }
            scope.record_block(world, target);
            let state = BlockState::of(kind).facing(side.resolve(placement.facing()));
            Ok(world.apply_state(target, state))
        })
    }

    /// Breaks the block in front of the entity.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::dig_at`].
    pub fn dig(&self) -> CommandResult<bool> {
        self.dig_at(BlockPos::new(0, 0, 1), CoordMode::Local)
    }

    /// Breaks a block and puts it in the inventory. Returns false for air,
    /// unbreakable or protected blocks.
    ///
    /// # Errors
    ///
    /// `AdmissionRejected`, `Interrupted`, or `ExecutionFailed` for an
    /// unloaded target or a missing entity.
    pub fn dig_at(&self, offset: BlockPos, mode: CoordMode) -> CommandResult<bool> {
        self.run(self.flat_cost(), self.command_delay(), move |world, scope| {
            let target = scope.target(world, offset, mode)?;
            dig_block(world, scope, target)
        })
    }

    /// Opens/closes or powers/unpowers a block. Returns false if there is
    /// nothing to toggle.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::dig_at`].
    pub fn interact_at(&self, offset: BlockPos, mode: CoordMode) -> CommandResult<bool> {
        self.run(self.flat_cost(), self.command_delay(), move |world, scope| {
            let target = scope.target(world, offset, mode)?;
            let current = world
                .current_state_of(target)
                .ok_or(WorldError::Unloaded(target))?;
            let Some(next) = current.toggled() else {
                return Ok(false);
            };
            if !world.can_mutate_at(target, scope.id) {
                return Ok(false);
            }
            scope.record_block(world, target);
            Ok(world.apply_state(target, next))
        })
    }

    // ---- inspection -----------------------------------------------------

    /// State of a block, `None` if it is not loaded.
    ///
    /// # Errors
    ///
    /// `Interrupted`, or `ExecutionFailed` if the entity is missing.
    pub fn inspect_at(
        &self,
        offset: BlockPos,
        mode: CoordMode,
    ) -> CommandResult<Option<BlockState>> {
        self.run(0, 0, move |world, scope| {
            let target = scope.target(world, offset, mode)?;
            Ok(world.current_state_of(target))
        })
    }

    /// Whether the neighbouring block in `direction` cannot be entered.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::inspect_at`].
    pub fn is_blocked(&self, direction: Direction) -> CommandResult<bool> {
        self.run(0, 0, move |world, scope| {
            let target = scope.target(world, direction.local_offset(), CoordMode::Local)?;
            Ok(!world.can_occupy(target))
        })
    }

    /// Whether the block in front could be dug.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::inspect_at`].
    pub fn can_dig(&self) -> CommandResult<bool> {
        self.run(0, 0, move |world, scope| {
            let target = scope.target(world, BlockPos::new(0, 0, 1), CoordMode::Local)?;
            Ok(is_diggable(world, scope.id, target))
        })
    }

    /// Where the entity is.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::inspect_at`].
    pub fn position(&self) -> CommandResult<Placement> {
        self.run(0, 0, |world, scope| scope.placement(world))
    }

    /// Which way the entity faces.
    ///
    /// # Errors
    ///
    /// See [`EntitySession::inspect_at`].
    pub fn facing_direction(&self) -> CommandResult<Facing> {
        self.run(0, 0, |world, scope| Ok(scope.placement(world)?.facing()))
    }

    // ---- inventory ------------------------------------------------------

    /// Selects the slot used by [`EntitySession::place`].
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for an invalid slot.
    pub fn select_item(&self, slot: usize) -> CommandResult<()> {
        self.with_inventory(true, move |inventory| Ok(inventory.select(slot)?))
    }

    /// Stack in a slot.
    ///
    /// # Errors
    ///
    /// `Interrupted`, or `ExecutionFailed` if the entity is missing.
    pub fn item(&self, slot: usize) -> CommandResult<Option<ItemStack>> {
        self.with_inventory(false, move |inventory| Ok(inventory.get(slot)))
    }

    /// Swaps two slots.
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for an invalid slot.
    pub fn swap_items(&self, a: usize, b: usize) -> CommandResult<()> {
        self.with_inventory(true, move |inventory| Ok(inventory.swap(a, b)?))
    }

    /// Moves (or merges) a stack. Returns false if the target is occupied
    /// by something that does not merge.
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for an invalid slot.
    pub fn move_item(&self, from: usize, to: usize) -> CommandResult<bool> {
        self.with_inventory(true, move |inventory| Ok(inventory.move_stack(from, to)?))
    }

    /// First slot holding `kind`.
    ///
    /// # Errors
    ///
    /// `Interrupted`, or `ExecutionFailed` if the entity is missing.
    pub fn find_slot(&self, kind: BlockKind) -> CommandResult<Option<usize>> {
        self.with_inventory(false, move |inventory| Ok(inventory.find(kind)))
    }

    /// Throws away a whole stack and returns it.
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for an invalid slot.
    pub fn drop_item(&self, slot: usize) -> CommandResult<Option<ItemStack>> {
        self.with_inventory(true, move |inventory| Ok(inventory.take(slot, u32::MAX)?))
    }

    fn with_inventory<T, F>(&self, mutates: bool, op: F) -> CommandResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inventory) -> CommandResult<T> + Send + 'static,
    {
        self.run(0, 0, move |world, scope| {
            if mutates {
                scope.record_inventory(world);
            }
            let inventory = world.inventory_mut(scope.id).ok_or(WorldError::ActorMissing)?;
            op(inventory)
        })
    }

    // ---- checkpoint -----------------------------------------------------

    /// Opens a checkpoint at the current placement and captures the
    /// inventory. A checkpoint that was still open is replaced.
    ///
    /// # Errors
    ///
    /// `Interrupted`, or `ExecutionFailed` if the entity is missing.
    pub fn init_area(&self) -> CommandResult<CheckpointOpened> {
        self.run(0, 0, |world, scope| {
            let origin = scope.placement(world)?;
            let tick = scope.runner.current_tick();
            let mut store = scope.snapshot.lock();
            let replaced = store.open(origin, tick).map(|old| old.len());
            store.record_inventory(&*world);
            Ok(CheckpointOpened {
                origin,
                replaced_entries: replaced,
            })
        })
    }

    /// Restores every recorded location, moves the entity back to the
    /// origin and closes the checkpoint.
    ///
    /// # Errors
    ///
    /// `Interrupted` only; skipped locations are reported, not raised.
    pub fn reset(&self) -> CommandResult<RestoreReport> {
        self.run(0, 0, |world, scope| Ok(scope.snapshot.lock().restore(world)))
    }

    /// Drops the open checkpoint. Returns false if none was open.
    ///
    /// # Errors
    ///
    /// `Interrupted` only.
    pub fn clear_area(&self) -> CommandResult<bool> {
        self.run(0, 0, |_, scope| Ok(scope.snapshot.lock().discard().is_some()))
    }

    /// Whether a checkpoint is open.
    ///
    /// # Errors
    ///
    /// `Interrupted` only.
    pub fn has_saved_area(&self) -> CommandResult<bool> {
        self.run(0, 0, |_, scope| Ok(scope.snapshot.lock().is_open()))
    }
}

fn is_diggable(world: &DynWorld, actor: EntityId, pos: BlockPos) -> bool {
    world.current_state_of(pos).is_some_and(|state| {
        !state.kind.is_air() && state.kind.has(Capabilities::BREAKABLE)
    }) && world.can_mutate_at(pos, actor)
}

fn dig_block(world: &mut DynWorld, scope: &Scope, target: BlockPos) -> CommandResult<bool> {
    let current = world
        .current_state_of(target)
        .ok_or(WorldError::Unloaded(target))?;
    if !is_diggable(world, scope.id, target) {
        return Ok(false);
    }

    scope.record_block(world, target);
    scope.record_inventory(world);
    if !world.apply_state(target, BlockState::AIR) {
        return Ok(false);
    }
    let inventory = world.inventory_mut(scope.id).ok_or(WorldError::ActorMissing)?;
    if let Err(err) = inventory.add(current.kind, 1) {
        tracing::debug!(entity = %scope.id, error = %err, "dug_item_lost");
    }
    Ok(true)
}
