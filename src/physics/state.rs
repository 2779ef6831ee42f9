//! Body storage for the simulation.
//!
//! Bodies live in a dense `Vec` that is compacted on removal. Callers only
//! ever hold [`BodyHandle`]s, which are resolved through a side index, so
//! removing one body never invalidates another body's handle.

use std::collections::HashMap;

use bevy::math::DVec3;

use crate::error::EngineError;
use crate::types::{BodyHandle, BodyState};

/// A member folded into a composite, with its frozen barycentric offset.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeMember {
    pub handle: BodyHandle,
    pub pos_offset: DVec3,
    pub vel_offset: DVec3,
}

/// Ordered collection of bodies plus the simulation time.
///
/// Cloning yields a fully independent copy (used by forked speculative runs).
#[derive(Clone, Debug, Default)]
pub struct GravityState {
    bodies: Vec<BodyState>,
    handles: Vec<BodyHandle>,
    index: HashMap<BodyHandle, usize>,
    next_handle: u32,
    time: f64,
    /// Accelerations at the current positions, parallel to `bodies`.
    pub(crate) acc: Vec<DVec3>,
    /// False whenever positions, masses or the active set changed since `acc` was computed.
    pub(crate) acc_valid: bool,
    composites: HashMap<BodyHandle, Vec<CompositeMember>>,
}

impl GravityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time in internal units.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub(crate) fn advance_time(&mut self, dt: f64) {
        self.time += dt;
    }

    /// Register a body and return its handle.
    pub fn add(&mut self, state: BodyState) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.index.insert(handle, self.bodies.len());
        self.bodies.push(state);
        self.handles.push(handle);
        self.acc.push(DVec3::ZERO);
        self.acc_valid = false;
        handle
    }

    /// Remove a body, compacting storage. Other handles stay valid.
    pub fn remove(&mut self, handle: BodyHandle) -> Result<BodyState, EngineError> {
        let slot = self
            .index
            .remove(&handle)
            .ok_or(EngineError::UnknownBody(handle))?;

        let removed = self.bodies.swap_remove(slot);
        self.handles.swap_remove(slot);
        self.acc.swap_remove(slot);
        if let Some(&moved) = self.handles.get(slot) {
            self.index.insert(moved, slot);
        }

        // A removed composite leaves its members inactive; a removed member
        // simply drops out of its composite.
        self.composites.remove(&handle);
        for members in self.composites.values_mut() {
            members.retain(|m| m.handle != handle);
        }

        self.acc_valid = false;
        Ok(removed)
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.index.contains_key(&handle)
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&BodyState> {
        self.index.get(&handle).map(|&slot| &self.bodies[slot])
    }

    /// Like [`get`](Self::get) but reports an unknown handle as an error.
    pub fn try_get(&self, handle: BodyHandle) -> Result<&BodyState, EngineError> {
        self.get(handle).ok_or(EngineError::UnknownBody(handle))
    }

    fn slot(&self, handle: BodyHandle) -> Result<usize, EngineError> {
        self.index
            .get(&handle)
            .copied()
            .ok_or(EngineError::UnknownBody(handle))
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Handles in storage order.
    pub fn handles(&self) -> &[BodyHandle] {
        &self.handles
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyHandle, &BodyState)> {
        self.handles.iter().copied().zip(self.bodies.iter())
    }

    pub(crate) fn bodies(&self) -> &[BodyState] {
        &self.bodies
    }

    /// Bodies and their cached accelerations, borrowed together.
    pub(crate) fn bodies_and_acc_mut(&mut self) -> (&mut [BodyState], &mut [DVec3]) {
        (&mut self.bodies, &mut self.acc)
    }

    /// Overwrite a body's velocity. Cached accelerations stay valid.
    pub fn set_velocity(&mut self, handle: BodyHandle, vel: DVec3) -> Result<(), EngineError> {
        let slot = self.slot(handle)?;
        self.bodies[slot].vel = vel;
        Ok(())
    }

    /// Overwrite position and velocity.
    pub fn set_state(&mut self, handle: BodyHandle, pos: DVec3, vel: DVec3) -> Result<(), EngineError> {
        let slot = self.slot(handle)?;
        self.bodies[slot].pos = pos;
        self.bodies[slot].vel = vel;
        self.acc_valid = false;
        Ok(())
    }

    /// Freeze a body and exclude it from force sums.
    pub fn inactivate(&mut self, handle: BodyHandle) -> Result<(), EngineError> {
        let slot = self.slot(handle)?;
        self.bodies[slot].active = false;
        self.acc_valid = false;
        Ok(())
    }

    /// Bring a frozen body back into the simulation.
    ///
    /// Members of a composite get their world state recomputed from the
    /// composite's current state and their stored offsets. The member's mass
    /// and momentum leave the composite, whose barycenter moves to the
    /// remaining members. A composite left with no members is removed and
    /// its handle returned.
    pub fn reactivate(&mut self, handle: BodyHandle) -> Result<Option<BodyHandle>, EngineError> {
        let slot = self.slot(handle)?;
        let parent = self.composites.iter().find_map(|(&composite, members)| {
            members
                .iter()
                .find(|m| m.handle == handle)
                .map(|m| (composite, m.pos_offset, m.vel_offset))
        });

        let mut dissolved = None;
        if let Some((composite, pos_offset, vel_offset)) = parent {
            let base = self.try_get(composite)?.clone();
            let body = &mut self.bodies[slot];
            body.pos = base.pos + pos_offset;
            body.vel = base.vel + vel_offset;
            let detached = body.clone();

            let remaining = base.mass - detached.mass;
            let members = self.composites.entry(composite).or_default();
            members.retain(|m| m.handle != handle);

            if members.is_empty() {
                self.composites.remove(&composite);
                self.remove(composite)?;
                dissolved = Some(composite);
            } else {
                let pos = (base.pos * base.mass - detached.pos * detached.mass) / remaining;
                let vel = (base.momentum() - detached.momentum()) / remaining;
                for member in members.iter_mut() {
                    member.pos_offset += base.pos - pos;
                    member.vel_offset += base.vel - vel;
                }
                let slot = self.slot(composite)?;
                let body = &mut self.bodies[slot];
                body.pos = pos;
                body.vel = vel;
                body.mass = remaining;
            }
        }

        // Removing a composite compacts storage
        let slot = self.slot(handle)?;
        self.bodies[slot].active = true;
        self.acc_valid = false;
        Ok(dissolved)
    }

    /// Replace `members` with one body at their barycenter carrying their total mass.
    ///
    /// Members are inactivated and remember their offset from the barycenter.
    pub fn fold_composite(&mut self, members: &[BodyHandle]) -> Result<BodyHandle, EngineError> {
        let mut unique: Vec<BodyHandle> = Vec::with_capacity(members.len());
        for &handle in members {
            let body = self.try_get(handle)?;
            if !body.active {
                return Err(EngineError::InactiveBody(handle));
            }
            if body.is_massless() {
                continue;
            }
            if !unique.contains(&handle) {
                unique.push(handle);
            }
        }
        if unique.len() < 2 {
            return Err(EngineError::CompositeTooSmall);
        }

        let mut total_mass = 0.0;
        let mut weighted_pos = DVec3::ZERO;
        let mut momentum = DVec3::ZERO;
        for &handle in &unique {
            let body = self.try_get(handle)?;
            total_mass += body.mass;
            weighted_pos += body.pos * body.mass;
            momentum += body.momentum();
        }
        let bary_pos = weighted_pos / total_mass;
        let bary_vel = momentum / total_mass;

        let mut record = Vec::with_capacity(unique.len());
        for &handle in &unique {
            let body = self.try_get(handle)?;
            record.push(CompositeMember {
                handle,
                pos_offset: body.pos - bary_pos,
                vel_offset: body.vel - bary_vel,
            });
            self.inactivate(handle)?;
        }

        let composite = self.add(BodyState::new(bary_pos, bary_vel, total_mass));
        self.composites.insert(composite, record);
        Ok(composite)
    }

    /// Reactivate a composite's members and remove the composite body.
    ///
    /// Returns the members that were restored.
    pub fn unfold_composite(&mut self, composite: BodyHandle) -> Result<Vec<BodyHandle>, EngineError> {
        let members = self
            .composites
            .remove(&composite)
            .ok_or(EngineError::NotComposite(composite))?;
        let base = self.try_get(composite)?.clone();

        let mut restored = Vec::with_capacity(members.len());
        for member in members {
            if let Ok(slot) = self.slot(member.handle) {
                let body = &mut self.bodies[slot];
                body.pos = base.pos + member.pos_offset;
                body.vel = base.vel + member.vel_offset;
                body.active = true;
                restored.push(member.handle);
            }
        }

        self.remove(composite)?;
        Ok(restored)
    }

    pub fn is_composite(&self, handle: BodyHandle) -> bool {
        self.composites.contains_key(&handle)
    }

    /// Members currently folded into `composite`.
    pub fn composite_members(&self, composite: BodyHandle) -> Option<&[CompositeMember]> {
        self.composites.get(&composite).map(Vec::as_slice)
    }
}
