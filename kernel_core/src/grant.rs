//! # Grant Tables and Safe Copy
//!
//! A grant is a process's permission for another process to read or write a
//! bounded range of its memory. Grants live in a per-process table and are
//! named by generation-tagged ids.
//!
//! ## Validation order
//!
//! A safe copy is validated completely before any byte moves:
//!
//! 1. the grantor is alive and is the process the caller named
//! 2. the grant id is in bounds and current
//! 3. the caller is the grantee (or the grant is for `ANY`)
//! 4. the grant permits the direction, and is not a spent single-use grant
//! 5. the offset lies within the granted range
//! 6. the granted range is still inside the grantor's memory
//! 7. the caller's own buffer is inside the caller's memory
//!
//! The copy length is then clamped to what the grant covers. Indirect grants
//! repeat steps 1 to 6 for every hop of the chain.

use crate::address_space::AddressSpace;
use crate::trace::KernelEvent;
use crate::Kernel;
use core_types::{AccessMode, CopyDirection, Endpoint, GrantFlags, GrantId, MemRange, ProcessSlot};
use kernel_api::{GrantDenial, GrantRef, KernelCallNumber, KernelError, SafeCopyRequest};
use std::collections::HashSet;

/// What a grant points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    /// A range of the grantor's own memory
    Direct { range: MemRange },
    /// Part of a grant held by the grantor
    Indirect {
        source: GrantRef,
        offset: u64,
        len: u64,
    },
}

/// One grant table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Endpoint,
    pub target: GrantTarget,
    pub access: AccessMode,
    pub flags: GrantFlags,
}

impl Grant {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        match self.target {
            GrantTarget::Direct { range } => range.len,
            GrantTarget::Indirect { len, .. } => len,
        }
    }

    /// True for an empty grant
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a single-use grant has been consumed
    pub fn is_spent(&self) -> bool {
        self.flags
            .contains(GrantFlags::SINGLE_USE | GrantFlags::USED)
    }
}

/// Why a table lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// Index beyond the table
    OutOfBounds,
    /// Slot empty or reused since the id was issued
    Stale,
}

#[derive(Debug, Clone)]
struct GrantSlot {
    generation: u32,
    grant: Option<Grant>,
}

/// Grant table of one process
#[derive(Debug, Clone)]
pub struct GrantTable {
    slots: Vec<GrantSlot>,
    capacity: usize,
}

impl GrantTable {
    /// Creates an empty table that holds at most `capacity` grants
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// Stores a grant in the first free slot
    pub fn insert(&mut self, grant: Grant) -> Option<GrantId> {
        if let Some(index) = self.slots.iter().position(|s| s.grant.is_none()) {
            let slot = &mut self.slots[index];
            slot.grant = Some(grant);
            return Some(GrantId::new(index as u32, slot.generation));
        }
        if self.slots.len() >= self.capacity {
            return None;
        }
        self.slots.push(GrantSlot {
            generation: 0,
            grant: Some(grant),
        });
        Some(GrantId::new(self.slots.len() as u32 - 1, 0))
    }

    /// Resolves an id to its grant
    pub fn lookup(&self, id: GrantId) -> Result<&Grant, LookupError> {
        if id.index() >= self.capacity {
            return Err(LookupError::OutOfBounds);
        }
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.grant.as_ref())
            .ok_or(LookupError::Stale)
    }

    fn lookup_mut(&mut self, id: GrantId) -> Option<&mut Grant> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.grant.as_mut())
    }

    /// Revokes a grant; returns false if it was already gone
    pub fn revoke(&mut self, id: GrantId) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.generation == id.generation() && slot.grant.is_some() => {
                slot.grant = None;
                slot.generation = slot.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Revokes every grant; returns the ids that were live
    pub fn revoke_all(&mut self) -> Vec<GrantId> {
        let mut revoked = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.grant.take().is_some() {
                revoked.push(GrantId::new(index as u32, slot.generation));
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        revoked
    }

    /// Number of live grants
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.grant.is_some()).count()
    }

    /// True if no grant is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Grant tables of every process slot
#[derive(Debug)]
pub struct GrantTables {
    tables: Vec<GrantTable>,
    per_process: usize,
}

impl GrantTables {
    /// Creates `slots` empty tables
    pub fn new(slots: usize, per_process: usize) -> Self {
        Self {
            tables: vec![GrantTable::new(per_process); slots],
            per_process,
        }
    }

    /// Table of `slot`
    pub fn table(&self, slot: ProcessSlot) -> &GrantTable {
        &self.tables[slot.index()]
    }

    /// Mutable table of `slot`
    pub fn table_mut(&mut self, slot: ProcessSlot) -> &mut GrantTable {
        &mut self.tables[slot.index()]
    }

    /// Gives `slot` a fresh, empty table
    pub fn reset(&mut self, slot: ProcessSlot) {
        self.tables[slot.index()] = GrantTable::new(self.per_process);
    }
}

/// A validated copy, ready to run
#[derive(Debug, Clone)]
struct CopyPlan {
    /// Process whose memory the grant chain ends in
    owner: Endpoint,
    /// Grantor side, already clamped to the copy length
    remote: MemRange,
    /// Caller side, already clamped to the copy length
    local: MemRange,
    direction: CopyDirection,
    /// Every grant on the chain, outermost first
    hops: Vec<GrantRef>,
}

/// Outcome of resolving a grant chain
#[derive(Debug, Clone)]
struct Resolved {
    owner: Endpoint,
    range: MemRange,
    hops: Vec<GrantRef>,
}

impl Kernel {
    pub(crate) fn do_create_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        range: MemRange,
        access: AccessMode,
        single_use: bool,
    ) -> Result<GrantId, KernelError> {
        self.require(caller, KernelCallNumber::CreateGrant)?;
        self.check_grantee(grantee)?;
        if access.is_empty() {
            return Err(KernelError::InvalidArgument(
                "grant must permit read or write".to_string(),
            ));
        }
        if !self.space(caller).permits(range, access) {
            return Err(KernelError::InvalidRange(range));
        }

        let mut flags = GrantFlags::VALID;
        if single_use {
            flags |= GrantFlags::SINGLE_USE;
        }
        let grant = Grant {
            grantee,
            target: GrantTarget::Direct { range },
            access,
            flags,
        };
        self.insert_grant(caller, grant)
    }

    pub(crate) fn do_create_indirect_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        source: GrantRef,
        offset: u64,
        len: u64,
        access: AccessMode,
    ) -> Result<GrantId, KernelError> {
        self.require(caller, KernelCallNumber::CreateIndirectGrant)?;
        self.check_grantee(grantee)?;
        if access.is_empty() {
            return Err(KernelError::InvalidArgument(
                "grant must permit read or write".to_string(),
            ));
        }

        // The new grant sits one hop above `source`
        let resolved = self.resolve(caller, source, offset, access, 1)?;
        if len > resolved.range.len {
            return Err(KernelError::InvalidGrant(GrantDenial::OutOfRange));
        }

        let grant = Grant {
            grantee,
            target: GrantTarget::Indirect {
                source,
                offset,
                len,
            },
            access,
            flags: GrantFlags::VALID | GrantFlags::INDIRECT,
        };
        self.insert_grant(caller, grant)
    }

    pub(crate) fn do_revoke_grant(
        &mut self,
        caller: Endpoint,
        grant: GrantId,
    ) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::RevokeGrant)?;
        if self.grants.table_mut(caller.slot()).revoke(grant) {
            self.record(KernelEvent::GrantRevoked {
                owner: caller,
                grant,
            });
        }
        Ok(())
    }

    pub(crate) fn do_safe_copy(
        &mut self,
        caller: Endpoint,
        request: SafeCopyRequest,
    ) -> Result<u64, KernelError> {
        self.require(caller, KernelCallNumber::SafeCopy)?;
        let plan = self.plan_copy(caller, &request)?;
        Ok(self.perform_copy(caller, plan))
    }

    pub(crate) fn do_safe_copy_vec(
        &mut self,
        caller: Endpoint,
        requests: &[SafeCopyRequest],
    ) -> Result<u64, KernelError> {
        self.require(caller, KernelCallNumber::SafeCopyVec)?;

        let mut plans = Vec::with_capacity(requests.len());
        let mut claimed: HashSet<GrantRef> = HashSet::new();
        for request in requests {
            let plan = self.plan_copy(caller, request)?;
            for hop in &plan.hops {
                if self.is_single_use(*hop) && !claimed.insert(*hop) {
                    return Err(self.deny(caller, request.source, GrantDenial::AlreadyUsed));
                }
            }
            plans.push(plan);
        }

        Ok(plans
            .into_iter()
            .map(|plan| self.perform_copy(caller, plan))
            .sum())
    }

    /// Looks up a grant without validating it
    pub fn grant(&self, owner: Endpoint, grant: GrantId) -> Option<&Grant> {
        self.processes.get(owner)?;
        self.grants.table(owner.slot()).lookup(grant).ok()
    }

    fn check_grantee(&self, grantee: Endpoint) -> Result<(), KernelError> {
        if grantee != Endpoint::ANY {
            self.processes.live(grantee)?;
        }
        Ok(())
    }

    fn insert_grant(&mut self, owner: Endpoint, grant: Grant) -> Result<GrantId, KernelError> {
        let grantee = grant.grantee;
        let id = self
            .grants
            .table_mut(owner.slot())
            .insert(grant)
            .ok_or_else(|| {
                KernelError::ResourceExhausted(format!("grant table of {} is full", owner))
            })?;
        self.record(KernelEvent::GrantCreated {
            owner,
            grant: id,
            grantee,
        });
        Ok(id)
    }

    fn is_single_use(&self, hop: GrantRef) -> bool {
        self.grant(hop.owner, hop.grant)
            .is_some_and(|g| g.flags.contains(GrantFlags::SINGLE_USE))
    }

    fn plan_copy(
        &mut self,
        caller: Endpoint,
        request: &SafeCopyRequest,
    ) -> Result<CopyPlan, KernelError> {
        let access = request.direction.required_access();
        let resolved = match self.resolve(caller, request.source, request.offset, access, 0) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.record_denial(caller, request.source, &error);
                return Err(error);
            }
        };

        if !self
            .space(caller)
            .permits(request.local, request.direction.local_access())
        {
            let error = KernelError::InvalidRange(request.local);
            self.record_denial(caller, request.source, &error);
            return Err(error);
        }

        let len = request.local.len.min(resolved.range.len);
        Ok(CopyPlan {
            owner: resolved.owner,
            remote: resolved.range.truncated(len),
            local: request.local.truncated(len),
            direction: request.direction,
            hops: resolved.hops,
        })
    }

    /// Follows a grant chain down to the memory it names
    ///
    /// `user` is the process presenting `source`; for an indirect hop it is
    /// the process that forwarded the grant.
    fn resolve(
        &self,
        user: Endpoint,
        source: GrantRef,
        offset: u64,
        access: AccessMode,
        depth: usize,
    ) -> Result<Resolved, KernelError> {
        if depth > self.config.grants.max_indirect_depth {
            return Err(KernelError::InvalidGrant(GrantDenial::ChainTooDeep));
        }
        if self.processes.get(source.owner).is_none() {
            return Err(KernelError::InvalidGrant(GrantDenial::OwnerDead));
        }

        let grant = self
            .grants
            .table(source.owner.slot())
            .lookup(source.grant)
            .map_err(|e| match e {
                LookupError::OutOfBounds => KernelError::NoSuchGrant {
                    owner: source.owner,
                    grant: source.grant,
                },
                LookupError::Stale => KernelError::InvalidGrant(GrantDenial::Revoked),
            })?;

        if grant.grantee != Endpoint::ANY && grant.grantee != user {
            return Err(KernelError::InvalidGrant(GrantDenial::NotGrantee));
        }
        if !grant.access.contains(access) {
            return Err(KernelError::InvalidGrant(GrantDenial::WrongMode));
        }
        if grant.is_spent() {
            return Err(KernelError::InvalidGrant(GrantDenial::AlreadyUsed));
        }
        if offset > grant.len() {
            return Err(KernelError::InvalidGrant(GrantDenial::OutOfRange));
        }

        match grant.target {
            GrantTarget::Direct { range } => {
                if !self.space(source.owner).permits(range, access) {
                    return Err(KernelError::InvalidRange(range));
                }
                let range = range
                    .sub_range(offset, u64::MAX)
                    .ok_or(KernelError::InvalidGrant(GrantDenial::OutOfRange))?;
                Ok(Resolved {
                    owner: source.owner,
                    range,
                    hops: vec![source],
                })
            }
            GrantTarget::Indirect {
                source: inner,
                offset: base,
                len,
            } => {
                let mut resolved = self.resolve(
                    source.owner,
                    inner,
                    base.saturating_add(offset),
                    access,
                    depth + 1,
                )?;
                resolved.range = resolved.range.truncated(len - offset);
                resolved.hops.insert(0, source);
                Ok(resolved)
            }
        }
    }

    fn perform_copy(&mut self, caller: Endpoint, plan: CopyPlan) -> u64 {
        let (from, from_range, to, to_range) = match plan.direction {
            CopyDirection::FromGrantor => (plan.owner, plan.remote, caller, plan.local),
            CopyDirection::ToGrantor => (caller, plan.local, plan.owner, plan.remote),
        };

        let Some(bytes) = self.space(from).read(from_range).map(<[u8]>::to_vec) else {
            panic!("validated range {} of {} is unreadable", from_range, from);
        };
        let written = self.memory[to.slot().index()].write(to_range, &bytes);
        assert!(written, "validated range {} of {} is unwritable", to_range, to);

        for hop in &plan.hops {
            if let Some(grant) = self.grants.table_mut(hop.owner.slot()).lookup_mut(hop.grant) {
                grant.flags |= GrantFlags::USED;
            }
        }

        let copied = bytes.len() as u64;
        if let Some(top) = plan.hops.first() {
            self.record(KernelEvent::Copied {
                caller,
                owner: top.owner,
                grant: top.grant,
                direction: plan.direction,
                bytes: copied,
            });
        }
        copied
    }

    fn deny(&mut self, caller: Endpoint, source: GrantRef, denial: GrantDenial) -> KernelError {
        let error = KernelError::InvalidGrant(denial);
        self.record_denial(caller, source, &error);
        error
    }

    fn record_denial(&mut self, caller: Endpoint, source: GrantRef, error: &KernelError) {
        log::warn!("safe copy by {} through {} denied: {}", caller, source.grant, error);
        self.record(KernelEvent::CopyDenied {
            caller,
            owner: source.owner,
            grant: source.grant,
            error: error.clone(),
        });
    }

    pub(crate) fn space(&self, endpoint: Endpoint) -> &AddressSpace {
        &self.memory[endpoint.slot().index()]
    }
}
