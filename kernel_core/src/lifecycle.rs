//! # Process Lifecycle
//!
//! Creation, termination and the privileged state changes system processes
//! apply to others.
//!
//! ## Termination
//!
//! A process dies in one step, and leaves nothing behind that could point at
//! it:
//!
//! - it leaves the scheduler and its timers are cancelled
//! - processes blocked on it are released with `DeadPartner`
//! - notification bits and queued asynchronous messages naming it are dropped
//! - its grants are revoked and its privilege row and column cleared
//! - its memory is released
//!
//! The slot itself is kept, in state `Dead`, until a system process clears
//! it. Only then is the slot's generation advanced for reuse.
//!
//! ## Holds
//!
//! `stop` and `block_on_signal` on a process blocked in IPC do not cut the
//! IPC short. They are recorded as a pending hold and take effect when the
//! IPC completes.

use crate::address_space::{AddressSpace, MAX_REGION_BYTES};
use crate::process::{Hold, Process, ProcessKind, RunState};
use crate::trace::KernelEvent;
use crate::Kernel;
use core_types::well_known::FIRST_USER_SLOT;
use core_types::{Endpoint, MemoryPerms, Priority, RegionId};
use ipc::SourceFilter;
use kernel_api::{KernelCallNumber, KernelError, Privileges, SendTargets, Ticks};

impl Kernel {
    /// Creates a process from the boot image, without a calling process
    pub fn boot_process(
        &mut self,
        name: &str,
        priority: Priority,
        privileges: Privileges,
    ) -> Result<Endpoint, KernelError> {
        self.check_send_targets(&privileges)?;
        let endpoint = self.create_process(name, priority, &privileges, None)?;
        self.run_scheduler();
        Ok(endpoint)
    }

    /// Replaces a process's privileges from the boot image
    pub fn boot_set_privileges(
        &mut self,
        target: Endpoint,
        privileges: Privileges,
    ) -> Result<(), KernelError> {
        self.check_user_target(target)?;
        self.check_send_targets(&privileges)?;
        self.install_privileges(target, &privileges);
        Ok(())
    }

    /// Maps a region into a process from the boot image
    pub fn boot_map_region(
        &mut self,
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<RegionId, KernelError> {
        self.check_user_target(target)?;
        self.map_into(target, size, perms)
    }

    pub(crate) fn do_spawn(
        &mut self,
        caller: Endpoint,
        name: &str,
        priority: Priority,
        privileges: Privileges,
    ) -> Result<Endpoint, KernelError> {
        self.require(caller, KernelCallNumber::Spawn)?;
        let own = self.privileges.privileges_of(caller).unwrap_or_default();
        if !privileges.is_subset_of(&own) {
            return Err(KernelError::NotAllowed(format!(
                "{} cannot hand out privileges it does not hold",
                caller
            )));
        }
        self.check_send_targets(&privileges)?;
        self.create_process(name, priority, &privileges, Some(caller))
    }

    pub(crate) fn do_set_privileges(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        privileges: Privileges,
    ) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::SetPrivileges)?;
        self.check_user_target(target)?;
        self.check_send_targets(&privileges)?;
        self.install_privileges(target, &privileges);
        Ok(())
    }

    pub(crate) fn do_kill(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Kill)?;
        self.check_user_target(target)?;
        if target == caller {
            return Err(KernelError::InvalidArgument(
                "use exit to terminate the caller".to_string(),
            ));
        }
        self.terminate(target);
        self.record(KernelEvent::Killed {
            endpoint: target,
            by: caller,
        });
        log::info!("{} killed by {}", target, caller);
        Ok(())
    }

    pub(crate) fn do_exit(&mut self, caller: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Exit)?;
        self.terminate(caller);
        self.record(KernelEvent::Exited { endpoint: caller });
        log::info!("{} exited", caller);
        Ok(())
    }

    pub(crate) fn do_clear(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Clear)?;
        let state = self
            .processes
            .get_any(target)
            .map(|p| p.state)
            .ok_or(KernelError::NoSuchTarget(target))?;
        if state != RunState::Dead {
            return Err(KernelError::InvalidState(format!(
                "{} is still alive",
                target
            )));
        }

        self.assert_unreferenced(target);
        self.processes.reclaim(target);
        self.grants.reset(target.slot());
        self.memory[target.slot().index()] = AddressSpace::new();
        self.record(KernelEvent::Cleared { endpoint: target });
        Ok(())
    }

    pub(crate) fn do_stop(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Stop)?;
        self.check_user_target(target)?;
        self.apply_hold(target, Hold::Stop)?;
        self.record(KernelEvent::Stopped { endpoint: target });
        Ok(())
    }

    pub(crate) fn do_resume(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Resume)?;
        self.check_user_target(target)?;
        self.release_hold(target, Hold::Stop)?;
        self.record(KernelEvent::Resumed { endpoint: target });
        Ok(())
    }

    pub(crate) fn do_block_on_signal(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
    ) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::BlockOnSignal)?;
        self.check_user_target(target)?;
        self.apply_hold(target, Hold::Signal)?;
        self.record(KernelEvent::SignalHeld { endpoint: target });
        Ok(())
    }

    pub(crate) fn do_end_signal(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::EndSignal)?;
        self.check_user_target(target)?;
        self.release_hold(target, Hold::Signal)?;
        self.record(KernelEvent::SignalReleased { endpoint: target });
        Ok(())
    }

    pub(crate) fn do_reschedule(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        priority: Priority,
        quantum: Ticks,
    ) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Reschedule)?;
        self.check_user_target(target)?;
        if quantum.is_zero() {
            return Err(KernelError::InvalidArgument(
                "quantum must be non-zero".to_string(),
            ));
        }
        self.check_level(priority)?;
        self.check_floor(priority, self.privileges.is_system(target))?;

        let process = self.processes.live_mut(target)?;
        let old = process.priority;
        process.priority = priority;
        process.quantum = quantum;
        if process.ticks_left.as_u64() > quantum.as_u64() {
            process.ticks_left = quantum;
        }
        if old != priority && self.scheduler.is_queued(target) {
            self.scheduler.remove(target, self.now);
            self.scheduler.enqueue(target, priority);
        }
        self.record(KernelEvent::Rescheduled {
            endpoint: target,
            priority,
        });
        Ok(())
    }

    pub(crate) fn do_map_region(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<RegionId, KernelError> {
        self.require(caller, KernelCallNumber::MapRegion)?;
        self.check_user_target(target)?;
        self.map_into(target, size, perms)
    }

    fn check_user_target(&self, target: Endpoint) -> Result<(), KernelError> {
        if self.processes.live(target)?.is_kernel_task() {
            return Err(KernelError::NotAllowed(format!(
                "{} is a kernel task",
                target
            )));
        }
        Ok(())
    }

    fn check_level(&self, priority: Priority) -> Result<(), KernelError> {
        if priority.level() >= self.config.scheduler.queue_count {
            return Err(KernelError::InvalidArgument(format!(
                "{} is not a scheduler level",
                priority
            )));
        }
        Ok(())
    }

    /// Levels above the user floor belong to system processes
    fn check_floor(&self, priority: Priority, system: bool) -> Result<(), KernelError> {
        if !system && priority.0 < self.config.scheduler.user_priority_floor {
            return Err(KernelError::NotAllowed(format!(
                "{} is reserved for system processes",
                priority
            )));
        }
        Ok(())
    }

    /// Every explicitly named send target must be alive
    fn check_send_targets(&self, privileges: &Privileges) -> Result<(), KernelError> {
        if let SendTargets::Only(targets) = &privileges.send_to {
            for target in targets {
                self.processes.live(*target)?;
            }
        }
        Ok(())
    }

    fn install_privileges(&mut self, target: Endpoint, privileges: &Privileges) {
        self.privileges.set(target, privileges);
        self.record(KernelEvent::PrivilegesChanged { endpoint: target });
    }

    fn create_process(
        &mut self,
        name: &str,
        priority: Priority,
        privileges: &Privileges,
        parent: Option<Endpoint>,
    ) -> Result<Endpoint, KernelError> {
        self.check_level(priority)?;
        self.check_floor(priority, privileges.system)?;

        let template = self.new_process(Endpoint::NONE, name, ProcessKind::User, priority);
        let endpoint = self
            .processes
            .allocate(FIRST_USER_SLOT, |endpoint| Process {
                endpoint,
                parent,
                ..template
            })?;

        self.grants.reset(endpoint.slot());
        self.memory[endpoint.slot().index()] = AddressSpace::new();
        self.privileges.set(endpoint, privileges);
        self.scheduler.enqueue(endpoint, priority);
        self.record(KernelEvent::Spawned {
            endpoint,
            name: name.to_string(),
            priority,
        });
        log::info!("spawned {} ({}) at {}", name, endpoint, priority);
        Ok(endpoint)
    }

    fn map_into(
        &mut self,
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<RegionId, KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidArgument(
                "region size must be non-zero".to_string(),
            ));
        }
        if size > MAX_REGION_BYTES {
            return Err(KernelError::ResourceExhausted(format!(
                "region of {} bytes exceeds {}",
                size, MAX_REGION_BYTES
            )));
        }
        let region = self.memory[target.slot().index()].map(size, perms);
        self.record(KernelEvent::RegionMapped {
            endpoint: target,
            region,
            size,
        });
        Ok(region)
    }

    fn apply_hold(&mut self, target: Endpoint, hold: Hold) -> Result<(), KernelError> {
        let process = self.processes.live_mut(target)?;
        match process.state {
            RunState::Runnable => {
                process.state = hold.state();
                self.deschedule(target);
            }
            state if state.is_ipc_blocked() => process.pending_hold = Some(hold),
            state => {
                return Err(KernelError::InvalidState(format!(
                    "{} is {:?}",
                    target, state
                )))
            }
        }
        Ok(())
    }

    fn release_hold(&mut self, target: Endpoint, hold: Hold) -> Result<(), KernelError> {
        let process = self.processes.live_mut(target)?;
        if process.state == hold.state() {
            self.wake(target);
            return Ok(());
        }
        if process.state.is_ipc_blocked() && process.pending_hold == Some(hold) {
            process.pending_hold = None;
            return Ok(());
        }
        Err(KernelError::InvalidState(format!(
            "{} is {:?}",
            target, process.state
        )))
    }

    /// Tears a process down and marks it dead
    fn terminate(&mut self, victim: Endpoint) {
        self.deschedule(victim);

        let Some(process) = self.processes.get_mut(victim) else {
            return;
        };
        let timers: Vec<_> = process
            .alarms
            .drain(..)
            .chain(process.quantum_timer.take().map(|q| q.handle))
            .collect();
        let send_target = match process.state {
            RunState::Sending { to } => Some(to),
            _ => None,
        };
        let mut waiters: Vec<Endpoint> = process.senders.drain(..).collect();
        process.send_buffer = None;
        process.sendrec_target = None;
        process.ipc_result = None;
        process.pending_hold = None;
        process.alarm_arg = None;
        process.notify_pending.clear_all();
        process.async_ring.clear();
        process.async_pending.clear();

        for handle in timers {
            self.timers.cancel(handle);
        }
        if let Some(to) = send_target {
            if let Some(receiver) = self.processes.get_mut(to) {
                receiver.senders.retain(|s| *s != victim);
            }
        }

        waiters.extend(
            self.processes
                .iter()
                .filter(|p| {
                    p.state
                        == RunState::Receiving {
                            from: SourceFilter::From(victim),
                        }
                })
                .map(|p| p.endpoint),
        );
        for waiter in waiters {
            self.release_waiter(waiter, victim);
        }

        for process in self.processes.iter_mut() {
            process.notify_pending.clear(victim.slot());
            process.async_pending.retain(|s| *s != victim);
            process.async_ring.discard_for(victim);
        }

        for grant in self.grants.table_mut(victim.slot()).revoke_all() {
            self.record(KernelEvent::GrantRevoked {
                owner: victim,
                grant,
            });
        }
        self.privileges.clear_process(victim);
        self.memory[victim.slot().index()].release();

        if let Some(process) = self.processes.get_mut(victim) {
            process.state = RunState::Dead;
        }
    }

    /// Fails a process's pending IPC because its partner died
    fn release_waiter(&mut self, waiter: Endpoint, dead: Endpoint) {
        let Some(process) = self.processes.get_mut(waiter) else {
            return;
        };
        process.send_buffer = None;
        process.sendrec_target = None;
        process.ipc_result = Some(Err(KernelError::DeadPartner(dead)));
        self.record(KernelEvent::PartnerReleased { waiter, dead });
        self.wake(waiter);
    }

    /// # Panics
    ///
    /// Panics if any live process still refers to `dead`.
    fn assert_unreferenced(&self, dead: Endpoint) {
        assert!(
            self.scheduler.current() != Some(dead) && !self.scheduler.is_queued(dead),
            "{} is still scheduled",
            dead
        );
        for process in self.processes.iter() {
            let referenced = process.senders.contains(&dead)
                || process.async_pending.contains(&dead)
                || process.waits_on() == Some(dead)
                || process.sendrec_target == Some(dead)
                || process.notify_pending.is_set(dead.slot())
                || process.async_ring.has_entry_for(dead);
            assert!(
                !referenced,
                "{} still refers to dead {}",
                process.endpoint, dead
            );
        }
    }
}
