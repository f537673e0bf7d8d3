//! Message passing
//!
//! Synchronous send and receive meet in a rendezvous: whichever side
//! arrives first blocks until the other comes. Notifications collapse into
//! one pending bit per source. Asynchronous sends are parked in the
//! sender's own ring until the target is ready.
//!
//! A receive looks for work in a fixed order: pending notifications, then
//! blocked senders in arrival order, then asynchronous messages.

use crate::async_ring::QueueError;
use crate::process::{Process, RunState};
use crate::trace::{DeliveryKind, KernelEvent};
use crate::Kernel;
use core_types::well_known::CLOCK;
use core_types::Endpoint;
use ipc::{Message, MessageFlags, SourceFilter, NOTIFY_ARG_WORD};
use kernel_api::{IpcCompletion, IpcOutcome, KernelCallNumber, KernelError};

impl Kernel {
    pub(crate) fn do_send(
        &mut self,
        caller: Endpoint,
        dst: Endpoint,
        msg: Message,
    ) -> Result<IpcOutcome, KernelError> {
        self.require(caller, KernelCallNumber::Send)?;
        self.check_send_target(caller, dst)?;
        self.send_message(caller, dst, msg)
    }

    pub(crate) fn do_sendrec(
        &mut self,
        caller: Endpoint,
        dst: Endpoint,
        msg: Message,
    ) -> Result<IpcOutcome, KernelError> {
        self.require(caller, KernelCallNumber::SendRec)?;
        self.check_send_target(caller, dst)?;

        self.processes.live_mut(caller)?.sendrec_target = Some(dst);
        match self.send_message(caller, dst, msg) {
            Ok(IpcOutcome::Delivered) => {
                self.wait_for(caller, SourceFilter::From(dst))?;
                Ok(IpcOutcome::Blocked)
            }
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.processes.live_mut(caller)?.sendrec_target = None;
                Err(error)
            }
        }
    }

    pub(crate) fn do_receive(
        &mut self,
        caller: Endpoint,
        from: SourceFilter,
    ) -> Result<IpcOutcome, KernelError> {
        self.require(caller, KernelCallNumber::Receive)?;
        if let SourceFilter::From(src) = from {
            self.processes.live(src)?;
            if src == caller {
                return Err(KernelError::InvalidArgument(
                    "cannot receive from self".to_string(),
                ));
            }
        }

        if let Some(msg) = self.take_notification(caller, from) {
            return Ok(IpcOutcome::Received(msg));
        }
        if let Some(msg) = self.take_sender(caller, from) {
            return Ok(IpcOutcome::Received(msg));
        }
        if let Some(msg) = self.take_async(caller, from) {
            return Ok(IpcOutcome::Received(msg));
        }

        if let SourceFilter::From(src) = from {
            self.refuse_deadlock(caller, src)?;
        }
        self.wait_for(caller, from)?;
        Ok(IpcOutcome::Blocked)
    }

    pub(crate) fn do_notify(&mut self, caller: Endpoint, dst: Endpoint) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::Notify)?;
        self.check_send_target(caller, dst)?;
        self.post_notification(caller, dst);
        Ok(())
    }

    pub(crate) fn do_send_async(
        &mut self,
        caller: Endpoint,
        dst: Endpoint,
        msg: Message,
    ) -> Result<IpcOutcome, KernelError> {
        self.require(caller, KernelCallNumber::SendAsync)?;
        self.check_send_target(caller, dst)?;

        // Earlier messages to the same target must land first
        let queued_earlier = self.processes.live(caller)?.async_ring.has_entry_for(dst);
        if !queued_earlier && self.processes.live(dst)?.accepts_unsolicited(caller) {
            self.deliver(caller, dst, msg, DeliveryKind::Async);
            return Ok(IpcOutcome::Delivered);
        }

        let sender = self.processes.live_mut(caller)?;
        let capacity = sender.async_ring.capacity();
        sender
            .async_ring
            .push(dst, msg)
            .map_err(|QueueError::Full| KernelError::QueueFull {
                sender: caller,
                capacity,
            })?;

        let target = self.processes.live_mut(dst)?;
        if !target.async_pending.contains(&caller) {
            target.async_pending.push_back(caller);
        }
        self.record(KernelEvent::AsyncQueued {
            sender: caller,
            receiver: dst,
        });
        Ok(IpcOutcome::Queued)
    }

    /// Sets a notification bit, or delivers at once if `dst` is waiting
    ///
    /// Also the path for kernel-originated notifications, which skip the
    /// privilege check.
    pub(crate) fn post_notification(&mut self, src: Endpoint, dst: Endpoint) {
        let now = self.now;
        let Some(target) = self.processes.get_mut(dst) else {
            return;
        };
        if target.accepts_unsolicited(src) {
            let msg = Self::notification_message(target, src, now.as_u64());
            self.deliver(src, dst, msg, DeliveryKind::Notification);
        } else if target.notify_pending.set(src.slot()) {
            self.record(KernelEvent::NotificationPending { from: src, to: dst });
        }
    }

    fn notification_message(receiver: &mut Process, src: Endpoint, timestamp: u64) -> Message {
        let msg = Message::notification(src, timestamp);
        match receiver.alarm_arg.take() {
            Some(arg) if src == CLOCK => msg.with_word(NOTIFY_ARG_WORD, arg),
            other => {
                receiver.alarm_arg = other;
                msg
            }
        }
    }

    fn check_send_target(&self, caller: Endpoint, dst: Endpoint) -> Result<(), KernelError> {
        let target = self.processes.live(dst)?;
        if dst == caller {
            return Err(KernelError::InvalidArgument(
                "cannot send to self".to_string(),
            ));
        }
        if target.is_kernel_task() {
            return Err(KernelError::NotAllowed(format!(
                "{} is a kernel task",
                dst
            )));
        }
        if !self.privileges.check_send(caller, dst) {
            return Err(KernelError::NotAllowed(format!(
                "{} may not send to {}",
                caller, dst
            )));
        }
        Ok(())
    }

    fn send_message(
        &mut self,
        caller: Endpoint,
        dst: Endpoint,
        msg: Message,
    ) -> Result<IpcOutcome, KernelError> {
        if self.processes.live(dst)?.accepts(caller) {
            self.deliver(caller, dst, msg, DeliveryKind::Sync);
            return Ok(IpcOutcome::Delivered);
        }

        self.refuse_deadlock(caller, dst)?;

        let sender = self.processes.live_mut(caller)?;
        sender.state = RunState::Sending { to: dst };
        sender.send_buffer = Some(msg);
        sender.ipc_result = None;
        self.processes.live_mut(dst)?.senders.push_back(caller);
        self.record(KernelEvent::SenderBlocked {
            sender: caller,
            receiver: dst,
        });
        self.block(caller);
        Ok(IpcOutcome::Blocked)
    }

    /// Blocks `caller` in a receive
    fn wait_for(&mut self, caller: Endpoint, from: SourceFilter) -> Result<(), KernelError> {
        let receiver = self.processes.live_mut(caller)?;
        receiver.state = RunState::Receiving { from };
        receiver.ipc_result = None;
        self.record(KernelEvent::ReceiverBlocked {
            receiver: caller,
            filter: from,
        });
        self.block(caller);
        Ok(())
    }

    fn block(&mut self, caller: Endpoint) {
        self.deschedule(caller);
        self.drain_ring(caller);
    }

    /// Refuses a wait that would close a cycle of blocked processes
    fn refuse_deadlock(&mut self, caller: Endpoint, partner: Endpoint) -> Result<(), KernelError> {
        let mut next = Some(partner);
        let mut hops = 0;
        while let Some(endpoint) = next {
            if endpoint == caller {
                self.record(KernelEvent::DeadlockRefused { caller, partner });
                log::warn!("{} waiting on {} would deadlock", caller, partner);
                return Err(KernelError::Deadlock { caller, partner });
            }
            hops += 1;
            if hops > self.processes.capacity() {
                break;
            }
            next = self.processes.get(endpoint).and_then(Process::waits_on);
        }
        Ok(())
    }

    /// Hands `msg` to a process blocked in receive and wakes it
    pub(crate) fn deliver(&mut self, from: Endpoint, to: Endpoint, msg: Message, kind: DeliveryKind) {
        let flags = match kind {
            DeliveryKind::Sync => MessageFlags::empty(),
            DeliveryKind::Async => MessageFlags::ASYNC,
            DeliveryKind::Notification => MessageFlags::NOTIFICATION,
        };
        let Some(receiver) = self.processes.get_mut(to) else {
            return;
        };
        receiver.ipc_result = Some(Ok(IpcCompletion::Received(msg.stamped(from, flags))));
        receiver.sendrec_target = None;
        self.record(KernelEvent::Delivered { from, to, kind });
        self.wake(to);
    }

    fn take_notification(&mut self, receiver: Endpoint, from: SourceFilter) -> Option<Message> {
        let process = self.processes.get(receiver)?;
        if process.awaiting_reply() {
            return None;
        }
        let source = process
            .notify_pending
            .iter()
            .filter_map(|slot| self.processes.endpoint_at(slot))
            .find(|src| from.matches(*src))?;

        let now = self.now;
        let process = self.processes.get_mut(receiver)?;
        process.notify_pending.clear(source.slot());
        let msg = Self::notification_message(process, source, now.as_u64());
        self.record(KernelEvent::Delivered {
            from: source,
            to: receiver,
            kind: DeliveryKind::Notification,
        });
        Some(msg)
    }

    fn take_sender(&mut self, receiver: Endpoint, from: SourceFilter) -> Option<Message> {
        let process = self.processes.get_mut(receiver)?;
        let index = process.senders.iter().position(|s| from.matches(*s))?;
        let sender = process.senders.remove(index)?;

        let blocked = self.processes.get_mut(sender)?;
        let msg = blocked.send_buffer.take()?;
        let awaits_reply = blocked.sendrec_target == Some(receiver);
        self.record(KernelEvent::Delivered {
            from: sender,
            to: receiver,
            kind: DeliveryKind::Sync,
        });

        if awaits_reply {
            // The send half of a sendrec is done; the sender now waits for the reply
            if let Some(blocked) = self.processes.get_mut(sender) {
                blocked.state = RunState::Receiving {
                    from: SourceFilter::From(receiver),
                };
            }
            self.record(KernelEvent::ReceiverBlocked {
                receiver: sender,
                filter: SourceFilter::From(receiver),
            });
        } else {
            if let Some(blocked) = self.processes.get_mut(sender) {
                blocked.ipc_result = Some(Ok(IpcCompletion::Sent));
            }
            self.wake(sender);
        }
        Some(msg.stamped(sender, MessageFlags::empty()))
    }

    fn take_async(&mut self, receiver: Endpoint, from: SourceFilter) -> Option<Message> {
        let process = self.processes.get(receiver)?;
        let index = process.async_pending.iter().position(|s| from.matches(*s))?;
        let sender = process.async_pending[index];

        let ring = &mut self.processes.get_mut(sender)?.async_ring;
        let msg = ring.take_first_for(receiver);
        let more = ring.has_entry_for(receiver);

        let process = self.processes.get_mut(receiver)?;
        process.async_pending.remove(index);
        if more {
            process.async_pending.push_back(sender);
        }

        let msg = msg?;
        self.record(KernelEvent::Delivered {
            from: sender,
            to: receiver,
            kind: DeliveryKind::Async,
        });
        Some(msg.stamped(sender, MessageFlags::ASYNC))
    }

    /// Delivers whatever `sender`'s ring holds for targets now receiving
    ///
    /// At most one message per target moves, oldest first. Returns true if
    /// anything was delivered.
    pub(crate) fn drain_ring(&mut self, sender: Endpoint) -> bool {
        let Some(process) = self.processes.get(sender) else {
            return false;
        };
        let mut delivered = false;
        for dst in process.async_ring.targets() {
            let ready = self
                .processes
                .get(dst)
                .is_some_and(|target| target.accepts_unsolicited(sender));
            if !ready {
                continue;
            }

            let Some(ring) = self.processes.get_mut(sender).map(|p| &mut p.async_ring) else {
                continue;
            };
            let Some(msg) = ring.take_first_for(dst) else {
                continue;
            };
            if !ring.has_entry_for(dst) {
                if let Some(target) = self.processes.get_mut(dst) {
                    target.async_pending.retain(|s| *s != sender);
                }
            }
            self.deliver(sender, dst, msg, DeliveryKind::Async);
            delivered = true;
        }
        delivered
    }

    /// Drains every ring; returns true if anything was delivered
    pub(crate) fn drain_all_rings(&mut self) -> bool {
        let mut delivered = false;
        for sender in self.processes.endpoints() {
            delivered |= self.drain_ring(sender);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::KernelBuilder;
    use crate::trace::KernelEvent;
    use crate::RunState;
    use ipc::{Message, SourceFilter};
    use kernel_api::{IpcCompletion, IpcOutcome, KernelApi, KernelError};

    #[test]
    fn test_receiver_first_rendezvous() {
        let mut t = KernelBuilder::new()
            .process("server", 8)
            .process("client", 8)
            .build();
        let (server, client) = (t.ep("server"), t.ep("client"));

        assert_eq!(t.receive(server, SourceFilter::Any).unwrap(), IpcOutcome::Blocked);
        assert_eq!(
            t.send(client, server, Message::new(7).with_word(0, 42)).unwrap(),
            IpcOutcome::Delivered
        );

        let Some(Ok(IpcCompletion::Received(msg))) = t.take_ipc_result(server) else {
            panic!("server did not receive");
        };
        assert_eq!(msg.source, client);
        assert_eq!(msg.m_type, 7);
        assert_eq!(msg.words[0], 42);
        assert_eq!(t.state_of(server), Some(RunState::Runnable));
    }

    #[test]
    fn test_sender_first_rendezvous() {
        let mut t = KernelBuilder::new()
            .process("server", 8)
            .process("client", 8)
            .build();
        let (server, client) = (t.ep("server"), t.ep("client"));

        assert_eq!(t.send(client, server, Message::new(1)).unwrap(), IpcOutcome::Blocked);
        assert_eq!(t.state_of(client), Some(RunState::Sending { to: server }));

        let IpcOutcome::Received(msg) = t.receive(server, SourceFilter::Any).unwrap() else {
            panic!("expected an immediate receive");
        };
        assert_eq!(msg.source, client);
        assert_eq!(t.take_ipc_result(client), Some(Ok(IpcCompletion::Sent)));
        assert_eq!(t.state_of(client), Some(RunState::Runnable));
    }

    #[test]
    fn test_send_to_self_refused() {
        let mut t = KernelBuilder::new().process("a", 8).build();
        let a = t.ep("a");
        assert!(matches!(
            t.send(a, a, Message::new(0)),
            Err(KernelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mutual_send_is_deadlock() {
        let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
        let (a, b) = (t.ep("a"), t.ep("b"));

        assert_eq!(t.send(a, b, Message::new(0)).unwrap(), IpcOutcome::Blocked);
        assert_eq!(
            t.send(b, a, Message::new(0)),
            Err(KernelError::Deadlock { caller: b, partner: a })
        );
        assert_eq!(t.state_of(b), Some(RunState::Runnable));
        assert!(t
            .trace()
            .has_event(|e| matches!(e, KernelEvent::DeadlockRefused { .. })));
    }

    #[test]
    fn test_notifications_collapse() {
        let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
        let (a, b) = (t.ep("a"), t.ep("b"));

        t.notify(a, b).unwrap();
        t.notify(a, b).unwrap();

        let IpcOutcome::Received(msg) = t.receive(b, SourceFilter::Any).unwrap() else {
            panic!("expected the pending notification");
        };
        assert!(msg.is_notification());
        assert_eq!(msg.source, a);
        assert_eq!(t.receive(b, SourceFilter::Any).unwrap(), IpcOutcome::Blocked);
    }

    #[test]
    fn test_async_queued_then_received_in_order() {
        let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
        let (a, b) = (t.ep("a"), t.ep("b"));

        for n in 0..3 {
            assert_eq!(
                t.send_async(a, b, Message::new(n)).unwrap(),
                IpcOutcome::Queued
            );
        }
        for n in 0..3 {
            let IpcOutcome::Received(msg) = t.receive(b, SourceFilter::From(a)).unwrap() else {
                panic!("expected queued message {}", n);
            };
            assert!(msg.is_async());
            assert_eq!(msg.m_type, n);
        }
    }
}
