//! Timer Scenarios
//!
//! Validates alarms, their CLOCK notifications, and the ordering of timer
//! expiry across clock interrupts.

use core_types::well_known::CLOCK;
use ipc::{SourceFilter, NOTIFY_ARG_WORD};
use kernel_api::{IpcOutcome, Tick, TimerHandle};
use kernel_core::{Kernel, KernelEvent, SimClock};
use tests_kernel::{check_invariants, received, KernelApi, KernelBuilder};

fn fired(kernel: &Kernel) -> Vec<(Tick, TimerHandle)> {
    kernel
        .trace()
        .records()
        .iter()
        .filter_map(|r| match &r.event {
            KernelEvent::TimerFired { handle } => Some((r.timestamp, *handle)),
            _ => None,
        })
        .collect()
}

/// Test: Successive alarms wake a receiver in deadline order
#[test]
fn test_alarms_wake_receiver_in_order() {
    let mut t = KernelBuilder::new().process("sleeper", 8).build();
    let sleeper = t.ep("sleeper");

    t.arm_timer(sleeper, Tick::new(6), 2).unwrap();
    t.arm_timer(sleeper, Tick::new(3), 1).unwrap();

    t.receive(sleeper, SourceFilter::From(CLOCK)).unwrap();
    t.advance_ticks(3);
    let first = received(&mut t, sleeper);
    assert_eq!(first.words[NOTIFY_ARG_WORD], 1);

    t.receive(sleeper, SourceFilter::From(CLOCK)).unwrap();
    t.advance_ticks(2);
    assert_eq!(t.take_ipc_result(sleeper), None);
    t.advance_ticks(1);
    let second = received(&mut t, sleeper);
    assert_eq!(second.words[NOTIFY_ARG_WORD], 2);
    check_invariants(&t);
}

/// Test: An alarm for a busy process is kept as a pending notification
#[test]
fn test_alarm_pending_until_receive() {
    let mut t = KernelBuilder::new().process("busy", 8).build();
    let busy = t.ep("busy");

    t.arm_timer(busy, Tick::new(2), 77).unwrap();
    t.advance_ticks(5);
    assert!(t
        .trace()
        .has_event(|e| matches!(e, KernelEvent::NotificationPending { from, .. } if *from == CLOCK)));

    let IpcOutcome::Received(msg) = t.receive(busy, SourceFilter::Any).unwrap() else {
        panic!("alarm notification should be pending");
    };
    assert_eq!(msg.source, CLOCK);
    assert!(msg.is_notification());
    assert_eq!(msg.words[NOTIFY_ARG_WORD], 77);
}

/// Test: One interrupt fires every overdue timer in deadline order
#[test]
fn test_late_interrupt_catches_up() {
    let mut t = KernelBuilder::new().process("a", 8).build();
    let a = t.ep("a");

    let late = t.arm_timer(a, Tick::new(7), 3).unwrap();
    let early = t.arm_timer(a, Tick::new(3), 1).unwrap();
    let middle = t.arm_timer(a, Tick::new(5), 2).unwrap();

    let mut clock = SimClock::new();
    clock.set_ticks(10);
    t.on_clock_interrupt(&mut clock);

    assert_eq!(
        fired(&t),
        vec![
            (Tick::new(10), early),
            (Tick::new(10), middle),
            (Tick::new(10), late)
        ]
    );

    // Three alarms collapse into one notification carrying the last argument
    let IpcOutcome::Received(msg) = t.receive(a, SourceFilter::Any).unwrap() else {
        panic!("alarm notification should be pending");
    };
    assert_eq!(msg.words[NOTIFY_ARG_WORD], 3);
    assert_eq!(t.receive(a, SourceFilter::From(CLOCK)).unwrap(), IpcOutcome::Blocked);
}

/// Test: A deadline already in the past fires on the next interrupt
#[test]
fn test_past_deadline_fires_next_tick() {
    let mut t = KernelBuilder::new().process("a", 8).build();
    let a = t.ep("a");

    t.advance_ticks(5);
    let handle = t.arm_timer(a, Tick::new(1), 0).unwrap();
    assert!(fired(&t).is_empty());
    t.advance_ticks(1);
    assert_eq!(fired(&t), vec![(Tick::new(6), handle)]);
}

/// Test: Timers armed while timers fire wait for a later interrupt
#[test]
fn test_timer_armed_during_expiry_waits() {
    fn chain(kernel: &mut Kernel, remaining: u64) {
        if remaining > 0 {
            kernel.arm_watchdog(kernel.now(), chain, remaining - 1);
        }
    }

    let mut t = KernelBuilder::new().build();
    t.arm_watchdog(Tick::new(2), chain, 2);
    t.advance_ticks(5);

    let times: Vec<Tick> = fired(&t).into_iter().map(|(at, _)| at).collect();
    assert_eq!(times, vec![Tick::new(2), Tick::new(3), Tick::new(4)]);
}

/// Test: Processes can only cancel their own alarms
#[test]
fn test_cancel_foreign_alarm_is_noop() {
    let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
    let (a, b) = (t.ep("a"), t.ep("b"));

    let handle = t.arm_timer(a, Tick::new(4), 9).unwrap();
    t.cancel_timer(b, handle).unwrap();
    assert!(t.timers().is_armed(handle));

    t.advance_ticks(4);
    assert_eq!(fired(&t), vec![(Tick::new(4), handle)]);
}

/// Test: A dying process takes its alarms with it
#[test]
fn test_alarms_cancelled_on_exit() {
    let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
    let a = t.ep("a");

    let handle = t.arm_timer(a, Tick::new(4), 9).unwrap();
    t.exit(a).unwrap();
    assert!(!t.timers().is_armed(handle));

    t.advance_ticks(10);
    assert!(fired(&t).is_empty());
    check_invariants(&t);
}
