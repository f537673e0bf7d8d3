//! Scheduling Scenarios
//!
//! Validates priority preemption, quantum expiry and the scheduling
//! controls held by system processes.

use core_types::Priority;
use ipc::{Message, SourceFilter};
use kernel_api::{KernelError, Tick, Ticks};
use kernel_core::scheduler::{PreemptionReason, ScheduleEvent};
use kernel_core::{DemotionPolicy, KernelEvent, RunState};
use tests_kernel::{check_invariants, KernelApi, KernelBuilder};

/// Test: Waking a more urgent process preempts the running one
#[test]
fn test_wakeup_preempts_lower_priority() {
    let mut t = KernelBuilder::new()
        .process("urgent", 7)
        .process("worker", 8)
        .build();
    let (urgent, worker) = (t.ep("urgent"), t.ep("worker"));
    assert_eq!(t.current(), Some(urgent));

    t.receive(urgent, SourceFilter::Any).unwrap();
    assert_eq!(t.current(), Some(worker));

    t.advance_ticks(3);
    t.send(worker, urgent, Message::new(1)).unwrap();

    assert_eq!(t.current(), Some(urgent));
    assert_eq!(t.scheduler().queue(8), vec![worker]);
    assert!(t.scheduler().audit_log().iter().any(|e| matches!(
        e,
        ScheduleEvent::Preempted {
            endpoint,
            reason: PreemptionReason::HigherPriority,
            ..
        } if *endpoint == worker
    )));
    check_invariants(&t);
}

/// Test: A preempted process keeps the rest of its quantum
#[test]
fn test_preempted_process_keeps_remaining_quantum() {
    let mut t = KernelBuilder::new()
        .process("urgent", 7)
        .process("worker", 8)
        .build();
    let (urgent, worker) = (t.ep("urgent"), t.ep("worker"));

    t.receive(urgent, SourceFilter::Any).unwrap();
    t.advance_ticks(3);
    t.send(worker, urgent, Message::new(1)).unwrap();
    assert_eq!(t.process(worker).unwrap().ticks_left, Ticks(5));
    assert!(t.process(worker).unwrap().quantum_timer.is_none());

    t.receive(urgent, SourceFilter::Any).unwrap();
    assert_eq!(t.current(), Some(worker));
    let timer = t.process(worker).unwrap().quantum_timer.unwrap();
    assert_eq!(timer.deadline, Tick::new(8));
}

/// Test: Equal-priority processes take turns when quanta expire
#[test]
fn test_round_robin_on_quantum_expiry() {
    let mut t = KernelBuilder::new()
        .configure(|c| c.scheduler.quantum_ticks = 4)
        .process("a", 8)
        .process("b", 8)
        .process("c", 8)
        .build();
    let order = [t.ep("a"), t.ep("b"), t.ep("c")];

    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(t.current().unwrap());
        t.advance_ticks(4);
        check_invariants(&t);
    }
    assert_eq!(seen, [order, order].concat());
    assert_eq!(
        t.trace()
            .count_events(|e| matches!(e, KernelEvent::QuantumExpired { .. })),
        6
    );
}

/// Test: A process alone at its level keeps running after expiry
#[test]
fn test_lone_process_gets_fresh_quantum() {
    let mut t = KernelBuilder::new()
        .configure(|c| c.scheduler.quantum_ticks = 5)
        .process("solo", 8)
        .build();
    let solo = t.ep("solo");

    t.advance_ticks(5);
    assert_eq!(t.current(), Some(solo));
    let timer = t.process(solo).unwrap().quantum_timer.unwrap();
    assert_eq!(timer.deadline, Tick::new(10));
}

/// Test: Lower levels never run while a higher level is busy
#[test]
fn test_lower_level_starves_behind_busy_level() {
    let mut t = KernelBuilder::new()
        .configure(|c| c.scheduler.quantum_ticks = 2)
        .process("hi", 8)
        .process("lo", 9)
        .build();
    let (hi, lo) = (t.ep("hi"), t.ep("lo"));

    for _ in 0..10 {
        t.advance_ticks(1);
        assert_eq!(t.current(), Some(hi));
    }
    assert!(!t.scheduler().audit_log().iter().any(|e| matches!(
        e,
        ScheduleEvent::Selected { endpoint, .. } if *endpoint == lo
    )));

    t.exit(hi).unwrap();
    assert_eq!(t.current(), Some(lo));
}

/// Test: Quantum expiry demotes user processes down to a limit
#[test]
fn test_demotion_stops_at_lowest_level() {
    let mut t = KernelBuilder::new()
        .configure(|c| {
            c.scheduler.quantum_ticks = 2;
            c.scheduler.demotion = DemotionPolicy::OneLevel { lowest: 10 };
        })
        .process("spinner", 8)
        .build();
    let spinner = t.ep("spinner");

    t.advance_ticks(2);
    assert_eq!(t.process(spinner).unwrap().priority, Priority(9));
    t.advance_ticks(4);
    assert_eq!(t.process(spinner).unwrap().priority, Priority(10));
    assert_eq!(t.current(), Some(spinner));
    check_invariants(&t);
}

/// Test: System processes are never demoted
#[test]
fn test_system_process_not_demoted() {
    let mut t = KernelBuilder::new()
        .configure(|c| {
            c.scheduler.quantum_ticks = 2;
            c.scheduler.demotion = DemotionPolicy::OneLevel { lowest: 10 };
        })
        .system_process("pm", 3)
        .build();
    let pm = t.ep("pm");

    t.advance_ticks(8);
    assert_eq!(t.process(pm).unwrap().priority, Priority(3));
}

/// Test: Reschedule changes the level and quantum of a runnable process
#[test]
fn test_reschedule_sets_level_and_quantum() {
    let mut t = KernelBuilder::new()
        .system_process("pm", 1)
        .process("a", 9)
        .build();
    let (pm, a) = (t.ep("pm"), t.ep("a"));

    t.reschedule(pm, a, Priority(7), Ticks(3)).unwrap();
    assert_eq!(t.scheduler().queue(7), vec![a]);
    assert!(t.scheduler().queue(9).is_empty());

    t.receive(pm, SourceFilter::Any).unwrap();
    assert_eq!(t.current(), Some(a));
    let timer = t.process(a).unwrap().quantum_timer.unwrap();
    assert_eq!(timer.deadline, Tick::new(3));
}

/// Test: Reschedule keeps user processes below the reserved levels
#[test]
fn test_reschedule_respects_priority_floor() {
    let mut t = KernelBuilder::new()
        .system_process("sched", 1)
        .system_process("driver", 3)
        .process("u", 8)
        .build();
    let (sched, driver, u) = (t.ep("sched"), t.ep("driver"), t.ep("u"));

    assert!(matches!(
        t.reschedule(sched, u, Priority(0), Ticks(4)),
        Err(KernelError::NotAllowed(_))
    ));
    assert!(matches!(
        t.reschedule(sched, u, Priority(6), Ticks(4)),
        Err(KernelError::NotAllowed(_))
    ));
    assert_eq!(t.process(u).unwrap().priority, Priority(8));
    assert_eq!(t.scheduler().queue(8), vec![u]);

    t.reschedule(sched, driver, Priority(2), Ticks(4)).unwrap();
    assert_eq!(t.process(driver).unwrap().priority, Priority(2));
    check_invariants(&t);
}

/// Test: Scheduling controls belong to system processes
#[test]
fn test_user_cannot_reschedule_or_stop() {
    let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
    let (a, b) = (t.ep("a"), t.ep("b"));

    assert!(matches!(
        t.reschedule(a, b, Priority(8), Ticks(2)),
        Err(KernelError::NotAllowed(_))
    ));
    assert!(matches!(t.stop(a, b), Err(KernelError::NotAllowed(_))));
}

/// Test: A stopped process leaves the ready queues until resumed
#[test]
fn test_stop_and_resume_runnable() {
    let mut t = KernelBuilder::new()
        .system_process("pm", 1)
        .process("a", 8)
        .build();
    let (pm, a) = (t.ep("pm"), t.ep("a"));

    t.stop(pm, a).unwrap();
    assert_eq!(t.state_of(a), Some(RunState::Stopped));
    assert!(!t.scheduler().is_queued(a));
    assert!(matches!(t.stop(pm, a), Err(KernelError::InvalidState(_))));
    check_invariants(&t);

    t.resume(pm, a).unwrap();
    assert_eq!(t.state_of(a), Some(RunState::Runnable));
    assert!(t.scheduler().is_queued(a));
    assert!(matches!(t.resume(pm, a), Err(KernelError::InvalidState(_))));
}

/// Test: A signal hold taken during IPC lands once the IPC completes
#[test]
fn test_signal_hold_deferred_while_sending() {
    let mut t = KernelBuilder::new()
        .system_process("pm", 1)
        .process("server", 8)
        .process("client", 8)
        .build();
    let (pm, server, client) = (t.ep("pm"), t.ep("server"), t.ep("client"));

    t.send(client, server, Message::new(1)).unwrap();
    t.block_on_signal(pm, client).unwrap();
    assert_eq!(t.state_of(client), Some(RunState::Sending { to: server }));

    t.receive(server, SourceFilter::Any).unwrap();
    assert_eq!(t.state_of(client), Some(RunState::BlockedOnSignal));
    assert!(!t.scheduler().is_queued(client));

    t.end_signal(pm, client).unwrap();
    assert_eq!(t.state_of(client), Some(RunState::Runnable));
    check_invariants(&t);
}

/// Test: With everyone blocked the CPU idles and time still moves
#[test]
fn test_idle_when_all_blocked() {
    let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
    let (a, b) = (t.ep("a"), t.ep("b"));

    t.receive(a, SourceFilter::Any).unwrap();
    t.receive(b, SourceFilter::Any).unwrap();
    assert_eq!(t.current(), None);

    t.advance_ticks(20);
    assert_eq!(t.now(), Tick::new(20));
    assert_eq!(t.current(), None);
    assert!(t.timers().is_empty());
}
