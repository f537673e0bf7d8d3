//! Trap Gate and Configuration Scenarios
//!
//! Validates that numbered traps reach the kernel with the same checks as
//! direct calls, and that a kernel can be configured from JSON.

use core_types::{MemoryPerms, Priority};
use ipc::{Message, SourceFilter};
use kernel_api::{
    IpcOutcome, KernelCall, KernelCallNumber, KernelCallReply, KernelError, Privileges,
    SendTargets, Tick, Ticks,
};
use kernel_core::{ConfigError, KernelConfig, SyscallEvent, SyscallGate, TraceRecord};
use tests_kernel::{received, KernelApi, KernelBuilder};

/// Test: A system process spawns and maps memory through the gate
#[test]
fn test_gate_spawn_and_map() {
    let mut gate = SyscallGate::new();
    let mut t = KernelBuilder::new().system_process("pm", 1).build();
    let pm = t.ep("pm");

    let reply = gate
        .execute(
            &mut t.kernel,
            pm,
            KernelCall::Spawn {
                name: "child".to_string(),
                priority: Priority(8),
                privileges: Privileges::user(SendTargets::All),
            },
        )
        .unwrap();
    let KernelCallReply::Spawned(child) = reply else {
        panic!("expected a spawned endpoint, got {:?}", reply);
    };
    assert_eq!(t.process(child).unwrap().name, "child");

    let number = KernelCallNumber::MapRegion.number();
    let reply = gate
        .execute_numbered(
            &mut t.kernel,
            pm,
            number,
            KernelCall::MapRegion {
                target: child,
                size: 128,
                perms: MemoryPerms::read_write(),
            },
        )
        .unwrap();
    assert!(matches!(reply, KernelCallReply::Region(_)));
    assert_eq!(
        gate.audit_log()
            .count_events(|e| matches!(e, SyscallEvent::Completed { .. })),
        2
    );
}

/// Test: The gate and direct calls agree on a sendrec exchange
#[test]
fn test_gate_sendrec_exchange() {
    let mut gate = SyscallGate::new();
    let mut t = KernelBuilder::new()
        .process("server", 8)
        .process("client", 8)
        .build();
    let (server, client) = (t.ep("server"), t.ep("client"));

    gate.execute(&mut t.kernel, server, KernelCall::Receive { from: SourceFilter::Any })
        .unwrap();
    let reply = gate
        .execute(
            &mut t.kernel,
            client,
            KernelCall::SendRec {
                dst: server,
                msg: Message::new(21),
            },
        )
        .unwrap();
    assert_eq!(reply, KernelCallReply::Ipc(IpcOutcome::Blocked));
    assert_eq!(received(&mut t, server).m_type, 21);

    gate.execute(
        &mut t.kernel,
        server,
        KernelCall::Send {
            dst: client,
            msg: Message::new(22),
        },
    )
    .unwrap();
    assert_eq!(received(&mut t, client).m_type, 22);
}

/// Test: Rejections are audited with their error
#[test]
fn test_gate_audits_rejection() {
    let mut gate = SyscallGate::new();
    let mut t = KernelBuilder::new().process("a", 8).build();
    let a = t.ep("a");

    let result = gate.execute(
        &mut t.kernel,
        a,
        KernelCall::Reschedule {
            target: a,
            priority: Priority(8),
            quantum: Ticks(4),
        },
    );
    assert!(matches!(result, Err(KernelError::NotAllowed(_))));
    assert!(gate.audit_log().has_event(|e| matches!(
        e,
        SyscallEvent::Rejected {
            call: KernelCallNumber::Reschedule,
            error: KernelError::NotAllowed(_),
            ..
        }
    )));

    gate.clear_audit_log();
    let reply = gate.execute(&mut t.kernel, a, KernelCall::Uptime).unwrap();
    assert_eq!(reply, KernelCallReply::Uptime(Tick::ZERO));
}

/// Test: A kernel boots from a JSON configuration
#[test]
fn test_kernel_from_json_config() {
    let mut config = KernelConfig::default();
    config.max_processes = 8;
    config.scheduler.quantum_ticks = 2;
    let json = config.to_json().unwrap();

    let loaded = KernelConfig::from_json(&json).unwrap();
    assert_eq!(loaded, config);

    let t = KernelBuilder::new()
        .with_config(loaded)
        .process("a", 8)
        .process("b", 8)
        .build();
    let a = t.ep("a");
    let timer = t.process(a).unwrap().quantum_timer.unwrap();
    assert_eq!(timer.deadline, Tick::new(2));
}

/// Test: Broken or inconsistent configurations are refused
#[test]
fn test_bad_config_refused() {
    assert!(matches!(
        KernelConfig::from_json("{ not json"),
        Err(ConfigError::Malformed(_))
    ));

    let mut config = KernelConfig::default();
    config.scheduler.queue_count = 4;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid {
            field: "scheduler.user_priority_floor",
            ..
        })
    ));
}

/// Test: The process table size bounds spawning
#[test]
fn test_process_table_exhausted() {
    let mut t = KernelBuilder::new()
        .configure(|c| c.max_processes = 4)
        .system_process("pm", 1)
        .build();
    let pm = t.ep("pm");

    let privileges = Privileges::user(SendTargets::All);
    t.kernel.spawn(pm, "one", Priority(8), privileges.clone()).unwrap();
    assert!(matches!(
        t.kernel.spawn(pm, "two", Priority(8), privileges),
        Err(KernelError::ResourceExhausted(_))
    ));
}

/// Test: The audit trail serializes for offline inspection
#[test]
fn test_trace_serializes() {
    let mut t = KernelBuilder::new().process("a", 8).process("b", 8).build();
    let (a, b) = (t.ep("a"), t.ep("b"));
    t.kernel.notify(a, b).unwrap();

    let json = t.trace().to_json().unwrap();
    let records: Vec<TraceRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(records, t.trace().records());
}
