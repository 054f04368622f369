//! Task start, wait and placement

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use parking_lot::Mutex;
use tasknode::{
    ActionAttributes, Affinity, Error, JobId, NodeAttributes, ObjectKind, ResultBuffer, TaskId,
    TaskPriority, TaskState, Timeout,
};

use crate::common::{eventually, node, node_with, Gate};

fn doubling_node(cores: usize) -> tasknode::Node {
    let node = node(cores);
    node.action_create(
        JobId(1),
        |ctx| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&ctx.args()[..8]);
            let doubled = u64::from_le_bytes(raw) * 2;
            ctx.result_mut().copy_from_slice(&doubled.to_le_bytes());
            Ok(())
        },
        &[],
        ActionAttributes::default(),
    )
    .unwrap();
    node
}

#[test]
fn test_many_tasks_with_distinct_args() {
    let node = doubling_node(4);
    let job = node.job_get(JobId(1)).unwrap();

    let mut started = Vec::new();
    for i in 0..100u64 {
        let result = ResultBuffer::with_len(8);
        let task = node
            .task(job)
            .args(&i.to_le_bytes())
            .result(result.clone())
            .start()
            .unwrap();
        started.push((i, task, result));
    }
    for (i, task, result) in started {
        node.task_wait(task, Timeout::Infinite).unwrap();
        let value = result.read(|bytes| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            u64::from_le_bytes(raw)
        });
        assert_eq!(value, i * 2);
    }
    node.finalize().unwrap();
}

#[test]
fn test_failing_body_reports_action_failed() {
    let node = node(2);
    node.action_create(
        JobId(2),
        |_| bail!("boom"),
        &[],
        ActionAttributes::default(),
    )
    .unwrap();
    node.action_create(
        JobId(3),
        |_| panic!("kaput"),
        &[],
        ActionAttributes::default(),
    )
    .unwrap();

    let task = node.task(node.job_get(JobId(2)).unwrap()).start().unwrap();
    match node.task_wait(task, Timeout::Infinite) {
        Err(Error::ActionFailed(message)) => assert!(message.contains("boom")),
        other => panic!("unexpected outcome {:?}", other),
    }

    let task = node.task(node.job_get(JobId(3)).unwrap()).start().unwrap();
    match node.task_wait(task, Timeout::Infinite) {
        Err(Error::ActionFailed(message)) => assert!(message.contains("kaput")),
        other => panic!("unexpected outcome {:?}", other),
    }

    // The worker survived the panic.
    let task = node.task(node.job_get(JobId(2)).unwrap()).start().unwrap();
    assert!(node.task_wait(task, Timeout::Infinite).is_err());
    node.finalize().unwrap();
}

#[test]
fn test_task_pool_exhaustion() {
    let node = node_with(NodeAttributes {
        max_tasks: 2,
        ..NodeAttributes::with_cores(2)
    });
    let memory = node.memory();
    let gate = Gate::new();
    {
        let gate = gate.clone();
        node.action_create(
            JobId(0),
            move |_| {
                gate.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let first = node.task(job).start().unwrap();
    let second = node.task(job).start().unwrap();

    let in_use = memory.bytes_in_use();
    assert_eq!(
        node.task(job).start().unwrap_err(),
        Error::Exhausted(ObjectKind::Task)
    );
    assert_eq!(memory.bytes_in_use(), in_use);

    gate.open();
    node.task_wait(first, Timeout::Infinite).unwrap();
    node.task_wait(second, Timeout::Infinite).unwrap();

    // Waiting released the slots.
    let third = node.task(job).start().unwrap();
    node.task_wait(third, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}

#[test]
fn test_argument_limit() {
    let node = node_with(NodeAttributes {
        max_argument_bytes: 16,
        ..NodeAttributes::with_cores(1)
    });
    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let job = node.job_get(JobId(0)).unwrap();

    let fits = node.task(job).args(&[0; 16]).start().unwrap();
    node.task_wait(fits, Timeout::Infinite).unwrap();
    assert!(matches!(
        node.task(job).args(&[0; 17]).start(),
        Err(Error::InvalidArgument(_))
    ));
    node.finalize().unwrap();
}

#[test]
fn test_unknown_jobs() {
    let node = node(1);
    assert!(node.job_get(JobId(100_000)).is_err());

    // A valid id with nothing registered resolves to no action.
    let job = node.job_get(JobId(5)).unwrap();
    assert_eq!(node.task(job).start().unwrap_err(), Error::InvalidJob(JobId(5)));
    node.finalize().unwrap();
}

#[test]
fn test_detached_tasks_release_themselves() {
    let node = node(2);
    let memory = node.memory();
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let runs = runs.clone();
        node.action_create(
            JobId(0),
            move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let baseline = memory.bytes_in_use();

    for _ in 0..20 {
        node.task(job).detached().start().unwrap();
    }
    assert!(eventually(Duration::from_secs(5), || {
        runs.load(Ordering::SeqCst) == 20 && memory.bytes_in_use() == baseline
    }));
    node.finalize().unwrap();
}

#[test]
fn test_detached_task_cannot_be_waited() {
    let node = node(1);
    let gate = Gate::new();
    {
        let gate = gate.clone();
        node.action_create(
            JobId(0),
            move |_| {
                gate.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let task = node.task(job).detached().start().unwrap();
    assert!(matches!(
        node.task_wait(task, Timeout::Infinite),
        Err(Error::InvalidArgument(_))
    ));
    gate.open();
    node.finalize().unwrap();
}

#[test]
fn test_wait_timeout_and_state() {
    let node = node(1);
    let gate = Gate::new();
    {
        let gate = gate.clone();
        node.action_create(
            JobId(0),
            move |_| {
                gate.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let task = node.task(job).id(TaskId(77)).start().unwrap();

    assert_eq!(node.task_wait(task, Timeout::Immediate), Err(Error::Timeout));
    assert_eq!(node.task_wait(task, Timeout::millis(20)), Err(Error::Timeout));
    let state = node.task_state(task).unwrap();
    assert!(matches!(state, TaskState::Scheduled | TaskState::Running));

    gate.open();
    node.task_wait(task, Timeout::Infinite).unwrap();
    // Waiting released the handle.
    assert_eq!(
        node.task_state(task),
        Err(Error::InvalidHandle(ObjectKind::Task))
    );
    node.finalize().unwrap();
}

#[test]
fn test_action_affinity_selects_core() {
    let node = node(4);
    let cores = Arc::new(Mutex::new(HashSet::new()));
    {
        let cores = cores.clone();
        node.action_create(
            JobId(0),
            move |ctx| {
                cores.lock().insert(ctx.core_num());
                Ok(())
            },
            &[],
            ActionAttributes {
                affinity: Affinity::single(1),
            },
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let tasks: Vec<_> = (0..16).map(|_| node.task(job).start().unwrap()).collect();
    for task in tasks {
        node.task_wait(task, Timeout::Infinite).unwrap();
    }
    assert_eq!(*cores.lock(), HashSet::from([1]));

    // No action of the job may run on core 2.
    assert_eq!(
        node.task(job).affinity(Affinity::single(2)).start().unwrap_err(),
        Error::InvalidJob(JobId(0))
    );
    node.finalize().unwrap();
}

#[test]
fn test_priority_order_on_one_core() {
    let node = node(1);
    let gate = Gate::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let gate = gate.clone();
        node.action_create(
            JobId(0),
            move |_| {
                gate.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
        let order = order.clone();
        node.action_create(
            JobId(1),
            move |ctx| {
                order.lock().push(ctx.args()[0]);
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }

    let blocker = node.task(node.job_get(JobId(0)).unwrap()).start().unwrap();
    let job = node.job_get(JobId(1)).unwrap();
    let low = node.task(job).args(&[0]).priority(TaskPriority::Low).start().unwrap();
    let normal = node.task(job).args(&[1]).start().unwrap();
    let critical = node
        .task(job)
        .args(&[2])
        .priority(TaskPriority::Critical)
        .start()
        .unwrap();

    gate.open();
    for task in [blocker, low, normal, critical] {
        node.task_wait(task, Timeout::Infinite).unwrap();
    }
    assert_eq!(*order.lock(), vec![2, 1, 0]);
    node.finalize().unwrap();
}

#[test]
fn test_node_local_data_reaches_body() {
    let node = node(2);
    node.action_create(
        JobId(4),
        |ctx| {
            let local = ctx.node_local_data().to_vec();
            ctx.result_mut().copy_from_slice(&local);
            Ok(())
        },
        b"local",
        ActionAttributes::default(),
    )
    .unwrap();
    let result = ResultBuffer::with_len(5);
    let task = node
        .task(node.job_get(JobId(4)).unwrap())
        .result(result.clone())
        .start()
        .unwrap();
    node.task_wait(task, Timeout::Infinite).unwrap();
    assert_eq!(result.to_vec(), b"local".to_vec());
    node.finalize().unwrap();
}
