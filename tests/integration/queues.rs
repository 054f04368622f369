//! Ordered queues

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tasknode::{
    ActionAttributes, Error, JobId, NodeAttributes, ObjectKind, QueueAttributes, Timeout,
};

use crate::common::{node, node_with, Gate};

#[test]
fn test_queue_runs_in_order_without_overlap() {
    let node = node(4);
    let order = Arc::new(Mutex::new(Vec::new()));
    let inside = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    {
        let order = order.clone();
        let inside = inside.clone();
        let overlapped = overlapped.clone();
        node.action_create(
            JobId(0),
            move |ctx| {
                if inside.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                order.lock().push(ctx.args()[0]);
                thread::sleep(Duration::from_micros(200));
                inside.store(false, Ordering::SeqCst);
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node.queue_create(QueueAttributes::default()).unwrap();

    let tasks: Vec<_> = (0..50u8)
        .map(|i| node.task(job).args(&[i]).queue(queue).start().unwrap())
        .collect();
    for task in tasks {
        node.task_wait(task, Timeout::Infinite).unwrap();
    }

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(*order.lock(), (0..50u8).collect::<Vec<_>>());
    node.queue_delete(queue, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}

#[test]
fn test_bound_queue_runs_on_its_core() {
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
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node
        .queue_create(QueueAttributes {
            core: Some(2),
            ..QueueAttributes::default()
        })
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| node.task(job).queue(queue).start().unwrap())
        .collect();
    for task in tasks {
        node.task_wait(task, Timeout::Infinite).unwrap();
    }
    assert_eq!(*cores.lock(), HashSet::from([2]));

    assert!(matches!(
        node.queue_create(QueueAttributes {
            core: Some(4),
            ..QueueAttributes::default()
        }),
        Err(Error::InvalidArgument(_))
    ));
    node.finalize().unwrap();
}

#[test]
fn test_disabled_queue_rejects_tasks() {
    let node = node(2);
    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node.queue_create(QueueAttributes::default()).unwrap();

    node.queue_disable(queue, Timeout::Immediate).unwrap();
    assert_eq!(
        node.task(job).queue(queue).start().unwrap_err(),
        Error::QueueDisabled
    );

    node.queue_enable(queue).unwrap();
    let task = node.task(job).queue(queue).start().unwrap();
    node.task_wait(task, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}

#[test]
fn test_disable_cancels_pending_unless_retained() {
    let node = node(2);
    let started = Gate::new();
    let release = Gate::new();
    {
        let started = started.clone();
        let release = release.clone();
        node.action_create(
            JobId(0),
            move |_| {
                started.open();
                release.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node
        .queue_create(QueueAttributes {
            core: None,
            retain: false,
        })
        .unwrap();

    let head = node.task(job).queue(queue).start().unwrap();
    let rest: Vec<_> = (0..3)
        .map(|_| node.task(job).queue(queue).start().unwrap())
        .collect();
    started.wait();

    // The head is still running, so the queue cannot go idle yet.
    assert_eq!(
        node.queue_disable(queue, Timeout::millis(10)),
        Err(Error::Timeout)
    );
    for task in rest {
        assert_eq!(node.task_wait(task, Timeout::Infinite), Err(Error::Cancelled));
    }

    release.open();
    node.task_wait(head, Timeout::Infinite).unwrap();
    node.queue_disable(queue, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}

#[test]
fn test_retained_tasks_run_after_disable() {
    let node = node(2);
    let release = Gate::new();
    {
        let release = release.clone();
        node.action_create(
            JobId(0),
            move |_| {
                release.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node.queue_create(QueueAttributes::default()).unwrap();
    let tasks: Vec<_> = (0..3)
        .map(|_| node.task(job).queue(queue).start().unwrap())
        .collect();

    let opener = release.open_after(Duration::from_millis(20));
    node.queue_disable(queue, Timeout::Infinite).unwrap();
    opener.join().unwrap();
    for task in tasks {
        node.task_wait(task, Timeout::Infinite).unwrap();
    }
    node.finalize().unwrap();
}

#[test]
fn test_delete_queue() {
    let node = node(2);
    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node.queue_create(QueueAttributes::default()).unwrap();
    let task = node.task(job).queue(queue).start().unwrap();
    node.task_wait(task, Timeout::Infinite).unwrap();

    node.queue_delete(queue, Timeout::Infinite).unwrap();
    assert_eq!(
        node.task(job).queue(queue).start().unwrap_err(),
        Error::InvalidHandle(ObjectKind::Queue)
    );
    assert_eq!(
        node.queue_enable(queue),
        Err(Error::InvalidHandle(ObjectKind::Queue))
    );
    node.finalize().unwrap();
}

#[test]
fn test_cancelled_members_free_queue_room() {
    let node = node_with(NodeAttributes {
        queue_limit: 2,
        ..NodeAttributes::with_cores(2)
    });
    let started = Gate::new();
    let release = Gate::new();
    {
        let started = started.clone();
        let release = release.clone();
        node.action_create(
            JobId(0),
            move |ctx| {
                if ctx.args()[0] == 0 {
                    started.open();
                    release.wait();
                }
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(0)).unwrap();
    let queue = node.queue_create(QueueAttributes::default()).unwrap();

    let head = node.task(job).args(&[0]).queue(queue).start().unwrap();
    started.wait();

    // Each member is cancelled behind the running head; none may keep its
    // place in the queue.
    for _ in 0..8 {
        let member = node.task(job).args(&[1]).queue(queue).start().unwrap();
        node.task_cancel(member).unwrap();
        assert_eq!(node.task_wait(member, Timeout::Infinite), Err(Error::Cancelled));
    }

    let first = node.task(job).args(&[1]).queue(queue).start().unwrap();
    let second = node.task(job).args(&[1]).queue(queue).start().unwrap();
    assert_eq!(
        node.task(job).args(&[1]).queue(queue).start(),
        Err(Error::Exhausted(ObjectKind::Queue))
    );

    release.open();
    node.task_wait(head, Timeout::Infinite).unwrap();
    node.task_wait(first, Timeout::Infinite).unwrap();
    node.task_wait(second, Timeout::Infinite).unwrap();
    node.queue_delete(queue, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}
