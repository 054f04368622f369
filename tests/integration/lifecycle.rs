//! Node initialization and finalization

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tasknode::runtime::node::{DomainId, NodeId};
use tasknode::{
    ActionAttributes, ControlPlugin, Error, JobId, Node, NodeAttributes, ResultBuffer, Status,
    Timeout,
};

use crate::common::{node, Gate};

#[test]
fn test_finalize_frees_every_byte() {
    let node = node(4);
    let memory = node.memory();
    assert!(memory.bytes_allocated() > 0);
    assert_eq!(memory.bytes_allocated(), node.info().bytes_reserved);

    node.action_create(
        JobId(3),
        |ctx| {
            let value = ctx.args()[0];
            ctx.result_mut()[0] = value + 1;
            Ok(())
        },
        &[],
        ActionAttributes::default(),
    )
    .unwrap();
    let job = node.job_get(JobId(3)).unwrap();
    for i in 0..32u8 {
        let result = ResultBuffer::with_len(1);
        let task = node.task(job).args(&[i]).result(result.clone()).start().unwrap();
        node.task_wait(task, Timeout::Infinite).unwrap();
        assert_eq!(result.to_vec(), vec![i + 1]);
    }

    node.finalize().unwrap();
    assert_eq!(memory.bytes_allocated(), 0);
    assert_eq!(memory.bytes_in_use(), 0);
}

#[test]
fn test_drop_without_finalize() {
    let node = node(2);
    let memory = node.memory();
    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let job = node.job_get(JobId(0)).unwrap();
    // Never waited on: the slot is still held when the node goes away.
    node.task(job).start().unwrap();

    drop(node);
    assert_eq!(memory.bytes_allocated(), 0);
}

#[test]
fn test_node_info() {
    let attributes = NodeAttributes::with_cores(3);
    let node = Node::initialize(DomainId(7), NodeId(9), attributes.clone()).unwrap();
    let info = node.info();

    assert_eq!(info.version, tasknode::VERSION);
    assert_eq!(info.domain_id, DomainId(7));
    assert_eq!(info.node_id, NodeId(9));
    assert_eq!(info.core_count, 3);
    assert!(info.hardware_concurrency >= 1);
    assert_eq!(info.attributes, attributes);
    node.finalize().unwrap();
}

#[test]
fn test_invalid_attributes() {
    let err = Node::initialize(DomainId(0), NodeId(0), NodeAttributes::with_cores(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(err.status(), Status::InvalidArgument);

    let attributes = NodeAttributes {
        max_tasks: 0,
        ..NodeAttributes::with_cores(1)
    };
    assert!(Node::initialize(DomainId(0), NodeId(0), attributes).is_err());
}

#[test]
fn test_finalize_cancels_pending_tasks() {
    let node = node(1);
    let memory = node.memory();
    let started = Gate::new();
    let release = Gate::new();
    let runs = Arc::new(AtomicUsize::new(0));

    {
        let started = started.clone();
        let release = release.clone();
        let runs = runs.clone();
        node.action_create(
            JobId(1),
            move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
                started.open();
                release.wait();
                Ok(())
            },
            &[],
            ActionAttributes::default(),
        )
        .unwrap();
    }
    let job = node.job_get(JobId(1)).unwrap();
    node.task(job).start().unwrap();
    node.task(job).start().unwrap();
    node.task(job).start().unwrap();

    started.wait();
    let opener = release.open_after(Duration::from_millis(50));
    node.finalize().unwrap();
    opener.join().unwrap();

    // The worker stopped after the running body; the rest never ran.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(memory.bytes_allocated(), 0);
}

#[test]
fn test_stats_count_tasks() {
    let node = node(1);
    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let job = node.job_get(JobId(0)).unwrap();
    let task = node.task(job).start().unwrap();
    node.task_wait(task, Timeout::Infinite).unwrap();

    let stats = node.stats();
    assert_eq!(stats.tasks_scheduled.load(Ordering::SeqCst), 1);
    assert_eq!(stats.tasks_completed.load(Ordering::SeqCst), 1);
    node.finalize().unwrap();
}

/// Records the hooks it sees in a log shared with the test.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    refuse: bool,
}

impl Recorder {
    fn control(
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        refuse: bool,
    ) -> Arc<dyn ControlPlugin> {
        Arc::new(Self {
            name,
            log: log.clone(),
            refuse,
        })
    }
}

impl ControlPlugin for Recorder {
    fn initialize(
        &self,
        domain_id: DomainId,
        node_id: NodeId,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(!self.refuse, "{} unavailable", self.name);
        self.log
            .lock()
            .push(format!("init {} {}/{}", self.name, domain_id.0, node_id.0));
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<()> {
        self.log.lock().push(format!("finalize {}", self.name));
        Ok(())
    }
}

#[test]
fn test_control_plugins_follow_the_node() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let controls = vec![
        Recorder::control("dsp", &log, false),
        Recorder::control("net", &log, false),
    ];
    let node =
        Node::initialize_with(DomainId(2), NodeId(5), NodeAttributes::with_cores(1), controls)
            .unwrap();
    assert_eq!(*log.lock(), vec!["init dsp 2/5", "init net 2/5"]);

    node.action_create(JobId(0), |_| Ok(()), &[], ActionAttributes::default())
        .unwrap();
    let task = node.task(node.job_get(JobId(0)).unwrap()).start().unwrap();
    node.task_wait(task, Timeout::Infinite).unwrap();

    node.finalize().unwrap();
    assert_eq!(
        *log.lock(),
        vec!["init dsp 2/5", "init net 2/5", "finalize net", "finalize dsp"]
    );
}

#[test]
fn test_failed_control_plugin_unwinds_initialize() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let controls = vec![
        Recorder::control("dsp", &log, false),
        Recorder::control("net", &log, true),
        Recorder::control("gpu", &log, false),
    ];
    let err = Node::initialize_with(DomainId(0), NodeId(0), NodeAttributes::with_cores(1), controls)
        .unwrap_err();

    assert_eq!(err.status(), Status::Unknown);
    assert!(err.to_string().contains("net unavailable"));
    assert_eq!(*log.lock(), vec!["init dsp 0/0", "finalize dsp"]);
}
