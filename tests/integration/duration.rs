//! Duration conversions and timeouts against a live node

use std::time::Instant;

use tasknode::{
    ActionAttributes, Duration, DurationError, Error, JobId, Milliseconds, Nanoseconds, Seconds,
    Tick, Timeout,
};

use crate::common::{node, Gate};

#[test]
fn test_nanoseconds_to_seconds() {
    let d = Duration::<Nanoseconds>::try_new(1_000_000_000).unwrap();
    assert_eq!(d.as_ticks::<Seconds>().unwrap(), 1);
    assert_eq!(d.convert::<Milliseconds>().unwrap().count(), 1_000);
}

#[test]
fn test_max_seconds_in_milliseconds() {
    let max = Duration::<Seconds>::max();
    assert_eq!(max.as_ticks::<Milliseconds>().unwrap(), 604_800_000);
    assert_eq!(Seconds::max(), 604_800);
}

#[test]
fn test_out_of_range() {
    assert!(matches!(
        Duration::<Seconds>::try_new(Seconds::max() + 1),
        Err(DurationError::Overflow { .. })
    ));
    assert!(matches!(
        Duration::<Nanoseconds>::try_new(1),
        Err(DurationError::Underflow { .. })
    ));
}

#[test]
fn test_duration_as_wait_timeout() {
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
    let task = node.task(node.job_get(JobId(0)).unwrap()).start().unwrap();

    let timeout = Timeout::from(Duration::<Milliseconds>::new(30));
    let begun = Instant::now();
    assert_eq!(node.task_wait(task, timeout), Err(Error::Timeout));
    assert!(begun.elapsed() >= std::time::Duration::from_millis(30));

    // A zero duration only polls.
    assert_eq!(
        node.task_wait(task, Duration::<Seconds>::zero().into()),
        Err(Error::Timeout)
    );

    gate.open();
    node.task_wait(task, Timeout::Infinite).unwrap();
    node.finalize().unwrap();
}

#[test]
fn test_longest_std_duration_waits_for_completion() {
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
    let task = node.task(node.job_get(JobId(0)).unwrap()).start().unwrap();

    let opener = gate.open_after(std::time::Duration::from_millis(20));
    assert_eq!(
        node.task_wait(task, Timeout::from(std::time::Duration::MAX)),
        Ok(())
    );
    opener.join().unwrap();
    node.finalize().unwrap();
}
