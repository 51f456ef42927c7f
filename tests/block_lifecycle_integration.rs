//! Integration tests for block lifecycles
//!
//! These tests drive the execution state machine from the control thread:
//! - pause, single step, unpause, stop and finish
//! - sequential groups sharing one worker thread
//! - failing and panicking blocks

mod common;

use blockflow::block::{
    IterationStats, MAX_ITERATIONS_PROPERTY, STATS_ENABLED_PROPERTY, STATS_PROPERTY,
};
use blockflow::blocks::ScaleBlock;
use blockflow::{
    BlockError, BlockEvent, BlockFlowError, BlockHandle, BlockStatus, ChangeEvent,
    LinkDiscipline, PropertyContainer, RuntimeContext,
};
use common::builders::{counter, Faulty, ThreadRecorder};
use common::{test_timeout, wait_until};
use serial_test::serial;
use std::thread;
use std::time::Duration;

fn settle() {
    thread::sleep(Duration::from_millis(30));
}

#[test]
#[serial]
fn test_pause_step_unpause() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", -1);
    block.unit().set_minimum_delay(Duration::from_millis(1));
    let events = block.subscribe_events();

    block.start().unwrap();
    assert!(wait_until(|| block.iteration() >= 3));

    block.pause().unwrap();
    assert_eq!(block.status(), BlockStatus::Paused);
    settle();
    let paused_at = block.iteration();
    settle();
    assert_eq!(block.iteration(), paused_at, "a paused block must not iterate");

    block.step().unwrap();
    assert!(wait_until(|| block.status() == BlockStatus::Paused
        && block.iteration() == paused_at + 1));
    settle();
    assert_eq!(block.iteration(), paused_at + 1);
    assert_eq!(block.property_value::<i32>("x").unwrap(), (paused_at + 1) as i32);

    block.unpause().unwrap();
    assert!(wait_until(|| block.iteration() >= paused_at + 4));

    block.finish();
    assert!(block.wait_timeout(test_timeout()));

    let statuses: Vec<BlockStatus> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            BlockEvent::StatusChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            BlockStatus::Running,
            BlockStatus::Paused,
            BlockStatus::RunningOneStep,
            BlockStatus::Paused,
            BlockStatus::Running,
            BlockStatus::Finished,
        ]
    );
}

#[test]
#[serial]
fn test_step_requires_pause() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", -1);
    block.unit().set_minimum_delay(Duration::from_millis(1));
    block.start().unwrap();

    assert!(matches!(block.step(), Err(BlockFlowError::InvalidOperation(_))));
    assert!(matches!(block.unpause(), Err(BlockFlowError::InvalidOperation(_))));
    assert!(matches!(block.start(), Err(BlockFlowError::InvalidOperation(_))));

    block.finish();
    assert!(block.wait_timeout(test_timeout()));
}

#[test]
#[serial]
fn test_quit_while_paused() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", -1);
    block.start().unwrap();
    block.pause().unwrap();
    settle();

    block.finish();
    assert!(block.wait_timeout(test_timeout()), "finish must wake a paused block");
    assert_eq!(block.status(), BlockStatus::Finished);
    assert!(block.last_error().is_none());
}

#[test]
#[serial]
fn test_stop_halts_iteration() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", -1);
    block.unit().set_minimum_delay(Duration::from_millis(1));
    block.start().unwrap();
    assert!(wait_until(|| block.iteration() >= 2));

    block.stop().unwrap();
    settle();
    let stopped_at = block.iteration();
    settle();
    assert_eq!(block.iteration(), stopped_at);
    assert_eq!(block.status(), BlockStatus::Stopped);

    block.finish();
    assert!(block.wait_timeout(test_timeout()));
}

#[test]
#[serial]
fn test_sequential_group_shares_one_thread() {
    let ctx = RuntimeContext::standalone();
    let master = counter(&ctx, "master", 10);
    let recorder = ThreadRecorder::default();
    let threads = recorder.threads.clone();
    let slave = BlockHandle::attach(PropertyContainer::new(&ctx, "slave"), recorder).unwrap();
    master
        .link_property("x", &slave, "in", LinkDiscipline::Sequential)
        .unwrap();

    assert!(matches!(slave.start(), Err(BlockFlowError::InvalidOperation(_))));
    assert!(slave.wait_timeout(Duration::from_millis(1)), "slaves own no thread");

    master.start().unwrap();
    assert!(matches!(slave.pause(), Err(BlockFlowError::InvalidOperation(_))));
    assert!(master.wait_timeout(test_timeout()));

    let threads = threads.lock().unwrap().clone();
    assert_eq!(threads.len(), 10);
    assert!(threads.iter().all(|t| t == "block-master"));
    assert_eq!(slave.status(), BlockStatus::Finished);
}

#[test]
#[serial]
fn test_panicking_block_finishes_with_error() {
    let ctx = RuntimeContext::standalone();
    let block = BlockHandle::attach(
        PropertyContainer::new(&ctx, "faulty"),
        Faulty {
            fail_at: 3,
            panic: true,
        },
    )
    .unwrap();
    let events = block.subscribe_events();

    block.start().unwrap();
    assert!(block.wait_timeout(test_timeout()));

    assert_eq!(block.status(), BlockStatus::Finished);
    assert_eq!(block.iteration(), 3);
    assert_eq!(
        block.last_error(),
        Some(BlockError::Panicked("sensor disconnected".to_string()))
    );
    let finished = events
        .drain()
        .into_iter()
        .find_map(|e| match e {
            BlockEvent::Finished { error, .. } => Some(error),
            _ => None,
        })
        .expect("a Finished event");
    assert!(finished.is_some_and(|msg| msg.contains("sensor disconnected")));
}

#[test]
#[serial]
fn test_failing_master_ends_its_group() {
    let ctx = RuntimeContext::standalone();
    let master = BlockHandle::attach(
        PropertyContainer::new(&ctx, "master"),
        Faulty {
            fail_at: 2,
            panic: false,
        },
    )
    .unwrap();
    let recorder = ThreadRecorder::default();
    let threads = recorder.threads.clone();
    let slave = BlockHandle::attach(PropertyContainer::new(&ctx, "slave"), recorder).unwrap();
    master
        .link_property("out", &slave, "in", LinkDiscipline::Sequential)
        .unwrap();

    master.start().unwrap();
    assert!(master.wait_timeout(test_timeout()));

    assert_eq!(
        master.last_error(),
        Some(BlockError::failed("sensor disconnected"))
    );
    assert_eq!(slave.status(), BlockStatus::Finished);
    assert!(slave.last_error().is_none());
    assert_eq!(threads.lock().unwrap().len(), 2);
}

#[test]
#[serial]
fn test_trigger_reaches_block_thread() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", -1);
    block.unit().set_minimum_delay(Duration::from_millis(5));
    block.unit().add_trigger("reset");
    block.start().unwrap();
    assert!(wait_until(|| block.property_value::<i32>("x").unwrap() >= 20));

    block.unit().send_trigger("reset").unwrap();
    assert!(wait_until(|| block.property_value::<i32>("x").unwrap() < 20));

    block.finish();
    assert!(block.wait_timeout(test_timeout()));
}

#[test]
#[serial]
fn test_iteration_stats_recorded() {
    let ctx = RuntimeContext::standalone();
    let block = BlockHandle::attach(PropertyContainer::new(&ctx, "scale"), ScaleBlock::new(2.0)).unwrap();
    block
        .set_property_value(MAX_ITERATIONS_PROPERTY, 5)
        .unwrap();

    block.start().unwrap();
    assert!(block.wait_timeout(test_timeout()));

    let stats = block.unit().stats();
    assert_eq!(stats.iterations, 5);
    assert!(stats.max_ms >= stats.mean_ms);
    assert_eq!(stats.flags.len(), 1);
    assert_eq!(stats.flags[0].name, "read");
    assert_eq!(stats.flags[0].samples, 5);
    assert!(block.property_value::<f64>(blockflow::block::ITERATION_TIME_PROPERTY).unwrap() >= 0.0);
}

#[test]
#[serial]
fn test_stats_published_as_property() {
    let ctx = RuntimeContext::standalone();
    let block = BlockHandle::attach(PropertyContainer::new(&ctx, "scale"), ScaleBlock::new(2.0)).unwrap();
    block.set_property_value(MAX_ITERATIONS_PROPERTY, 4).unwrap();
    let changes = block.subscribe();

    block.start().unwrap();
    assert!(block.wait_timeout(test_timeout()));

    let published = block.property_value::<IterationStats>(STATS_PROPERTY).unwrap();
    assert_eq!(published.iterations, 4);
    assert_eq!(published, block.unit().stats());
    let updates = changes
        .drain()
        .into_iter()
        .filter(|e| {
            matches!(e, ChangeEvent::PropertyValueChanged { property, .. } if property == STATS_PROPERTY)
        })
        .count();
    assert_eq!(updates, 4);
}

#[test]
#[serial]
fn test_stats_can_be_disabled() {
    let ctx = RuntimeContext::standalone();
    let block = counter(&ctx, "counter", 3);
    block.set_property_value(STATS_ENABLED_PROPERTY, false).unwrap();

    block.start().unwrap();
    assert!(block.wait_timeout(test_timeout()));

    assert_eq!(block.iteration(), 3);
    assert_eq!(block.unit().stats().iterations, 0);
    assert_eq!(
        block.property_value::<IterationStats>(STATS_PROPERTY).unwrap(),
        IterationStats::default()
    );
}
