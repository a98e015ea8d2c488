// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lh_core::{to_payload, FakeClock};
use std::time::Duration;

fn backend() -> (MemoryBackend<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let options = BackendOptions::default()
        .with_block_timeout(Duration::from_millis(10))
        .with_sticky_timeout(Duration::from_secs(30))
        .with_workflow_lock_timeout(Duration::from_secs(60));
    (MemoryBackend::with_clock(options, clock.clone()), clock)
}

fn started_event(timestamp: u64) -> Event {
    Event::new(
        timestamp,
        EventKind::WorkflowExecutionStarted {
            name: "wf".into(),
            inputs: vec![],
            metadata: Metadata::default(),
        },
    )
}

fn signal_event(timestamp: u64, name: &str) -> Event {
    Event::new(
        timestamp,
        EventKind::SignalReceived { name: name.into(), arg: to_payload(&"x").unwrap() },
    )
}

fn instance(id: &str) -> WorkflowInstance {
    WorkflowInstance::new(InstanceId::from_string(id))
}

/// Executed events for a task must carry dense sequence ids; tests build
/// them the way the executor does.
fn sequenced(task: &WorkflowTask, mut events: Vec<Event>) -> Vec<Event> {
    let mut sequence_id = task.last_sequence_id;
    for event in events.iter_mut() {
        sequence_id += 1;
        event.sequence_id = sequence_id;
    }
    events
}

#[tokio::test]
async fn create_then_dequeue_returns_started_event() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(task.instance, wf);
    assert_eq!(task.state, InstanceState::Active);
    assert_eq!(task.last_sequence_id, 0);
    assert!(task.history.is_empty());
    assert_eq!(task.new_events.len(), 1);
    assert_eq!(task.new_events[0].type_name(), "WorkflowExecutionStarted");
    assert_eq!(task.custom_data, 1);
}

#[tokio::test]
async fn create_is_idempotent_for_same_execution() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    // A different execution of the same instance id is a conflict.
    let other = instance("order-1");
    let error = backend
        .create_workflow_instance(other, Metadata::default(), started_event(1_000))
        .await
        .unwrap_err();
    assert!(matches!(error, BackendError::InstanceAlreadyExists(_)));
}

#[tokio::test]
async fn enqueue_is_guarded_by_the_queued_set() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();
    // Two signals while already queued must not create extra queue entries.
    backend.signal_workflow_instance(&wf.instance_id, signal_event(1_100, "a")).await.unwrap();
    backend.signal_workflow_instance(&wf.instance_id, signal_event(1_200, "b")).await.unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(task.new_events.len(), 3);

    // No second queue entry: the instance is leased and nothing is queued.
    let other = WorkerId::new();
    assert!(backend.get_workflow_task(&other).await.unwrap().is_none());
}

#[tokio::test]
async fn lease_blocks_second_worker_until_expiry() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let first = WorkerId::new();
    let second = WorkerId::new();
    let task = backend.get_workflow_task(&first).await.unwrap().unwrap();
    assert!(backend.get_workflow_task(&second).await.unwrap().is_none());

    // Lease expires without a checkpoint; the instance is claimable again
    // and the abandoned worker's commit is refused.
    clock.advance(Duration::from_secs(61));
    let retaken = backend.get_workflow_task(&second).await.unwrap().unwrap();
    assert_eq!(retaken.instance, wf);
    assert_eq!(retaken.new_events, task.new_events);

    let executed = sequenced(&task, vec![started_event(1_000)]);
    let error = backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(error, BackendError::LeaseLost(_)));
}

#[tokio::test]
async fn extend_workflow_task_pushes_lease_forward() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    // Heartbeats keep the lease alive across the nominal expiry.
    clock.advance(Duration::from_secs(50));
    backend.extend_workflow_task(&task.id).await.unwrap();
    clock.advance(Duration::from_secs(50));
    backend.extend_workflow_task(&task.id).await.unwrap();

    let other = WorkerId::new();
    assert!(backend.get_workflow_task(&other).await.unwrap().is_none());

    // Once expired, extension fails.
    clock.advance(Duration::from_secs(61));
    assert!(backend.extend_workflow_task(&task.id).await.is_err());
}

#[tokio::test]
async fn complete_appends_history_trims_pending_and_requeues_leftovers() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    // A signal arrives while the turn is executing.
    backend.signal_workflow_instance(&wf.instance_id, signal_event(1_500, "late")).await.unwrap();

    let executed = sequenced(&task, vec![started_event(1_000)]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    let history = backend.get_workflow_instance_history(&wf.instance_id, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sequence_id, 1);

    // The consumed prefix is gone, the late signal was requeued exactly
    // once and is delivered on the next task.
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(task.last_sequence_id, 1);
    assert_eq!(task.new_events.len(), 1);
    assert_eq!(task.new_events[0].type_name(), "SignalReceived");
}

#[tokio::test]
async fn sequence_gaps_are_rejected() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    let mut event = started_event(1_000);
    event.sequence_id = 5;
    let error = backend
        .complete_workflow_task(&task, InstanceState::Active, vec![event], vec![], vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(error, BackendError::SequenceMismatch { expected: 1, got: 5, .. }));
}

#[tokio::test]
async fn future_events_stay_invisible_until_due() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    let now = clock.epoch_ms();
    let due_at = now + 5_000;
    let scheduled = Event::with_schedule_id(now, 1, EventKind::TimerScheduled { at: due_at });
    let fired = Event::future(now, 1, EventKind::TimerFired { at: due_at }, due_at);
    let executed = sequenced(&task, vec![started_event(1_000), scheduled]);
    backend
        .complete_workflow_task(
            &task,
            InstanceState::Active,
            executed,
            vec![],
            vec![fired],
            vec![],
        )
        .await
        .unwrap();

    // Not yet due: nothing to dequeue.
    assert!(backend.get_workflow_task(&worker).await.unwrap().is_none());

    clock.advance(Duration::from_secs(5));
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(task.new_events.len(), 1);
    assert_eq!(task.new_events[0].type_name(), "TimerFired");
    assert_eq!(task.new_events[0].visible_at, None);
    assert_eq!(task.new_events[0].schedule_event_id, 1);
}

#[tokio::test]
async fn timer_canceled_event_drops_the_future_entry() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    let now = clock.epoch_ms();
    let due_at = now + 5_000;
    let scheduled = Event::with_schedule_id(now, 1, EventKind::TimerScheduled { at: due_at });
    let fired = Event::future(now, 1, EventKind::TimerFired { at: due_at }, due_at);
    let executed = sequenced(&task, vec![started_event(1_000), scheduled]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![fired], vec![])
        .await
        .unwrap();

    // Next turn cancels the timer before it is due.
    backend.signal_workflow_instance(&wf.instance_id, signal_event(2_000, "stop")).await.unwrap();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let canceled = Event::with_schedule_id(2_000, 1, EventKind::TimerCanceled {});
    let executed = sequenced(&task, vec![task.new_events[0].clone(), canceled]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    // Past the would-be due time, nothing fires.
    clock.advance(Duration::from_secs(10));
    assert!(backend.get_workflow_task(&worker).await.unwrap().is_none());
}

#[tokio::test]
async fn activity_round_trip() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    let scheduled = Event::with_schedule_id(
        1_000,
        1,
        EventKind::ActivityScheduled { name: "add".into(), inputs: vec![] },
    );
    let executed = sequenced(&task, vec![started_event(1_000), scheduled.clone()]);
    let activity_events = vec![scheduled.clone()];
    backend
        .complete_workflow_task(
            &task,
            InstanceState::Active,
            executed,
            activity_events,
            vec![],
            vec![],
        )
        .await
        .unwrap();

    let activity = backend.get_activity_task().await.unwrap().unwrap();
    assert_eq!(activity.id, scheduled.id);
    assert_eq!(activity.attempt, 1);
    assert_eq!(activity.instance, wf);

    let result = Event::with_schedule_id(
        2_000,
        1,
        EventKind::ActivityCompleted { result: to_payload(&47i64).unwrap() },
    );
    backend.complete_activity_task(&wf, &activity.id, result).await.unwrap();

    // The result landed in the origin instance's pending stream.
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(task.new_events.len(), 1);
    assert_eq!(task.new_events[0].type_name(), "ActivityCompleted");

    // Completing again reports the task gone.
    let result = Event::with_schedule_id(
        2_000,
        1,
        EventKind::ActivityCompleted { result: to_payload(&47i64).unwrap() },
    );
    let error = backend.complete_activity_task(&wf, &activity.id, result).await.unwrap_err();
    assert!(matches!(error, BackendError::ActivityNotFound(_)));
}

#[tokio::test]
async fn expired_activity_lease_is_redelivered_with_bumped_attempt() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let scheduled = Event::with_schedule_id(
        1_000,
        1,
        EventKind::ActivityScheduled { name: "add".into(), inputs: vec![] },
    );
    let executed = sequenced(&task, vec![started_event(1_000), scheduled.clone()]);
    backend
        .complete_workflow_task(
            &task,
            InstanceState::Active,
            executed,
            vec![scheduled],
            vec![],
            vec![],
        )
        .await
        .unwrap();

    let first = backend.get_activity_task().await.unwrap().unwrap();
    assert_eq!(first.attempt, 1);
    assert!(backend.get_activity_task().await.unwrap().is_none());

    clock.advance(Duration::from_secs(121));
    let second = backend.get_activity_task().await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt, 2);
}

#[tokio::test]
async fn signals_to_unknown_instances_are_a_distinct_error() {
    let (backend, _clock) = backend();
    let error = backend
        .signal_workflow_instance(&InstanceId::from_string("ghost"), signal_event(1_000, "s"))
        .await
        .unwrap_err();
    assert!(matches!(error, BackendError::InstanceNotFound(_)));
}

#[tokio::test]
async fn workflow_started_event_bootstraps_the_child() {
    let (backend, _clock) = backend();
    let parent = instance("parent");
    backend
        .create_workflow_instance(parent.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();

    let child = WorkflowInstance::sub_workflow(
        InstanceId::from_string("child"),
        parent.instance_id,
        2,
    );
    let bootstrap = WorkflowEvent { instance: child.clone(), event: started_event(1_000) };
    let executed = sequenced(&task, vec![started_event(1_000)]);
    backend
        .complete_workflow_task(
            &task,
            InstanceState::Active,
            executed,
            vec![],
            vec![],
            vec![bootstrap],
        )
        .await
        .unwrap();

    let state = backend.get_workflow_instance_state(&child.instance_id).await.unwrap();
    assert_eq!(state, InstanceState::Active);

    // The child is queued with its started event.
    let child_task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(child_task.instance.instance_id, "child");
    assert_eq!(child_task.instance.parent.as_ref().unwrap().schedule_event_id, 2);
}

#[tokio::test]
async fn workflow_signal_delivery_reports_back_to_the_sender() {
    let (backend, _clock) = backend();
    let sender = instance("sender");
    let receiver = instance("receiver");
    backend
        .create_workflow_instance(sender.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();
    backend
        .create_workflow_instance(receiver.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    // Drain the receiver's bootstrap task so only the sender is queued.
    let receiver_task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let sender_task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let (sender_task, receiver_task) = if sender_task.instance.instance_id == "sender" {
        (sender_task, receiver_task)
    } else {
        (receiver_task, sender_task)
    };

    let scheduled = Event::with_schedule_id(
        1_000,
        1,
        EventKind::SignalWorkflowScheduled {
            instance_id: receiver.instance_id,
            name: "ping".into(),
            arg: to_payload(&"hello").unwrap(),
        },
    );
    let executed = sequenced(&sender_task, vec![started_event(1_000), scheduled]);
    backend
        .complete_workflow_task(
            &sender_task,
            InstanceState::Active,
            executed,
            vec![],
            vec![],
            vec![],
        )
        .await
        .unwrap();

    // Sender got the delivery outcome; it is requeued with it.
    let next_sender = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(next_sender.instance.instance_id, "sender");
    assert_eq!(next_sender.new_events.len(), 1);
    let EventKind::SignalWorkflowDelivered { error: None } = &next_sender.new_events[0].kind
    else {
        panic!("expected successful delivery outcome");
    };
    assert_eq!(next_sender.new_events[0].schedule_event_id, 1);

    // Receiver is holding the signal in pending; complete its open task
    // first, then the signal turn arrives.
    let executed = sequenced(&receiver_task, vec![started_event(1_000)]);
    backend
        .complete_workflow_task(
            &receiver_task,
            InstanceState::Active,
            executed,
            vec![],
            vec![],
            vec![],
        )
        .await
        .unwrap();
    let receiver_next = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    assert_eq!(receiver_next.instance.instance_id, "receiver");
    assert_eq!(receiver_next.new_events[0].type_name(), "SignalReceived");
}

#[tokio::test]
async fn workflow_signal_to_unknown_target_reports_instance_not_found() {
    let (backend, _clock) = backend();
    let sender = instance("sender");
    backend
        .create_workflow_instance(sender.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let scheduled = Event::with_schedule_id(
        1_000,
        1,
        EventKind::SignalWorkflowScheduled {
            instance_id: InstanceId::from_string("subworkflow"),
            name: "test".into(),
            arg: to_payload(&"").unwrap(),
        },
    );
    let executed = sequenced(&task, vec![started_event(1_000), scheduled]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    let next = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let EventKind::SignalWorkflowDelivered { error: Some(error) } = &next.new_events[0].kind
    else {
        panic!("expected failed delivery outcome");
    };
    assert_eq!(error, &WorkflowError::instance_not_found("subworkflow"));
}

#[tokio::test]
async fn sticky_instances_prefer_their_last_worker() {
    let (backend, clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let hot = WorkerId::new();
    let cold = WorkerId::new();
    let task = backend.get_workflow_task(&hot).await.unwrap().unwrap();
    let executed = sequenced(&task, vec![started_event(1_000)]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    backend.signal_workflow_instance(&wf.instance_id, signal_event(2_000, "s")).await.unwrap();

    // Within the sticky window the cold worker is passed over.
    assert!(backend.get_workflow_task(&cold).await.unwrap().is_none());
    let task = backend.get_workflow_task(&hot).await.unwrap().unwrap();
    let executed = sequenced(&task, vec![task.new_events[0].clone()]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    // After expiry anyone may pick the instance up.
    backend.signal_workflow_instance(&wf.instance_id, signal_event(3_000, "s")).await.unwrap();
    clock.advance(Duration::from_secs(31));
    assert!(backend.get_workflow_task(&cold).await.unwrap().is_some());
}

#[tokio::test]
async fn history_snapshot_filters_by_sequence() {
    let (backend, _clock) = backend();
    let wf = instance("order-1");
    backend
        .create_workflow_instance(wf.clone(), Metadata::default(), started_event(1_000))
        .await
        .unwrap();

    let worker = WorkerId::new();
    let task = backend.get_workflow_task(&worker).await.unwrap().unwrap();
    let scheduled = Event::with_schedule_id(
        1_000,
        1,
        EventKind::TimerScheduled { at: 9_000 },
    );
    let executed = sequenced(&task, vec![started_event(1_000), scheduled]);
    backend
        .complete_workflow_task(&task, InstanceState::Active, executed, vec![], vec![], vec![])
        .await
        .unwrap();

    let all = backend.get_workflow_instance_history(&wf.instance_id, 0).await.unwrap();
    assert_eq!(all.len(), 2);
    let tail = backend.get_workflow_instance_history(&wf.instance_id, 1).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].sequence_id, 2);
}
