// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Round-trip laws over generated events and ids.

use crate::error::WorkflowError;
use crate::event::{Event, EventKind};
use crate::instance::InstanceId;
use crate::payload::{to_payload, Payload};
use proptest::prelude::*;

fn payload_strategy() -> impl Strategy<Value = Payload> {
    "[a-z0-9]{0,12}".prop_map(|s| to_payload(&s).unwrap())
}

fn instance_id_strategy() -> impl Strategy<Value = InstanceId> {
    "[a-z0-9-]{1,20}".prop_map(InstanceId::from_string)
}

fn kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        ("[a-z]{1,10}", proptest::collection::vec(payload_strategy(), 0..3))
            .prop_map(|(name, inputs)| EventKind::ActivityScheduled { name, inputs }),
        payload_strategy().prop_map(|result| EventKind::ActivityCompleted { result }),
        "[a-z ]{0,20}"
            .prop_map(|m| EventKind::ActivityFailed { error: WorkflowError::failure(m) }),
        any::<u64>().prop_map(|at| EventKind::TimerScheduled { at }),
        any::<u64>().prop_map(|at| EventKind::TimerFired { at }),
        Just(EventKind::TimerCanceled {}),
        ("[a-z]{1,10}", payload_strategy())
            .prop_map(|(name, arg)| EventKind::SignalReceived { name, arg }),
        (instance_id_strategy(), "[a-z]{1,10}").prop_map(|(instance_id, name)| {
            EventKind::SubWorkflowScheduled { instance_id, name, inputs: vec![] }
        }),
        payload_strategy().prop_map(|result| EventKind::SideEffectResult { result }),
        proptest::option::of("[a-z-]{1,20}").prop_map(|target| {
            EventKind::SignalWorkflowDelivered {
                error: target.map(WorkflowError::instance_not_found),
            }
        }),
    ]
}

fn event_strategy() -> impl Strategy<Value = Event> {
    (kind_strategy(), any::<u64>(), any::<u64>(), proptest::option::of(any::<u64>())).prop_map(
        |(kind, timestamp, schedule_event_id, visible_at)| {
            let mut event = Event::with_schedule_id(timestamp, schedule_event_id, kind);
            event.visible_at = visible_at;
            event
        },
    )
}

proptest! {
    #[test]
    fn events_round_trip_through_json(event in event_strategy()) {
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, event);
    }

    #[test]
    fn instance_ids_round_trip(s in "[a-zA-Z0-9:_-]{0,48}") {
        let id = InstanceId::from_string(&s);
        let encoded = serde_json::to_string(&id).unwrap();
        let decoded: InstanceId = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, id);
    }

    #[test]
    fn payload_values_round_trip(value in "[ -~]{0,40}") {
        let payload = to_payload(&value).unwrap();
        let back: String = crate::payload::from_payload(&payload).unwrap();
        prop_assert_eq!(back, value);
    }
}
