use super::*;

use serde_json::json;
use shared::{
    domain::{RegisterValue, RunState, CHANNELS, DEFAULT_CHIP_IDS},
    protocol::PRELIM_HEADER,
};
use tokio::sync::{broadcast::error::TryRecvError, mpsc};

use crate::{
    catalog::{RegisterCatalog, CHANNEL_MASK, GLOBAL_THRESHOLD, PIXEL_TRIM_THRESHOLDS},
    commands::{END_RUN, LOAD_CONFIGURATION, SEND_CONFIGURATION, START_RUN},
};

struct Harness {
    dispatcher: Dispatcher,
    ctx: SessionContext,
    outbound: mpsc::UnboundedReceiver<OutboundCommand>,
}

fn harness() -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = SessionContext::new(&DEFAULT_CHIP_IDS, RegisterCatalog::larpix(), tx).expect("ctx");
    Harness {
        dispatcher: Dispatcher::default(),
        ctx,
        outbound: rx,
    }
}

fn set_state(h: &mut Harness, state: &str) {
    h.dispatcher
        .route(
            &mut h.ctx,
            STATE_UPDATE_EVENT,
            json!({"message": {"result": state}}),
        )
        .expect("state update");
}

fn button(name: &str) -> Trigger {
    Trigger::Button { name: name.into() }
}

fn sent(h: &mut Harness) -> OutboundCommand {
    h.outbound.try_recv().expect("queued command")
}

#[test]
fn start_run_scenario() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);

    let id = h
        .dispatcher
        .submit(&mut h.ctx, button(START_RUN), &[])
        .expect("submit");
    assert_eq!(id, CommandId(0));
    let entry = h.ctx.commands().get(id).expect("placeholder");
    assert_eq!(entry.header, PRELIM_HEADER);
    assert_eq!(entry.name, START_RUN);
    assert_eq!(entry.result, json!(""));

    let command = sent(&mut h);
    assert_eq!(command.event_name(), "command/start_run");
    assert_eq!(
        command.envelope,
        CommandEnvelope {
            id,
            params: vec![json!([])]
        }
    );

    let routed = h
        .dispatcher
        .route(
            &mut h.ctx,
            ACTION_UPDATE_EVENT,
            json!({"id": 0, "header": "OK", "message": {"result": "started"}}),
        )
        .expect("route");
    assert_eq!(routed, Routed::Command(id));
    let entry = h.ctx.commands().get(id).expect("entry");
    assert_eq!(entry.id, CommandId(0));
    assert_eq!(entry.header, "OK");
    assert_eq!(entry.name, START_RUN);
    assert_eq!(entry.result, json!("started"));
}

#[test]
fn queued_submissions_get_consecutive_ids_and_placeholders() {
    let mut h = harness();
    for n in 0..10 {
        let id = h
            .dispatcher
            .submit_text(&mut h.ctx, "hello", format!("operator {n}"))
            .expect("submit");
        assert_eq!(id, CommandId(n));
        assert!(h.ctx.commands().get(id).is_some());
        assert_eq!(sent(&mut h).envelope.id, id);
    }
    assert_eq!(h.ctx.commands().len(), 10);
}

#[test]
fn legacy_text_is_normalized_to_correlated_form() {
    let mut h = harness();
    h.dispatcher
        .submit_text(&mut h.ctx, "hello", "world")
        .expect("submit");
    assert_eq!(
        sent(&mut h).envelope,
        CommandEnvelope {
            id: CommandId(0),
            params: vec![json!(["world"])]
        }
    );
}

#[test]
fn free_text_values_stay_one_trailing_element() {
    let h = harness();
    let input = ["a".to_string(), "b".to_string()];

    let params = h
        .dispatcher
        .build_params(&h.ctx, &button("hello"), &input)
        .expect("button params");
    assert_eq!(params, vec![json!(["a", "b"])]);

    let params = h
        .dispatcher
        .build_params(
            &h.ctx,
            &Trigger::Select {
                name: LOAD_CONFIGURATION.into(),
                option: OptionDescriptor::new("246"),
            },
            &input,
        )
        .expect("select params");
    assert_eq!(params.len(), 2);
    assert_eq!(params[0], json!({"name": "246", "params": []}));
    assert_eq!(params[1], json!(["a", "b"]));
}

#[test]
fn select_trigger_prepends_option_descriptor() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);
    let option = OptionDescriptor {
        name: "246".into(),
        params: vec!["config_name".into()],
    };
    h.dispatcher
        .submit(
            &mut h.ctx,
            Trigger::Select {
                name: LOAD_CONFIGURATION.into(),
                option,
            },
            &["physics.json".to_string(), "fast".to_string()],
        )
        .expect("submit");
    assert_eq!(
        sent(&mut h).envelope.params,
        vec![
            json!({"name": "246", "params": ["config_name"]}),
            json!(["physics.json", "fast"])
        ]
    );
}

#[test]
fn pane_trigger_carries_selected_chip_configuration() {
    let mut h = harness();
    set_state(&mut h, RunState::INIT);
    h.dispatcher
        .select_device(&mut h.ctx, ChipId(252))
        .expect("select");
    h.dispatcher
        .set_scalar(&mut h.ctx, ChipId(252), GLOBAL_THRESHOLD, "31")
        .expect("edit");

    let params = h
        .dispatcher
        .build_params(&h.ctx, &Trigger::Pane { name: SEND_CONFIGURATION.into() }, &[])
        .expect("params");
    assert_eq!(params[0], json!(252));
    assert_eq!(params[1][GLOBAL_THRESHOLD], json!("31"));
    assert_eq!(params[1][PIXEL_TRIM_THRESHOLDS], json!(vec![16; CHANNELS]));
    assert_eq!(params[1][CHANNEL_MASK], json!(vec![false; CHANNELS]));
    assert_eq!(params[2], json!([]));

    let envelope = h
        .dispatcher
        .build_envelope(
            &mut h.ctx,
            &Trigger::Pane { name: SEND_CONFIGURATION.into() },
            &["note".into(), "second".into()],
        )
        .expect("envelope");
    assert_eq!(envelope.id, CommandId(0));
    assert_eq!(envelope.params.len(), 3);
    assert_eq!(envelope.params[2], json!(["note", "second"]));
    let placeholder = h.ctx.commands().get(envelope.id).expect("placeholder");
    assert_eq!(placeholder.name, SEND_CONFIGURATION);
    assert!(placeholder.is_prelim());
}

#[test]
fn disabled_command_is_refused_without_reserving_an_id() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);
    let err = h
        .dispatcher
        .submit(&mut h.ctx, button(END_RUN), &[])
        .expect_err("end_run needs RUN");
    assert!(matches!(err, DispatchError::NotPermitted { .. }));
    assert_eq!(err.code(), ErrorCode::NotPermitted);
    assert!(h.ctx.commands().is_empty());
    assert!(h.outbound.try_recv().is_err());
    assert!(!h.dispatcher.is_command_enabled(&h.ctx, END_RUN));
    assert!(h.dispatcher.is_command_enabled(&h.ctx, START_RUN));
}

#[test]
fn closed_outbound_queue_marks_command_failed() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);
    let Harness {
        dispatcher,
        mut ctx,
        outbound,
    } = h;
    drop(outbound);

    let err = dispatcher
        .submit(&mut ctx, button(START_RUN), &[])
        .expect_err("queue closed");
    assert!(matches!(err, DispatchError::ChannelClosed(CommandId(0))));
    assert_eq!(
        ctx.commands().get(CommandId(0)).expect("entry").status(),
        CommandStatus::Failed
    );
}

#[test]
fn run_state_is_stored_verbatim() {
    let mut h = harness();
    for value in ["CALIBRATING", "", "ready"] {
        set_state(&mut h, value);
        assert_eq!(h.ctx.run_state().as_str(), value);
    }
}

#[test]
fn identical_roster_emits_no_notification() {
    let mut h = harness();
    let mut events = h.ctx.subscribe();
    let payload = json!({"message": {"result": ["producer", "aggregator"]}});

    let routed = h
        .dispatcher
        .route(&mut h.ctx, CLIENT_UPDATE_EVENT, payload.clone())
        .expect("first");
    assert_eq!(routed, Routed::Roster { changed: true });
    assert_eq!(
        events.try_recv().expect("notification"),
        DashboardEvent::RosterChanged(vec!["producer".into(), "aggregator".into()])
    );

    let routed = h
        .dispatcher
        .route(&mut h.ctx, CLIENT_UPDATE_EVENT, payload)
        .expect("second");
    assert_eq!(routed, Routed::Roster { changed: false });
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn unknown_event_is_ignored() {
    let mut h = harness();
    let routed = h
        .dispatcher
        .route(&mut h.ctx, "data-rate", json!({"message": {"result": 12}}))
        .expect("route");
    assert_eq!(routed, Routed::Ignored);
}

#[test]
fn malformed_payload_touches_nothing() {
    let mut h = harness();
    h.dispatcher
        .submit_text(&mut h.ctx, "hello", "a")
        .expect("submit");
    let before: Vec<_> = h.ctx.commands().list().cloned().collect();

    let err = h
        .dispatcher
        .route(&mut h.ctx, ACTION_UPDATE_EVENT, json!({"header": "OK"}))
        .expect_err("missing id");
    assert!(matches!(err, DispatchError::MalformedPayload { .. }));
    let err = h
        .dispatcher
        .route(&mut h.ctx, STATE_UPDATE_EVENT, json!({"message": {"result": 3}}))
        .expect_err("state must be text");
    assert_eq!(err.code(), ErrorCode::MalformedPayload);

    let after: Vec<_> = h.ctx.commands().list().cloned().collect();
    assert_eq!(after, before);
    assert_eq!(h.ctx.run_state().as_str(), "");
}

#[test]
fn update_for_unissued_id_is_reported() {
    let mut h = harness();
    let err = h
        .dispatcher
        .route(&mut h.ctx, ACTION_UPDATE_EVENT, json!({"id": 0, "header": "OK"}))
        .expect_err("nothing submitted");
    assert_eq!(err.code(), ErrorCode::UnknownCommand);
    assert!(h.ctx.commands().is_empty());
}

#[test]
fn resolved_retrieval_merges_into_named_chip_only() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);
    let id = h
        .dispatcher
        .submit(
            &mut h.ctx,
            Trigger::Select {
                name: RETRIEVE_CONFIGURATION.into(),
                option: OptionDescriptor::new("245"),
            },
            &[],
        )
        .expect("submit");
    let untouched: Vec<_> = [ChipId(246), ChipId(252), ChipId(243)]
        .iter()
        .map(|chip| h.ctx.devices().get(*chip).cloned())
        .collect();

    h.dispatcher
        .route(
            &mut h.ctx,
            ACTION_UPDATE_EVENT,
            json!({"id": id.0, "header": "_PRELIM", "message": {"result": "reading", "metadata": {"chip": 245}}}),
        )
        .expect("prelim");
    assert_eq!(
        h.ctx.devices().get(ChipId(245)).expect("chip")[GLOBAL_THRESHOLD],
        RegisterValue::Scalar("16".into())
    );

    h.dispatcher
        .route(
            &mut h.ctx,
            ACTION_UPDATE_EVENT,
            json!({"id": id.0, "header": "OK", "message": {"result": {"global_threshold": "5"}}}),
        )
        .expect("final");

    let chip = h.ctx.devices().get(ChipId(245)).expect("chip");
    assert_eq!(chip[GLOBAL_THRESHOLD], RegisterValue::Scalar("5".into()));
    assert_eq!(
        chip[PIXEL_TRIM_THRESHOLDS],
        RegisterValue::PerChannelValue([16; CHANNELS])
    );
    let after: Vec<_> = [ChipId(246), ChipId(252), ChipId(243)]
        .iter()
        .map(|chip| h.ctx.devices().get(*chip).cloned())
        .collect();
    assert_eq!(after, untouched);
}

#[test]
fn malformed_retrieval_emits_error_and_keeps_chip() {
    let mut h = harness();
    set_state(&mut h, RunState::READY);
    let id = h
        .dispatcher
        .submit(
            &mut h.ctx,
            Trigger::Select {
                name: RETRIEVE_CONFIGURATION.into(),
                option: OptionDescriptor::new("243"),
            },
            &[],
        )
        .expect("submit");
    let mut events = h.ctx.subscribe();
    let before = h.ctx.devices().get(ChipId(243)).cloned();

    h.dispatcher
        .route(
            &mut h.ctx,
            ACTION_UPDATE_EVENT,
            json!({
                "id": id.0,
                "header": "OK",
                "message": {"result": {"channel_mask": [true]}, "metadata": {"chip": "243"}}
            }),
        )
        .expect("route");

    assert_eq!(h.ctx.devices().get(ChipId(243)).cloned(), before);
    assert!(matches!(
        events.try_recv().expect("command update"),
        DashboardEvent::CommandUpdated(_)
    ));
    let DashboardEvent::Error(error) = events.try_recv().expect("error") else {
        panic!("expected error notification");
    };
    assert_eq!(error.code, ErrorCode::MalformedPayload);
}

#[test]
fn local_edits_emit_device_notifications() {
    let mut h = harness();
    let mut events = h.ctx.subscribe();
    h.dispatcher
        .set_channel(&mut h.ctx, ChipId(246), CHANNEL_MASK, 3, ChannelValue::Flag(true))
        .expect("edit");
    assert_eq!(
        events.try_recv().expect("event"),
        DashboardEvent::DeviceUpdated {
            chip: ChipId(246),
            registers: vec![CHANNEL_MASK.to_string()]
        }
    );
    let err = h
        .dispatcher
        .select_device(&mut h.ctx, ChipId(1))
        .expect_err("unknown chip");
    assert_eq!(err.code(), ErrorCode::UnknownChip);
    assert_eq!(h.ctx.devices().selected_device(), ChipId(246));
}
