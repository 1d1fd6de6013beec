//! Integration tests for strictbus
//!
//! These tests drive the typed surfaces end to end over the in-process bus.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use strictbus::bus::SendBus;
use strictbus::{
    BusConfig, BusError, Contract, ContractError, HandlerShape, LocalHub, ParamType, Payload, RawShape, define_request,
    event_map, funcify, object_param,
};
use tokio::sync::mpsc;

event_map!(ControllerIn {
    Alpha = "a": fn(i64),
    Done = "done": fn(),
});

event_map!(ControllerOut {
    Beta = "b": fn(String),
});

define_request!(Ping = "ping": fn(String) -> String);
define_request!(Sum = "sum": fn(Vec<i64>) -> i64);
event_map!(Rpc { Ping, Sum });

event_map!(Counted {
    Count = "count": Payload<u32>,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Progress {
    done: u32,
    total: u32,
}
object_param!(Progress { done: u32, total: u32 });

event_map!(Narrow {
    Report = "report": Payload<Progress>,
    Small = "small": fn(u8),
    Tick = "tick": fn(i64),
});

define_request!(Half = "half": fn(u32) -> u32);
event_map!(Halving { Half });

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for delivery")
        .expect("Channel closed")
}

// =============================================================================
// Broadcast Tests
// =============================================================================

#[tokio::test]
async fn test_asymmetric_channel_both_directions() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<ControllerIn, ControllerOut>::new().expect("Failed to build contract");
    let controller = contract.controller(hub.controller());
    let port = hub.spawn_worker("w").expect("Failed to spawn worker");
    let worker = contract.reversed().worker(port);

    // Controller receives `a` and emits `b`; the worker is the mirror image
    controller.on::<Alpha, _>(|event, (n,)| {
        event.reply::<Beta>((format!("n={}", n),)).expect("Reply failed");
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    worker.on::<Beta, _>(move |_, (s,)| {
        let _ = tx.send(s);
    });

    worker.send::<Alpha>((41,)).expect("Send failed");
    assert_eq!(recv(&mut rx).await, "n=41");

    // Runtime counterparts of the compile-time rejections
    assert!(matches!(
        controller.on_dynamic("b", |_, _| {}),
        Err(ContractError::UnknownEvent { .. })
    ));
    assert!(matches!(
        worker.send_dynamic("b", vec![json!("x")]),
        Err(ContractError::UnknownEvent { .. })
    ));
    assert!(matches!(
        worker.send_dynamic("a", vec![json!("1")]),
        Err(ContractError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        worker.send_dynamic("a", vec![json!(1), json!(2)]),
        Err(ContractError::ShapeMismatch { .. })
    ));
}

#[tokio::test]
async fn test_once_fires_exactly_once() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<ControllerIn, ControllerOut>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.reversed().worker(hub.spawn_worker("w").unwrap());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    controller.once::<Alpha, _>(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Done, _>(move |_, ()| {
        let _ = tx.send(());
    });

    worker.send::<Alpha>((1,)).unwrap();
    worker.send::<Alpha>((2,)).unwrap();
    worker.send::<Done>(()).unwrap();

    // `done` is delivered after both `a` events on the same endpoint
    recv(&mut rx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remove_listener_is_idempotent() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<ControllerIn, ControllerOut>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.reversed().worker(hub.spawn_worker("w").unwrap());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let key = controller.on::<Alpha, _>(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    controller.remove_listener(key);
    controller.remove_listener(key);

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Done, _>(move |_, ()| {
        let _ = tx.send(());
    });
    worker.send::<Alpha>((1,)).unwrap();
    worker.send::<Done>(()).unwrap();

    recv(&mut rx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    controller.remove_all_listeners::<Done>();
    controller.remove_all_listeners::<Done>();
    assert_eq!(hub.metrics().listeners, 0);
}

#[tokio::test]
async fn test_payload_events_carry_one_value() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Counted>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.worker(hub.spawn_worker("w").unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Count, _>(move |_, (n,)| {
        let _ = tx.send(n);
    });
    worker.send::<Count>((9,)).unwrap();

    assert_eq!(recv(&mut rx).await, 9);
    assert_eq!(
        contract.inbound().get("count"),
        Some(&HandlerShape::new(vec![ParamType::Bounded { min: 0, max: u32::MAX as u64 }]))
    );
}

#[tokio::test]
async fn test_raw_sends_are_filtered_by_typed_listeners() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<ControllerIn, ControllerOut>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.reversed().worker(hub.spawn_worker("w").unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Alpha, _>(move |_, (n,)| {
        let _ = tx.send(n);
    });

    worker.raw().send("a", vec![json!("not a number")]).unwrap();
    worker.raw().send("a", vec![json!(7)]).unwrap();

    assert_eq!(recv(&mut rx).await, 7);
    assert_eq!(controller.rejected(), 1);
}

#[tokio::test]
async fn test_dynamic_send_matches_typed_decoding() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Narrow>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.worker(hub.spawn_worker("w").unwrap());

    for (event, args) in [
        ("report", vec![json!({"bogus": "x"})]),
        ("report", vec![json!({"done": 1, "total": -3})]),
        ("small", vec![json!(-5)]),
        ("small", vec![json!(300)]),
    ] {
        assert!(
            matches!(worker.send_dynamic(event, args.clone()), Err(ContractError::ShapeMismatch { .. })),
            "{} {:?} must be rejected before the bus",
            event,
            args
        );
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Report, _>(move |_, (progress,)| {
        let _ = tx.send(progress);
    });
    worker
        .send_dynamic("report", vec![json!({"done": 2, "total": 5})])
        .unwrap();
    worker.send_dynamic("small", vec![json!(255)]).unwrap();

    assert_eq!(recv(&mut rx).await, Progress { done: 2, total: 5 });
    assert_eq!(controller.rejected(), 0);
}

#[tokio::test]
async fn test_once_waits_for_matching_payload() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Narrow>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.worker(hub.spawn_worker("w").unwrap());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    controller.once::<Tick, _>(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Small, _>(move |_, (n,)| {
        let _ = tx.send(n);
    });

    worker.raw().send("tick", vec![json!("bad")]).unwrap();
    worker.send::<Tick>((1,)).unwrap();
    worker.send::<Tick>((2,)).unwrap();
    worker.send::<Small>((0,)).unwrap();

    recv(&mut rx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.rejected(), 1);
}

#[tokio::test]
async fn test_delivered_metric_counts_rejected_payloads() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Narrow>::new().unwrap();
    let controller = contract.controller(hub.controller());
    let worker = contract.worker(hub.spawn_worker("w").unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on::<Tick, _>(move |_, (n,)| {
        let _ = tx.send(n);
    });
    worker.raw().send("tick", vec![json!("bad")]).unwrap();
    worker.send::<Tick>((3,)).unwrap();

    assert_eq!(recv(&mut rx).await, 3);
    let metrics = hub.metrics();
    assert_eq!(metrics.messages_sent, 2);
    assert_eq!(metrics.messages_delivered, 2);
    assert_eq!(controller.rejected(), 1);
}

// =============================================================================
// Request/Response Tests
// =============================================================================

#[tokio::test]
async fn test_handle_invoke_then_missing_handler() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Rpc>::new().unwrap();
    let handler = contract.handler(hub.controller());
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    let key = handler
        .handle::<Ping, _, _>(|_, (msg,)| async move { Ok(format!("pong: {}", msg)) })
        .unwrap();
    let reply = invoker.invoke::<Ping>(("hi".to_string(),)).await.unwrap();
    assert_eq!(reply, "pong: hi");

    handler.remove_handler(key);
    handler.remove_handler(key);

    let err = tokio::time::timeout(Duration::from_secs(1), invoker.invoke::<Ping>(("hi".to_string(),)))
        .await
        .expect("invoke must fail fast, not hang")
        .unwrap_err();
    assert!(matches!(err, ContractError::MissingHandler { .. }));
}

#[tokio::test]
async fn test_second_handler_conflicts() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Rpc>::new().unwrap();
    let handler = contract.handler(hub.controller());

    handler
        .handle::<Sum, _, _>(|_, (xs,)| async move { Ok(xs.iter().sum::<i64>()) })
        .unwrap();
    let err = handler
        .handle::<Sum, _, _>(|_, _| async move { Ok(0) })
        .unwrap_err();
    assert!(matches!(err, ContractError::ConflictingHandler { ref event } if event == "sum"));
}

#[tokio::test]
async fn test_handler_failures_pass_through() {
    let hub = LocalHub::new(BusConfig {
        invoke_timeout_ms: 50,
        ..Default::default()
    });
    let contract = Contract::<Rpc>::new().unwrap();
    let handler = contract.handler(hub.controller());
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    handler
        .handle::<Ping, _, _>(|_, _| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        })
        .unwrap();
    handler
        .handle::<Sum, _, _>(|_, _| async move { Err(eyre::eyre!("overflow")) })
        .unwrap();

    let err = invoker.invoke::<Ping>(("x".to_string(),)).await.unwrap_err();
    assert!(matches!(err, ContractError::Transport(BusError::Timeout(_))));

    let err = invoker.invoke::<Sum>((vec![1, 2],)).await.unwrap_err();
    assert!(matches!(err, ContractError::Transport(BusError::HandlerFailed(ref msg)) if msg.contains("overflow")));
}

#[tokio::test]
async fn test_invoke_dynamic() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Rpc>::new().unwrap();
    let handler = contract.handler(hub.controller());
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    handler
        .handle::<Sum, _, _>(|_, (xs,)| async move { Ok(xs.iter().sum::<i64>()) })
        .unwrap();

    let value = invoker.invoke_dynamic("sum", vec![json!([1, 2, 3])]).await.unwrap();
    assert_eq!(value, json!(6));

    assert!(matches!(
        invoker.invoke_dynamic("sum", vec![json!([1, "two"])]).await,
        Err(ContractError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        invoker.invoke_dynamic("product", vec![]).await,
        Err(ContractError::UnknownEvent { .. })
    ));
}

#[tokio::test]
async fn test_invoke_dynamic_rejects_out_of_range_argument() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Halving>::new().unwrap();
    let handler = contract.handler(hub.controller());
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    handler
        .handle::<Half, _, _>(|_, (n,)| async move { Ok(n / 2) })
        .unwrap();

    let err = invoker.invoke_dynamic("half", vec![json!(-4)]).await.unwrap_err();
    assert!(matches!(err, ContractError::ShapeMismatch { .. }), "got {:?}", err);
    assert_eq!(hub.metrics().invocations, 0);

    assert_eq!(invoker.invoke_dynamic("half", vec![json!(8)]).await.unwrap(), json!(4));
}

#[tokio::test]
async fn test_handler_panic_before_await_reaches_invoker_as_failure() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Halving>::new().unwrap();
    let handler = contract.handler(hub.controller());
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    handler
        .handle::<Half, _, _>(|_, (n,)| {
            if n == 0 {
                panic!("division by zero");
            }
            async move { Ok(n / 2) }
        })
        .unwrap();

    let err = invoker.invoke::<Half>((0,)).await.unwrap_err();
    assert!(matches!(err, ContractError::Transport(BusError::HandlerFailed(_))), "got {:?}", err);
    assert_eq!(invoker.invoke::<Half>((6,)).await.unwrap(), 3);
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_funcify_normalizes_payloads_only() {
    let mut raw = BTreeMap::new();
    raw.insert("a".to_string(), RawShape::Value(ParamType::Number));
    raw.insert(
        "b".to_string(),
        RawShape::Handler(HandlerShape::new(vec![ParamType::String])),
    );

    let shaped = funcify(raw);
    assert_eq!(shaped["a"], HandlerShape::new(vec![ParamType::Number]));
    assert_eq!(shaped["b"], HandlerShape::new(vec![ParamType::String]));

    let again = funcify(
        shaped
            .iter()
            .map(|(name, shape)| (name.clone(), RawShape::Handler(shape.clone())))
            .collect(),
    );
    assert_eq!(again, shaped);
}

#[tokio::test]
async fn test_shutdown_surfaces_as_transport() {
    let hub = LocalHub::new(BusConfig::default());
    let contract = Contract::<Rpc>::new().unwrap();
    let invoker = contract.invoker(hub.spawn_worker("w").unwrap());

    hub.shutdown();
    let err = invoker.invoke::<Ping>(("x".to_string(),)).await.unwrap_err();
    assert!(matches!(err, ContractError::Transport(BusError::Closed)));
}
