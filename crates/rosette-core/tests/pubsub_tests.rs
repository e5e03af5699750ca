mod common;

use common::*;
use rosette_core::{
    Context, Error, Message, MessageType, Node, Value,
    msgs::{ColorNumber, Text, Vector3},
};
use std::{thread, time::Duration};

#[test]
fn test_vector_scenario_across_nodes() {
    init_tracing();
    let context = Context::new();
    let mut node_a = Node::new(&context, "node_a").unwrap();
    let mut node_b = Node::new(&context, "node_b").unwrap();
    let recorder = Recorder::<Vector3>::new();

    let publisher = node_a.advertise::<Vector3>("v", 10).unwrap();
    node_b.subscribe("v", 10, recorder.callback()).unwrap();

    publisher.publish(&Vector3::new(1.0, 2.0, 0.0)).unwrap();

    assert_eq!(node_b.spin_some(), 1);
    assert_eq!(node_b.spin_some(), 0);
    assert_eq!(recorder.received(), [Vector3::new(1.0, 2.0, 0.0)]);
}

#[test]
fn test_color_number_type_conflict() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    node.advertise::<ColorNumber>("c", 10).unwrap();

    let err = node.subscribe("c", 10, |_v: Vector3| Ok(())).unwrap_err();
    assert_eq!(
        err,
        Error::TypeConflict {
            topic: "c".to_string(),
            bound: ColorNumber::TYPE_NAME.to_string(),
            requested: Vector3::TYPE_NAME.to_string(),
        }
    );
    assert_eq!(node.subscriber_count(), 0);
}

#[test]
fn test_subscriber_binds_topic_first() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    node.subscribe("topic", 10, |_t: Text| Ok(())).unwrap();

    assert!(matches!(
        node.advertise::<Vector3>("topic", 10),
        Err(Error::TypeConflict { .. })
    ));
    assert!(node.advertise::<Text>("topic", 10).is_ok());
}

#[test]
fn test_dynamic_publish_type_mismatch() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    let publisher = node
        .advertise_dynamic("v", Vector3::TYPE_NAME, 10)
        .unwrap();

    let err = publisher
        .publish(ColorNumber::new("red", 1.0).to_message())
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn test_fan_out_to_every_subscriber() {
    let context = Context::new();
    let mut talker = Node::new(&context, "talker").unwrap();
    let mut listener_1 = Node::new(&context, "listener_1").unwrap();
    let mut listener_2 = Node::new(&context, "listener_2").unwrap();
    let first = Recorder::<Text>::new();
    let second = Recorder::<Text>::new();
    let third = Recorder::<Text>::new();

    let publisher = talker.advertise::<Text>("topic", 10).unwrap();
    listener_1.subscribe("topic", 10, first.callback()).unwrap();
    listener_2.subscribe("topic", 10, second.callback()).unwrap();
    listener_2.subscribe("topic", 10, third.callback()).unwrap();

    assert_eq!(publisher.publish(&Text::new("Hello World: 0")).unwrap(), 3);

    listener_1.spin_some();
    listener_2.spin_some();
    for recorder in [&first, &second, &third] {
        assert_eq!(recorder.received(), [Text::new("Hello World: 0")]);
    }
}

#[test]
fn test_late_subscriber_misses_earlier_messages() {
    let context = Context::new();
    let mut talker = Node::new(&context, "talker").unwrap();
    let mut listener = Node::new(&context, "listener").unwrap();
    let recorder = Recorder::<Text>::new();

    let publisher = talker.advertise::<Text>("topic", 10).unwrap();
    assert_eq!(publisher.publish(&Text::new("nobody hears this")).unwrap(), 0);

    listener.subscribe("topic", 10, recorder.callback()).unwrap();
    publisher.publish(&Text::new("heard")).unwrap();

    listener.spin_some();
    assert_eq!(recorder.received(), [Text::new("heard")]);
}

#[test]
fn test_per_publisher_order_is_preserved() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    let recorder = Recorder::<ColorNumber>::new();

    let red = node.advertise::<ColorNumber>("c", 100).unwrap();
    let blue = node.advertise::<ColorNumber>("c", 100).unwrap();
    node.subscribe("c", 100, recorder.callback()).unwrap();

    for i in 0..20 {
        red.publish(&ColorNumber::new("red", i as f64)).unwrap();
        if i % 3 == 0 {
            blue.publish(&ColorNumber::new("blue", i as f64)).unwrap();
        }
    }

    node.spin_some();
    let received = recorder.received();
    for color in ["red", "blue"] {
        let numbers: Vec<f64> = received
            .iter()
            .filter(|msg| msg.color == color)
            .map(|msg| msg.number)
            .collect();
        assert!(
            numbers.windows(2).all(|w| w[0] < w[1]),
            "{color} messages out of order: {numbers:?}"
        );
    }
    assert_eq!(received.len(), 20 + 7);
}

#[test]
fn test_delivered_message_is_unchanged() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    let recorder = Recorder::<Message>::new();

    let publisher = node
        .advertise_dynamic("c", ColorNumber::TYPE_NAME, 10)
        .unwrap();
    let mut callback = recorder.callback();
    node.subscribe_dynamic("c", ColorNumber::TYPE_NAME, 10, move |msg: &Message| {
        callback(msg.clone())
    })
    .unwrap();

    let sent = Message::new(
        ColorNumber::TYPE_NAME,
        vec![Value::String("green".into()), Value::Float64(-7.25)],
    );
    publisher.publish(sent.clone()).unwrap();
    node.spin_some();

    assert_eq!(recorder.received(), [sent]);
}

#[test]
fn test_spinning_listener_on_another_thread() {
    init_tracing();
    let context = Context::new();
    let mut talker = Node::new(&context, "talker").unwrap();
    let mut listener = Node::new(&context, "listener").unwrap();
    let recorder = Recorder::<Text>::new();

    let publisher = talker.advertise::<Text>("topic", 10).unwrap();
    let stop = listener.shutdown_handle();
    let mut record = recorder.callback();
    listener
        .subscribe("topic", 10, move |msg: Text| {
            let last = msg.data == "Hello World: 4";
            record(msg)?;
            if last {
                stop.shutdown();
            }
            Ok(())
        })
        .unwrap();

    let handle = thread::spawn(move || listener.spin());

    for i in 0..5 {
        publisher
            .publish(&Text::new(format!("Hello World: {i}")))
            .unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    handle.join().unwrap().unwrap();
    let data: Vec<String> = recorder.received().into_iter().map(|m| m.data).collect();
    assert_eq!(
        data,
        (0..5).map(|i| format!("Hello World: {i}")).collect::<Vec<_>>()
    );
}

#[test]
fn test_topic_introspection() {
    let context = Context::new();
    let mut talker = Node::new(&context, "talker").unwrap();
    let mut listener = Node::new(&context, "listener").unwrap();

    let publisher = talker.advertise::<Vector3>("vector_topic", 10).unwrap();
    listener.subscribe("vector_topic", 5, |_v: Vector3| Ok(())).unwrap();
    talker.advertise::<Text>("topic", 10).unwrap();

    publisher.publish(&Vector3::default()).unwrap();
    publisher.publish(&Vector3::default()).unwrap();

    assert_eq!(
        context.bus().topic_names_and_types(),
        [
            ("vector_topic".to_string(), Vector3::TYPE_NAME.to_string()),
            ("topic".to_string(), Text::TYPE_NAME.to_string()),
        ]
    );

    let info = context.bus().topic_info("vector_topic").unwrap();
    assert_eq!(info.publisher_count, 1);
    assert_eq!(info.subscriber_count, 1);
    assert_eq!(info.published, 2);

    let (publishers, subscribers) = context.bus().topic_endpoints("vector_topic").unwrap();
    assert_eq!(publishers, ["talker (depth 10)"]);
    assert_eq!(subscribers, ["listener (depth 5)"]);
}

#[test]
fn test_destroyed_publisher_handle() {
    let context = Context::new();
    let mut node = Node::new(&context, "node").unwrap();
    let publisher = node.advertise::<Text>("topic", 10).unwrap();

    assert!(node.destroy_publisher(publisher.handle()));
    assert!(!node.destroy_publisher(publisher.handle()));
    assert!(matches!(
        publisher.publish(&Text::new("late")),
        Err(Error::PublisherDestroyed { .. })
    ));
    assert!(context.bus().topic_info("topic").is_none());
}
