// Traffic shaping tests: debounce, throttle and batching under a paused clock
use hookwire::config::{BatchConfig, BusConfig};
use hookwire::events::{
    handler_fn, Event, EventBus, EventType, Payload, Priority, SubscribeOptions,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn tick(n: u64) -> Payload {
    Payload::Tick {
        tick: n,
        delta_ms: 10,
    }
}

fn tick_number(event: &Event) -> u64 {
    match event.payload {
        Payload::Tick { tick, .. } => tick,
        _ => panic!("Expected Tick payload"),
    }
}

/// Subscribe a handler recording delivered tick numbers
fn record_ticks(bus: &EventBus, event_type: EventType) -> Arc<Mutex<Vec<u64>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        event_type,
        handler_fn(move |event: Event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(tick_number(&event));
                Ok(())
            }
        }),
        SubscribeOptions::new(),
    );
    seen
}

fn unbatched() -> BusConfig {
    BusConfig {
        batch: BatchConfig::disabled(),
        ..BusConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_burst_into_last_event() {
    let bus = EventBus::with_config(
        unbatched().with_debounce(EventType::StateChanged, Duration::from_millis(50)),
    );
    let seen = record_ticks(&bus, EventType::StateChanged);

    for n in 0..5 {
        assert!(
            bus.publish(Event::new(EventType::StateChanged, "ui").with_payload(tick(n)))
                .await
        );
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(bus.pending_debounces(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*seen.lock().unwrap(), vec![4]);
    assert_eq!(bus.pending_debounces(), 0);
    assert_eq!(bus.metrics().debounced, 4);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_is_per_event_type() {
    let bus = EventBus::with_config(
        unbatched()
            .with_debounce(EventType::StateChanged, Duration::from_millis(50))
            .with_debounce(EventType::ObjectUpdated, Duration::from_millis(50)),
    );
    let state = record_ticks(&bus, EventType::StateChanged);
    let updates = record_ticks(&bus, EventType::ObjectUpdated);

    bus.publish(Event::new(EventType::StateChanged, "ui").with_payload(tick(1)))
        .await;
    bus.publish(Event::new(EventType::ObjectUpdated, "ui").with_payload(tick(2)))
        .await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(*state.lock().unwrap(), vec![1]);
    assert_eq!(*updates.lock().unwrap(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_separated_debounced_events_both_deliver() {
    let bus = EventBus::with_config(
        unbatched().with_debounce(EventType::StateChanged, Duration::from_millis(50)),
    );
    let seen = record_ticks(&bus, EventType::StateChanged);

    bus.publish(Event::new(EventType::StateChanged, "ui").with_payload(tick(1)))
        .await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    bus.publish(Event::new(EventType::StateChanged, "ui").with_payload(tick(2)))
        .await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_caps_delivery_rate() {
    let interval = Duration::from_millis(100);
    let bus = EventBus::with_config(unbatched().with_throttle(EventType::Interaction, interval));
    let seen = record_ticks(&bus, EventType::Interaction);

    // 30 events over a 300ms window
    let mut accepted = 0;
    for n in 0..30 {
        if bus
            .publish(Event::new(EventType::Interaction, "ui").with_payload(tick(n)))
            .await
        {
            accepted += 1;
        }
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    assert_eq!(accepted, 3);
    assert_eq!(*seen.lock().unwrap(), vec![0, 10, 20]);
    assert_eq!(bus.metrics().dropped, 27);
}

#[tokio::test(start_paused = true)]
async fn test_batch_flushes_on_timer_in_fifo_order() {
    let bus = EventBus::new();
    let seen = record_ticks(&bus, EventType::TimeTick);

    for n in 0..3 {
        assert!(
            bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(n)))
                .await
        );
    }
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(bus.queued_batch_len(), 3);

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(bus.queued_batch_len(), 0);
    assert_eq!(bus.metrics().batched, 3);
}

#[tokio::test(start_paused = true)]
async fn test_batch_flushes_at_size_threshold() {
    let config = BusConfig {
        batch: BatchConfig {
            event_types: vec![EventType::PositionChanged],
            max_batch_size: 4,
            flush_interval_ms: 1_000,
        },
        ..BusConfig::default()
    };
    let bus = EventBus::with_config(config);
    let seen = record_ticks(&bus, EventType::PositionChanged);

    for n in 0..5 {
        bus.publish(Event::new(EventType::PositionChanged, "physics").with_payload(tick(n)))
            .await;
    }

    // Four delivered at the threshold without waiting; the fifth waits for the timer
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(bus.queued_batch_len(), 1);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_flush_and_shutdown() {
    let bus = EventBus::with_config(
        BusConfig::default().with_debounce(EventType::StateChanged, Duration::from_millis(50)),
    );
    let ticks = record_ticks(&bus, EventType::TimeTick);
    let state = record_ticks(&bus, EventType::StateChanged);

    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(1)))
        .await;
    assert_eq!(bus.flush_batches().await, 1);
    assert_eq!(*ticks.lock().unwrap(), vec![1]);

    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(2)))
        .await;
    bus.publish(Event::new(EventType::StateChanged, "ui").with_payload(tick(3)))
        .await;
    bus.shutdown().await;

    // Queued batch events are flushed; the pending debounce is cancelled
    assert_eq!(*ticks.lock().unwrap(), vec![1, 2]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.lock().unwrap().is_empty());
    assert_eq!(bus.pending_debounces(), 0);
}

#[tokio::test]
async fn test_unshaped_types_deliver_immediately() {
    let bus = EventBus::new();
    let seen = record_ticks(&bus, EventType::ObjectLoaded);
    bus.publish(Event::new(EventType::ObjectLoaded, "scene").with_payload(tick(7)))
        .await;
    assert_eq!(*seen.lock().unwrap(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_batches_stay_in_order_while_timer_flush_is_slow() {
    let config = BusConfig {
        batch: BatchConfig {
            event_types: vec![EventType::TimeTick],
            max_batch_size: 2,
            flush_interval_ms: 10,
        },
        ..BusConfig::default()
    };
    let bus = EventBus::with_config(config);

    // Slow only on the first event, which the timer delivers
    bus.subscribe(
        EventType::TimeTick,
        handler_fn(|event: Event| async move {
            if tick_number(&event) == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(())
        }),
        SubscribeOptions::new().with_priority(Priority::High),
    );
    let seen = record_ticks(&bus, EventType::TimeTick);

    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(0)))
        .await;
    tokio::time::sleep(Duration::from_millis(15)).await;

    // The timer is now inside the slow handler; these two hit the threshold
    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(1)))
        .await;
    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(2)))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(bus.queued_batch_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_handler_publishing_batched_event_during_flush() {
    let config = BusConfig {
        batch: BatchConfig {
            event_types: vec![EventType::TimeTick, EventType::ObjectUpdated],
            max_batch_size: 1,
            flush_interval_ms: 10,
        },
        ..BusConfig::default()
    };
    let bus = EventBus::with_config(config);
    let updates = record_ticks(&bus, EventType::ObjectUpdated);

    let inner = bus.clone();
    bus.subscribe(
        EventType::TimeTick,
        handler_fn(move |event: Event| {
            let inner = inner.clone();
            async move {
                let n = tick_number(&event);
                inner
                    .publish(Event::new(EventType::ObjectUpdated, "relay").with_payload(tick(n)))
                    .await;
                // Nested manual flush defers to the drain already running
                assert_eq!(inner.flush_batches().await, 0);
                Ok(())
            }
        }),
        SubscribeOptions::new(),
    );

    bus.publish(Event::new(EventType::TimeTick, "clock").with_payload(tick(5)))
        .await;

    assert_eq!(*updates.lock().unwrap(), vec![5]);
    assert_eq!(bus.queued_batch_len(), 0);
}
