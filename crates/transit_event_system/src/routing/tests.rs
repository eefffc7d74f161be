//! Tests for subscription routing

#[cfg(test)]
mod tests {
    use crate::events::{AnalyticsSnapshot, BusEvent, EnrichedEvent, Event};
    use crate::analytics::StatSnapshot;
    use crate::routing::{
        DeliveryError, EventRouter, Interest, RemoteSubscriber, RouterConfig, RouterState, RoutingError,
    };
    use crate::system::EventBus;
    use crate::types::{ClientId, Coordinate, TierRole, ZoneId};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every event it receives.
    #[derive(Debug, Default)]
    struct Recorder {
        name: String,
        received: Mutex<Vec<BusEvent>>,
    }

    impl Recorder {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                received: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteSubscriber for Recorder {
        async fn deliver(&self, event: &BusEvent) -> Result<(), DeliveryError> {
            self.received.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Always fails, as a crashed client would.
    #[derive(Debug, Default)]
    struct Dead {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteSubscriber for Dead {
        async fn deliver(&self, _event: &BusEvent) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Disconnected("connection reset".to_string()))
        }

        fn name(&self) -> &str {
            "dead"
        }
    }

    /// Never answers.
    #[derive(Debug)]
    struct Stalled;

    #[async_trait]
    impl RemoteSubscriber for Stalled {
        async fn deliver(&self, _event: &BusEvent) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    /// Feeds delivered events into another router, like a tier-to-tier link.
    #[derive(Debug)]
    struct Hop {
        next: Arc<EventRouter>,
    }

    #[async_trait]
    impl RemoteSubscriber for Hop {
        async fn deliver(&self, event: &BusEvent) -> Result<(), DeliveryError> {
            self.next
                .receive_from_upstream(event.clone())
                .await
                .map(|_| ())
                .map_err(|e| DeliveryError::Rejected(e.to_string()))
        }

        fn name(&self) -> &str {
            "hop"
        }
    }

    fn enriched(zone: &str) -> BusEvent {
        EnrichedEvent {
            source_id: "bus-3".to_string(),
            line_id: "P10A".to_string(),
            coordinate: Coordinate::new(3.45, -76.53),
            zone_id: ZoneId::from(zone),
            arc_id: None,
            nearest_stop_id: None,
            event_timestamp: 0,
            sequence_id: 1,
        }
        .into_bus()
    }

    fn started_router(tier: TierRole, config: RouterConfig) -> Arc<EventRouter> {
        let bus = Arc::new(EventBus::new());
        bus.start();
        let router = Arc::new(EventRouter::new(tier, bus, config));
        router.start().expect("start");
        router
    }

    #[tokio::test]
    async fn test_zone_filtered_routing() {
        let router = started_router(TierRole::Mid, RouterConfig::default());
        let all = Recorder::named("all");
        let z01 = Recorder::named("z01");
        let z02 = Recorder::named("z02");
        router.subscribe(ClientId::new(), Interest::All, all.clone()).unwrap();
        router.subscribe(ClientId::new(), Interest::zones(["Z01"]), z01.clone()).unwrap();
        router.subscribe(ClientId::new(), Interest::zones(["Z02"]), z02.clone()).unwrap();

        let report = router.route_to_zone(&enriched("Z01"), &ZoneId::from("Z01")).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!((all.count(), z01.count(), z02.count()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_route_to_all_ignores_interest() {
        let router = started_router(TierRole::Terminal, RouterConfig::default());
        let z01 = Recorder::named("z01");
        let none = Recorder::named("none");
        router.subscribe(ClientId::new(), Interest::zones(["Z01"]), z01.clone()).unwrap();
        router
            .subscribe(ClientId::new(), Interest::zones(Vec::<&str>::new()), none.clone())
            .unwrap();

        let snapshot = AnalyticsSnapshot {
            tier: TierRole::Terminal,
            taken_at: 0,
            system: StatSnapshot::default(),
            zones: BTreeMap::new(),
        }
        .into_bus();
        let report = router.forward(&snapshot).await;

        assert_eq!(report.delivered, 2);
        assert_eq!((z01.count(), none.count()), (1, 1));
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_removed() {
        let router = started_router(TierRole::Mid, RouterConfig::default());
        let dead = Arc::new(Dead::default());
        let alive = Recorder::named("alive");
        let dead_id = ClientId::new();
        router.subscribe(dead_id, Interest::All, dead.clone()).unwrap();
        router.subscribe(ClientId::new(), Interest::All, alive.clone()).unwrap();

        let report = router.route_to_all(&enriched("Z05")).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, vec![dead_id]);
        assert!(!router.subscriptions().contains(&dead_id));

        router.route_to_all(&enriched("Z05")).await;
        assert_eq!(dead.calls.load(Ordering::SeqCst), 1, "removed subscriber is not retried");
        assert_eq!(alive.count(), 2);
        assert_eq!(router.stats().subscribers_removed, 1);
    }

    #[tokio::test]
    async fn test_failure_threshold_removes_after_repeated_failures() {
        let config = RouterConfig {
            max_consecutive_failures: 2,
            ..RouterConfig::default()
        };
        let router = started_router(TierRole::Mid, config);
        let dead_id = ClientId::new();
        router.subscribe(dead_id, Interest::All, Arc::new(Dead::default())).unwrap();

        let first = router.route_to_all(&enriched("Z01")).await;
        assert!(first.removed.is_empty());
        assert!(router.subscriptions().contains(&dead_id));

        let second = router.route_to_all(&enriched("Z01")).await;
        assert_eq!(second.removed, vec![dead_id]);
    }

    #[tokio::test]
    async fn test_slow_subscriber_times_out_without_blocking_others() {
        let config = RouterConfig {
            delivery_timeout: Duration::from_millis(50),
            max_consecutive_failures: 1,
        };
        let router = started_router(TierRole::Mid, config);
        let fast = Recorder::named("fast");
        let slow_id = ClientId::new();
        router.subscribe(slow_id, Interest::All, Arc::new(Stalled)).unwrap();
        router.subscribe(ClientId::new(), Interest::All, fast.clone()).unwrap();

        let report = router.route_to_all(&enriched("Z03")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, vec![slow_id]);
        assert_eq!(fast.count(), 1);
    }

    #[tokio::test]
    async fn test_reconfiguring_drops_inbound_events() {
        let router = started_router(TierRole::Mid, RouterConfig::default());
        let sink = Recorder::named("sink");
        router.subscribe(ClientId::new(), Interest::All, sink.clone()).unwrap();

        router.disable_filtering().unwrap();
        assert_eq!(router.state(), RouterState::Reconfiguring);
        let report = router.receive_from_upstream(enriched("Z01")).await.unwrap();
        assert!(report.suppressed);
        assert_eq!(sink.count(), 0);

        router.enable_filtering().unwrap();
        router.receive_from_upstream(enriched("Z01")).await.unwrap();
        assert_eq!(sink.count(), 1);

        let stats = router.stats();
        assert_eq!(stats.events_dropped, 1);
        assert_eq!(stats.events_received, 1);
    }

    #[tokio::test]
    async fn test_reconfigure_swaps_interest() {
        let router = started_router(TierRole::Mid, RouterConfig::default());
        let sink = Recorder::named("operator");
        let client = ClientId::new();
        router.subscribe(client, Interest::zones(["Z01"]), sink.clone()).unwrap();

        router.reconfigure(&client, Interest::zones(["Z02"])).unwrap();
        assert_eq!(router.state(), RouterState::Started);

        router.forward(&enriched("Z01")).await;
        router.forward(&enriched("Z02")).await;
        assert_eq!(sink.count(), 1);

        let unknown = ClientId::new();
        assert_eq!(
            router.reconfigure(&unknown, Interest::All),
            Err(RoutingError::UnknownClient(unknown))
        );
        assert_eq!(router.state(), RouterState::Started);
    }

    #[tokio::test]
    async fn test_stopped_router_rejects() {
        let bus = Arc::new(EventBus::new());
        let router = EventRouter::new(TierRole::Origin, bus, RouterConfig::default());

        let result = router.subscribe(ClientId::new(), Interest::All, Recorder::named("x"));
        assert_eq!(result, Err(RoutingError::NotStarted(RouterState::Stopped)));
        assert!(router.receive_from_upstream(enriched("Z01")).await.is_err());
        assert!(matches!(
            router.enable_filtering(),
            Err(RoutingError::InvalidTransition { from: RouterState::Stopped, .. })
        ));

        router.start().unwrap();
        assert!(router.start().is_err());
        router.stop();
        assert_eq!(router.state(), RouterState::Stopped);
    }

    #[tokio::test]
    async fn test_three_tier_chain() {
        let terminal = started_router(TierRole::Terminal, RouterConfig::default());
        let mid = started_router(TierRole::Mid, RouterConfig::default());
        let origin = started_router(TierRole::Origin, RouterConfig::default());

        let dashboard = Recorder::named("dashboard");
        terminal.subscribe(ClientId::new(), Interest::All, dashboard.clone()).unwrap();
        mid.subscribe(ClientId::new(), Interest::All, Arc::new(Hop { next: terminal.clone() }))
            .unwrap();
        origin
            .subscribe(ClientId::new(), Interest::zones(["Z07"]), Arc::new(Hop { next: mid.clone() }))
            .unwrap();

        origin.forward(&enriched("Z07")).await;
        origin.forward(&enriched("Z08")).await;

        assert_eq!(dashboard.count(), 1);
        assert_eq!(mid.stats().events_received, 1);
        assert_eq!(terminal.stats().events_received, 1);
    }

    #[tokio::test]
    async fn test_upstream_events_reach_local_bus() {
        let bus = Arc::new(EventBus::new());
        bus.start();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.on("cache_warmer", move |_event: EnrichedEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        let router = EventRouter::new(TierRole::Mid, bus, RouterConfig::default());
        router.start().unwrap();

        let report = router.receive_from_upstream(enriched("Z01")).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_reconfiguration_resumes_after_last_enable() {
        let router = started_router(TierRole::Mid, RouterConfig::default());

        router.disable_filtering().unwrap();
        router.disable_filtering().unwrap();
        router.enable_filtering().unwrap();
        assert_eq!(router.state(), RouterState::Reconfiguring);
        router.enable_filtering().unwrap();
        assert_eq!(router.state(), RouterState::Started);

        assert!(matches!(
            router.enable_filtering(),
            Err(RoutingError::InvalidTransition { from: RouterState::Started, .. })
        ));

        router.disable_filtering().unwrap();
        router.stop();
        assert!(router.enable_filtering().is_err());
        router.start().unwrap();
        assert_eq!(router.state(), RouterState::Started);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconfigure_all_succeed() {
        let router = started_router(TierRole::Terminal, RouterConfig::default());
        let clients: Vec<ClientId> = (0..16)
            .map(|n| {
                let client = ClientId::new();
                router
                    .subscribe(client, Interest::All, Recorder::named(&format!("client-{n}")))
                    .unwrap();
                client
            })
            .collect();

        let mut tasks = Vec::new();
        for (n, client) in clients.iter().copied().enumerate() {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                let mut results = Vec::new();
                for round in 0..50 {
                    let zone = format!("Z{:02}", (n + round) % 40 + 1);
                    results.push(router.reconfigure(&client, Interest::zones([zone.as_str()])));
                    tokio::task::yield_now().await;
                }
                results
            }));
        }
        for task in tasks {
            for result in task.await.expect("worker panicked") {
                assert_eq!(result, Ok(()));
            }
        }

        assert_eq!(router.state(), RouterState::Started);
        for (n, client) in clients.iter().enumerate() {
            let zone = format!("Z{:02}", (n + 49) % 40 + 1);
            assert_eq!(router.subscriptions().interest_of(client), Some(Interest::zones([zone.as_str()])));
        }
    }
}
