//! Tests for Orchestrator, driven by in-memory collaborators on paused time.

#[cfg(test)]
mod tests {
    use crate::config::{BackoffConfig, OrchestratorConfig, StartFailurePolicy};
    use crate::error::{GraphError, JunbanError, ServiceError};
    use crate::graph::{Service, ServiceGraph};
    use crate::mock::{Event, Journal, MockBackend, MockProber, ProbeScript};
    use crate::orchestrator::{Orchestrator, ServiceState};
    use crate::probe::ReadinessCheck;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};
    use tokio_util::sync::CancellationToken;

    fn check(name: &str) -> ReadinessCheck {
        let port = match name {
            "db" => 5432,
            "cache" => 6379,
            "web" => 8000,
            _ => 9000,
        };
        ReadinessCheck::tcp(name, port)
    }

    fn service(name: &str, deps: &[&str]) -> Service {
        Service::new(name, check(name))
            .with_dependencies(deps.iter().copied())
            .with_max_wait(Duration::from_secs(10))
            .with_retry_interval(Duration::from_secs(2))
    }

    fn graph(services: Vec<Service>) -> ServiceGraph {
        let mut graph = ServiceGraph::new();
        for service in services {
            graph.add_service(service).unwrap();
        }
        graph
    }

    /// db and cache have no dependencies; web needs both.
    fn web_stack() -> ServiceGraph {
        graph(vec![
            service("db", &[]),
            service("cache", &[]),
            service("web", &["db", "cache"]),
        ])
    }

    fn orchestrator(
        backend: &Arc<MockBackend>,
        prober: &Arc<MockProber>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        Orchestrator::with_config(backend.clone(), prober.clone(), config)
    }

    fn start_time(journal: &Journal, service: &str) -> Instant {
        journal
            .events()
            .into_iter()
            .find_map(|e| match e {
                Event::Start { service: s, at } if s == service => Some(at),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_starts_nothing() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new());
        let graph = graph(vec![
            service("a", &["c"]),
            service("b", &["a"]),
            service("c", &["b"]),
            service("d", &[]),
        ]);

        let result = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await;

        match result {
            Err(JunbanError::Graph(GraphError::Cycle { path })) => {
                assert_eq!(path, vec!["a", "c", "b", "a"]);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
        assert!(backend.started().is_empty());
        assert!(prober.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_dependency_starts_nothing() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new());
        let graph = graph(vec![service("web", &["db"])]);

        let err = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JunbanError::Graph(GraphError::UnknownDependency { .. })
        ));
        assert!(backend.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new());
        let graph = graph(vec![service("db", &[])]);

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Ready);
        assert!(db.started);
        assert!(db.ready);
        assert_eq!(db.attempts, 1);
        assert_eq!(db.elapsed, Duration::ZERO);
        assert!(db.last_error.is_none());
        assert!(report.overall_ok);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_exhausts_attempts() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new().script(check("db"), ProbeScript::NeverReady));
        let graph = graph(vec![service("db", &[])]);

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Failed);
        assert_eq!(db.attempts, 5);
        assert_eq!(db.probes.len(), 5);
        assert!(db.elapsed >= Duration::from_secs(10));
        assert!(db.elapsed < Duration::from_secs(11));
        match &db.last_error {
            Some(ServiceError::ProbeTimeout {
                attempts,
                last_failure,
                ..
            }) => {
                assert_eq!(*attempts, 5);
                assert!(last_failure.contains("refused"));
            }
            other => panic!("expected probe timeout, got {:?}", other),
        }

        let times: Vec<Instant> = prober.calls().iter().map(|c| c.at).collect();
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(2));
        }
        assert!(!report.overall_ok);
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_web_stack_becomes_ready_in_order() {
        let journal = Journal::new();
        let backend = Arc::new(MockBackend::new().with_journal(journal.clone()));
        let prober = Arc::new(
            MockProber::new()
                .with_journal(journal.clone())
                .script(check("cache"), ProbeScript::ReadyOnAttempt(2))
                .script(check("web"), ProbeScript::ReadyOnAttempt(3)),
        );

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&web_stack())
            .await
            .unwrap();

        assert!(report.overall_ok);
        assert_eq!(
            report.layers,
            vec![vec!["cache".to_string(), "db".to_string()], vec!["web".to_string()]]
        );
        assert_eq!(report.get("db").unwrap().attempts, 1);
        assert_eq!(report.get("cache").unwrap().attempts, 2);
        assert_eq!(report.get("web").unwrap().attempts, 3);

        let web_start = journal.start_index("web").unwrap();
        assert!(journal.ready_index(&check("db")).unwrap() < web_start);
        assert!(journal.ready_index(&check("cache")).unwrap() < web_start);

        // web waits for cache's second probe, one retry interval in.
        let web_at = start_time(&journal, "web");
        let db_at = start_time(&journal, "db");
        assert_eq!(web_at - db_at, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_web_ready_on_third_attempt_after_its_dependencies() {
        let stack = graph(vec![
            service("db", &[]),
            service("cache", &[]),
            service("web", &["db", "cache"]).with_retry_interval(Duration::from_secs(1)),
        ]);
        let journal = Journal::new();
        let backend = Arc::new(MockBackend::new().with_journal(journal.clone()));
        let prober = Arc::new(
            MockProber::new()
                .with_journal(journal.clone())
                .script(check("web"), ProbeScript::ReadyOnAttempt(3)),
        );

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&stack)
            .await
            .unwrap();

        assert!(report.overall_ok);
        assert_eq!(
            report.layers,
            vec![vec!["cache".to_string(), "db".to_string()], vec!["web".to_string()]]
        );
        assert_eq!(report.get("db").unwrap().attempts, 1);
        assert_eq!(report.get("cache").unwrap().attempts, 1);

        let web = report.get("web").unwrap();
        assert_eq!(web.state, ServiceState::Ready);
        assert_eq!(web.attempts, 3);
        assert_eq!(web.elapsed, Duration::from_secs(2));

        let web_start = journal.start_index("web").unwrap();
        assert!(journal.ready_index(&check("db")).unwrap() < web_start);
        assert!(journal.ready_index(&check("cache")).unwrap() < web_start);
        assert_eq!(start_time(&journal, "web"), start_time(&journal, "db"));

        let attempts: Vec<Instant> = prober.calls_for(&check("web")).iter().map(|c| c.at).collect();
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_halts_dependents() {
        let backend = Arc::new(MockBackend::new().fail_start("db", "port 5432 already in use"));
        let prober = Arc::new(MockProber::new());

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&web_stack())
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Failed);
        assert!(!db.started);
        assert_eq!(db.attempts, 0);
        assert!(prober.calls_for(&check("db")).is_empty());
        assert!(matches!(db.last_error, Some(ServiceError::Start { .. })));

        // Same layer, so cache still ran.
        assert!(report.get("cache").unwrap().is_ready());

        let web = report.get("web").unwrap();
        assert_eq!(web.state, ServiceState::Pending);
        assert!(!web.started);
        assert_eq!(
            web.last_error,
            Some(ServiceError::DependencyNotReady {
                service: "web".to_string(),
                dependency: "db".to_string(),
            })
        );
        assert_eq!(backend.started(), vec!["cache", "db"]);
        assert!(!report.overall_ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted_service_without_failed_dependency() {
        let backend = Arc::new(MockBackend::new().fail_start("db", "boom"));
        let prober = Arc::new(MockProber::new());
        let graph = graph(vec![
            service("db", &[]),
            service("cache", &[]),
            service("web", &["db"]),
            service("worker", &["cache", "web"]),
        ]);

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap();

        assert!(matches!(
            report.get("web").unwrap().last_error,
            Some(ServiceError::DependencyNotReady { .. })
        ));
        // cache is ready; web is pending, so worker names web.
        assert_eq!(
            report.get("worker").unwrap().last_error,
            Some(ServiceError::DependencyNotReady {
                service: "worker".to_string(),
                dependency: "web".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_after_halt_in_reverse_order() {
        let backend = Arc::new(
            MockBackend::new()
                .with_cleanup("db")
                .with_cleanup("cache")
                .with_cleanup("web"),
        );
        let prober = Arc::new(MockProber::new().script(check("web"), ProbeScript::NeverReady));

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&web_stack())
            .await
            .unwrap();

        assert_eq!(backend.cleaned_up(), vec!["db", "cache"]);
        assert!(report.get("db").unwrap().cleaned_up);
        assert!(report.get("cache").unwrap().cleaned_up);
        assert!(!report.get("web").unwrap().cleaned_up);
        // Cleanup does not change readiness in the report.
        assert!(report.get("db").unwrap().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_errors_are_not_raised() {
        let backend = Arc::new(
            MockBackend::new()
                .fail_cleanup("db", "pg_ctl: no server running")
                .with_cleanup("cache"),
        );
        let prober = Arc::new(MockProber::new().script(check("web"), ProbeScript::NeverReady));

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&web_stack())
            .await
            .unwrap();

        assert_eq!(backend.cleaned_up(), vec!["db", "cache"]);
        assert!(!report.get("db").unwrap().cleaned_up);
        assert!(report.get("cache").unwrap().cleaned_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_disabled() {
        let backend = Arc::new(MockBackend::new().with_cleanup("db"));
        let prober = Arc::new(MockProber::new().script(check("web"), ProbeScript::NeverReady));
        let config = OrchestratorConfig {
            cleanup_on_failure: false,
            ..Default::default()
        };

        let report = orchestrator(&backend, &prober, config)
            .run(&web_stack())
            .await
            .unwrap();

        assert!(backend.cleaned_up().is_empty());
        assert!(!report.overall_ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_at_retry_boundary() {
        let backend = Arc::new(MockBackend::new().with_cleanup("cache"));
        let prober = Arc::new(MockProber::new().script(check("db"), ProbeScript::NeverReady));
        let graph = graph(vec![
            service("db", &[]).with_max_wait(Duration::from_secs(60)),
            service("cache", &[]),
            service("web", &["db", "cache"]),
        ]);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(5_500)).await;
            canceller.cancel();
        });

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run_with_cancellation(&graph, token)
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Failed);
        match db.last_error {
            Some(ServiceError::Cancelled { attempts, .. }) => assert_eq!(attempts, 3),
            ref other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(db.elapsed < Duration::from_secs(6));

        assert!(report.cancelled);
        assert_eq!(report.get("web").unwrap().state, ServiceState::Pending);
        // Ready services are left running.
        assert!(backend.cleaned_up().is_empty());
        assert!(report.get("cache").unwrap().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_run() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new());
        let token = CancellationToken::new();
        token.cancel();

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run_with_cancellation(&web_stack(), token)
            .await
            .unwrap();

        assert!(backend.started().is_empty());
        assert!(report.cancelled);
        assert_eq!(report.results.len(), 3);
        assert!(report
            .results
            .values()
            .all(|r| r.state == ServiceState::Pending));
        assert_eq!(
            report.get("db").unwrap().last_error,
            Some(ServiceError::Halted {
                service: "db".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_schedule() {
        let prober = Arc::new(MockProber::new().script(check("db"), ProbeScript::ReadyOnAttempt(5)));
        let backend = Arc::new(MockBackend::new());
        let config = OrchestratorConfig {
            backoff: BackoffConfig {
                max_interval_seconds: 4,
                ..BackoffConfig::exponential()
            },
            ..Default::default()
        };
        let graph = graph(vec![service("db", &[])
            .with_retry_interval(Duration::from_secs(1))
            .with_max_wait(Duration::from_secs(10))]);

        let report = orchestrator(&backend, &prober, config)
            .run(&graph)
            .await
            .unwrap();

        let gaps: Vec<u64> = prober
            .calls()
            .windows(2)
            .map(|pair| (pair[1].at - pair[0].at).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 4]);
        assert_eq!(report.get("db").unwrap().attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_once_after_start_failure() {
        let backend = Arc::new(
            MockBackend::new()
                .fail_start("db", "exit status 1")
                .fail_start("cache", "exit status 1"),
        );
        let prober = Arc::new(MockProber::new().script(check("cache"), ProbeScript::NeverReady));
        let config = OrchestratorConfig {
            start_failure: StartFailurePolicy::ProbeOnce,
            ..Default::default()
        };

        let report = orchestrator(&backend, &prober, config)
            .run(&web_stack())
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Ready);
        assert!(!db.started);
        assert_eq!(db.attempts, 1);
        assert!(matches!(db.last_error, Some(ServiceError::Start { .. })));

        let cache = report.get("cache").unwrap();
        assert_eq!(cache.state, ServiceState::Failed);
        assert_eq!(cache.attempts, 1);
        assert!(matches!(cache.last_error, Some(ServiceError::Start { .. })));
        assert_eq!(prober.calls_for(&check("cache")).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_probe_fails_without_retry() {
        let backend = Arc::new(MockBackend::new());
        let prober = Arc::new(MockProber::new().script(
            check("db"),
            ProbeScript::Invalid("invalid url 'localhost'".to_string()),
        ));
        let graph = graph(vec![service("db", &[])]);

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap();

        let db = report.get("db").unwrap();
        assert_eq!(db.state, ServiceState::Failed);
        assert_eq!(db.attempts, 1);
        assert!(matches!(
            db.last_error,
            Some(ServiceError::InvalidProbe { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_services_probe_concurrently() {
        let journal = Journal::new();
        let backend = Arc::new(MockBackend::new().with_journal(journal.clone()));
        let prober = Arc::new(
            MockProber::new()
                .with_journal(journal.clone())
                .with_latency(Duration::from_secs(3)),
        );

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&web_stack())
            .await
            .unwrap();

        assert!(report.overall_ok);
        let web_at = start_time(&journal, "web");
        let db_at = start_time(&journal, "db");
        assert_eq!(web_at - db_at, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_ready_before_start() {
        let journal = Journal::new();
        let backend = Arc::new(MockBackend::new().with_journal(journal.clone()));
        let mut prober = MockProber::new().with_journal(journal.clone());
        let services = vec![
            service("a", &[]),
            service("b", &["a"]),
            service("c", &["a"]),
            service("d", &["b", "c"]),
            service("e", &[]),
            service("f", &["d", "e"]),
        ];
        for (i, s) in services.iter().enumerate() {
            prober = prober.script(
                s.readiness().clone(),
                ProbeScript::ReadyOnAttempt((i % 3 + 1) as u32),
            );
        }
        let graph = graph(services);
        let prober = Arc::new(prober);

        let report = orchestrator(&backend, &prober, OrchestratorConfig::default())
            .run(&graph)
            .await
            .unwrap();

        assert!(report.overall_ok);
        for service in graph.services() {
            let started = journal.start_index(service.name()).unwrap();
            for dep in service.dependencies() {
                let dep_check = graph.get(dep).unwrap().readiness();
                assert!(journal.ready_index(dep_check).unwrap() < started);
            }
        }
    }
}
