//! Lifecycle ordering under random latencies and wait policies
//!
//! Every task (module registration, deferred registration, mock server start,
//! data fetches) gets a random delay on a paused tokio clock, which yields a
//! random completion order for the independent producers.

mod common;

use common::{drain, local_module, position, remote_module, DelayedMockServer, ModuleBehavior, TestData};
use libshellboot::config::BootstrapConfig;
use libshellboot::session::BootstrapSession;
use proptest::prelude::*;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Setup {
    wait_for_msw: bool,
    wait_for_public_data: bool,
    wait_for_protected_data: bool,
    protected_route: bool,
    local: Vec<ModuleBehavior>,
    remote: Vec<ModuleBehavior>,
    msw_delay: u64,
    public_delay: u64,
    protected_delay: u64,
}

fn behavior() -> impl Strategy<Value = ModuleBehavior> {
    (0u64..40, any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(delay, fails, deferred, deferred_fails)| ModuleBehavior {
            delay: Duration::from_millis(delay),
            fails,
            deferred,
            deferred_fails,
        },
    )
}

fn setup() -> impl Strategy<Value = Setup> {
    (
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
        prop::collection::vec(behavior(), 0..4),
        prop::collection::vec(behavior(), 0..4),
        (0u64..40, 0u64..40, 0u64..40),
    )
        .prop_map(
            |((msw, public, protected, protected_route), local, remote, (msw_delay, public_delay, protected_delay))| {
                Setup {
                    wait_for_msw: msw,
                    wait_for_public_data: public,
                    wait_for_protected_data: protected,
                    protected_route,
                    local,
                    remote,
                    msw_delay,
                    public_delay,
                    protected_delay,
                }
            },
        )
}

/// Bootstrap once on a paused clock and return the names of every emitted
/// event, or `None` when the session never settled
fn bootstrap(setup: &Setup) -> Option<Vec<String>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(run(setup))
}

async fn run(setup: &Setup) -> Option<Vec<String>> {
    let config = BootstrapConfig {
        wait_for_msw: setup.wait_for_msw,
        wait_for_public_data: setup.wait_for_public_data,
        wait_for_protected_data: setup.wait_for_protected_data,
        event_capacity: 256,
    };
    let data = Arc::new(TestData {
        public_delay: Duration::from_millis(setup.public_delay),
        protected_delay: Duration::from_millis(setup.protected_delay),
        ..TestData::default()
    });
    let session = BootstrapSession::<usize>::builder(config, data)
        .mock_server(Arc::new(DelayedMockServer(Duration::from_millis(setup.msw_delay))))
        .build();
    let mut events = session.events();
    session.set_active_route_protected(setup.protected_route);

    let calls = Arc::new(AtomicUsize::new(0));
    let local: Vec<_> = setup
        .local
        .iter()
        .enumerate()
        .map(|(index, behavior)| local_module(&format!("local-{}", index), *behavior, &calls))
        .collect();
    let remote: Vec<_> = setup
        .remote
        .iter()
        .enumerate()
        .map(|(index, behavior)| remote_module(&format!("remote-{}", index), *behavior, &calls))
        .collect();

    session.start(local, remote, None).await.ok()?;
    tokio::time::timeout(Duration::from_secs(60), session.wait_until_ready())
        .await
        .ok()?;
    // Let trailing effects settle
    tokio::time::sleep(Duration::from_millis(200)).await;

    Some(drain(&mut events))
}

fn assert_before(names: &[String], earlier: &str, later: &str) -> Result<(), TestCaseError> {
    if let (Some(earlier_at), Some(later_at)) = (position(names, earlier), position(names, later)) {
        prop_assert!(
            earlier_at < later_at,
            "{} should precede {} in {:?}",
            earlier,
            later,
            names
        );
    }
    Ok(())
}

const DATA_EVENTS: [&str; 4] = [
    "public-data-fetch-started",
    "public-data-ready",
    "protected-data-fetch-started",
    "protected-data-ready",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn lifecycle_events_respect_causal_order(setup in setup()) {
        let names = bootstrap(&setup);
        prop_assert!(names.is_some(), "bootstrap never settled for {:?}", setup);
        let names = names.unwrap_or_default();

        for origin in ["local", "remote"] {
            assert_before(&names, "bootstrapping-started", &format!("{}-modules-registration-started", origin))?;
            let registration_completed = format!("{}-modules-registration-completed", origin);
            prop_assert!(position(&names, &registration_completed).is_some());
            assert_before(&names, &format!("{}-modules-registration-completed", origin), "modules-registered")?;
            assert_before(&names, &format!("{}-deferred-registrations-completed", origin), "modules-ready")?;
            for data_event in ["public-data-ready", "protected-data-ready"] {
                assert_before(&names, data_event, &format!("{}-deferred-registrations-started", origin))?;
            }
        }

        assert_before(&names, "modules-registered", "msw-ready")?;
        for data_event in DATA_EVENTS {
            assert_before(&names, "modules-registered", data_event)?;
            if setup.wait_for_msw {
                assert_before(&names, "msw-ready", data_event)?;
            }
        }
        assert_before(&names, "public-data-fetch-started", "public-data-ready")?;
        assert_before(&names, "protected-data-fetch-started", "protected-data-ready")?;
        assert_before(&names, "modules-ready", "application-bootstrapped")?;

        // Absent subsystems are skipped
        prop_assert_eq!(position(&names, "msw-ready").is_some(), setup.wait_for_msw);
        prop_assert_eq!(position(&names, "public-data-ready").is_some(), setup.wait_for_public_data);
        prop_assert_eq!(
            position(&names, "protected-data-ready").is_some(),
            setup.wait_for_protected_data && setup.protected_route
        );
        prop_assert!(position(&names, "unauthorized").is_none());
        prop_assert_eq!(
            names.iter().filter(|name| *name == "application-bootstrapped").count(),
            1
        );
    }
}
