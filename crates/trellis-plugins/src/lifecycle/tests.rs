//! Unit tests for the lifecycle manager and state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use trellis_config::OverridePolicy;

use super::*;
use crate::plugin::{HookError, InertPlugin, MockPlugin};
use crate::tests::{Journal, Scripted, descriptor_with, manifest, scripted_catalog};

#[derive(Debug, Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn record(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn plugin_enabling(&self, id: &str) {
        self.record(format!("enabling {id}"));
    }

    fn plugin_enabled(&self, id: &str) {
        self.record(format!("enabled {id}"));
    }

    fn plugin_failed(&self, id: &str, _error: &PluginError) {
        self.record(format!("failed {id}"));
    }

    fn plugin_skipped(&self, id: &str, ancestor: &str) {
        self.record(format!("skipped {id} after {ancestor}"));
    }

    fn plugin_disabled(&self, id: &str) {
        self.record(format!("disabled {id}"));
    }

    fn plugin_unloaded(&self, id: &str, last_state: PluginState) {
        self.record(format!("unloaded {id} from {last_state}"));
    }
}

#[fixture]
fn journal() -> Journal {
    Journal::default()
}

fn chain(journal: &Journal) -> LifecycleManager {
    let catalog = scripted_catalog(&[
        (Scripted::new("a", journal).providing("a.service"), &[]),
        (Scripted::new("b", journal).providing("b.service"), &["a"]),
        (Scripted::new("c", journal).providing("c.service"), &["b"]),
    ]);
    LifecycleManager::new(catalog, OverrideRules::default())
}

fn activate_all(manager: &LifecycleManager, options: &ActivationOptions) -> ActivationReport {
    let ids = manager.with_catalog(Catalog::ids);
    let plan = manager
        .resolve(&ids)
        .into_result()
        .expect("resolvable catalog");
    manager.activate(&plan, options)
}

#[rstest]
#[case::load(PluginState::Discovered, PluginState::Loaded, true)]
#[case::enable(PluginState::Loaded, PluginState::Enabling, true)]
#[case::enabled(PluginState::Enabling, PluginState::Enabled, true)]
#[case::enable_failed(PluginState::Enabling, PluginState::Failed, true)]
#[case::disable(PluginState::Enabled, PluginState::Disabling, true)]
#[case::disabled(PluginState::Disabling, PluginState::Disabled, true)]
#[case::reset(PluginState::Disabled, PluginState::Loaded, true)]
#[case::unload_failed(PluginState::Failed, PluginState::Unloaded, true)]
#[case::skip_enabling(PluginState::Loaded, PluginState::Enabled, false)]
#[case::unload_enabled(PluginState::Enabled, PluginState::Unloaded, false)]
#[case::failed_is_absorbing(PluginState::Failed, PluginState::Loaded, false)]
#[case::no_reenable_from_disabled(PluginState::Disabled, PluginState::Enabling, false)]
fn state_machine_edges(#[case] from: PluginState, #[case] to: PluginState, #[case] allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[rstest]
fn activation_runs_hooks_in_plan_order(journal: Journal) {
    let manager = chain(&journal);
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(report.is_success());
    assert_eq!(report.enabled(), ["a", "b", "c"]);
    assert_eq!(
        journal.entries(),
        [
            "a:configure",
            "a:activate",
            "b:configure",
            "b:activate",
            "c:configure",
            "c:activate"
        ]
    );
    assert_eq!(manager.enabled(), ["a", "b", "c"]);
    let owner = manager
        .services()
        .lookup_as::<String>("b.service")
        .expect("live service");
    assert_eq!(owner.as_str(), "b");
}

#[rstest]
fn failing_hook_skips_dependents_and_withdraws_services(journal: Journal) {
    let catalog = scripted_catalog(&[
        (Scripted::new("a", &journal), &[]),
        (
            Scripted::new("b", &journal)
                .providing("b.service")
                .failing_on(HookPhase::Activate),
            &["a"],
        ),
        (Scripted::new("c", &journal), &["b"]),
        (Scripted::new("d", &journal), &[]),
    ]);
    let observer = Arc::new(RecordingObserver::default());
    let manager = LifecycleManager::with_observer(
        catalog,
        OverrideRules::default(),
        Arc::clone(&observer) as Arc<dyn LifecycleObserver>,
    );
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(matches!(
        report.outcome("b"),
        Some(ActivationOutcome::Failed(PluginError::ActivationHook {
            phase: HookPhase::Activate,
            ..
        }))
    ));
    assert!(matches!(
        report.outcome("c"),
        Some(ActivationOutcome::Skipped { blocked_by }) if blocked_by == "b"
    ));
    assert_eq!(report.enabled(), ["a", "d"]);
    assert_eq!(manager.state("b"), Some(PluginState::Failed));
    assert_eq!(manager.state("c"), Some(PluginState::Loaded));
    assert!(!manager.services().contains("b.service"));
    assert!(observer.events().contains(&String::from("skipped c after b")));
}

#[rstest]
fn configure_failure_prevents_activate(journal: Journal) {
    let catalog = scripted_catalog(&[(
        Scripted::new("a", &journal).failing_on(HookPhase::Configure),
        &[],
    )]);
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(!report.is_success());
    assert_eq!(journal.entries(), ["a:configure"]);
}

#[rstest]
fn slow_hooks_time_out_and_lose_their_context(journal: Journal) {
    let catalog = scripted_catalog(&[(
        Scripted::new("slow", &journal)
            .providing("slow.service")
            .sleeping(Duration::from_millis(200)),
        &[],
    )]);
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    let options = ActivationOptions::default().with_hook_timeout(Duration::from_millis(20));
    let report = activate_all(&manager, &options);

    let Some(ActivationOutcome::Failed(PluginError::ActivationHook { source, phase, .. })) =
        report.outcome("slow")
    else {
        panic!("expected a hook failure");
    };
    assert_eq!(*phase, HookPhase::Activate);
    assert_eq!(source.message(), "timed out after 20ms");
    assert_eq!(manager.state("slow"), Some(PluginState::Failed));

    thread::sleep(Duration::from_millis(400));
    assert!(!manager.services().contains("slow.service"));
}

struct Exploding;

impl Plugin for Exploding {
    fn activate(&self, _context: &PluginContext) -> Result<(), HookError> {
        panic!("activation exploded");
    }
}

#[test]
fn panicking_hooks_fail_the_plugin() {
    let mut catalog = Catalog::new();
    catalog
        .insert(descriptor_with(manifest("boom", "1.0.0", &[]), Arc::new(Exploding)))
        .expect("insert");
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    let report = activate_all(&manager, &ActivationOptions::default());

    let Some(ActivationOutcome::Failed(PluginError::ActivationHook { source, .. })) =
        report.outcome("boom")
    else {
        panic!("expected a hook failure");
    };
    assert_eq!(source.message(), "hook panicked");
}

#[rstest]
fn second_activation_reports_already_enabled(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(
        report
            .outcomes()
            .iter()
            .all(|(_, outcome)| matches!(outcome, ActivationOutcome::AlreadyEnabled))
    );
    assert_eq!(journal.of_phase(HookPhase::Activate), ["a", "b", "c"]);
}

#[rstest]
fn failed_plugins_stay_failed(journal: Journal) {
    let catalog = scripted_catalog(&[(
        Scripted::new("a", &journal).failing_on(HookPhase::Activate),
        &[],
    )]);
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    activate_all(&manager, &ActivationOptions::default());
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(matches!(
        report.outcome("a"),
        Some(ActivationOutcome::Failed(PluginError::InvalidTransition {
            from: PluginState::Failed,
            to: PluginState::Enabling,
            ..
        }))
    ));
    manager.unload("a").expect("failed plugins can unload");
    assert_eq!(manager.state("a"), None);
}

#[rstest]
fn cancelled_runs_leave_plugins_loaded(journal: Journal) {
    let manager = chain(&journal);
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let report = activate_all(
        &manager,
        &ActivationOptions::default().with_cancellation(cancel),
    );

    assert!(
        report
            .outcomes()
            .iter()
            .all(|(_, outcome)| matches!(outcome, ActivationOutcome::Cancelled))
    );
    assert_eq!(manager.state("a"), Some(PluginState::Loaded));
    assert!(journal.entries().is_empty());
}

#[test]
fn dependencies_must_be_enabled_first() {
    let manager = LifecycleManager::new(
        crate::tests::catalog_of(&[("a", &[]), ("b", &["a"])]),
        OverrideRules::default(),
    );
    let plan = ActivationPlan::new(
        vec![String::from("b")],
        HashMap::from([(String::from("b"), Vec::new())]),
    );
    let report = manager.activate(&plan, &ActivationOptions::default());

    assert!(matches!(
        report.outcome("b"),
        Some(ActivationOutcome::Failed(PluginError::DependencyNotEnabled {
            dependency,
            state: PluginState::Loaded,
            ..
        })) if dependency == "a"
    ));
}

#[rstest]
fn independent_plugins_enable_in_parallel(journal: Journal) {
    let catalog = scripted_catalog(&[
        (Scripted::new("p1", &journal), &[]),
        (Scripted::new("p2", &journal), &[]),
        (Scripted::new("p3", &journal), &[]),
        (Scripted::new("p4", &journal), &["p1", "p2", "p3"]),
    ]);
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    let report = activate_all(&manager, &ActivationOptions::default().with_max_parallel(4));

    assert!(report.is_success());
    let ids: Vec<&str> = report.outcomes().iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["p1", "p2", "p3", "p4"]);
    assert_eq!(
        journal.of_phase(HookPhase::Activate).last().map(String::as_str),
        Some("p4")
    );
}

#[rstest]
fn disable_refuses_enabled_dependents_without_cascade(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());

    let error = manager.disable("a", false).expect_err("dependents active");
    assert!(matches!(
        error,
        PluginError::ActiveDependents { ref dependents, .. } if dependents == &["b", "c"]
    ));
    assert_eq!(manager.state("a"), Some(PluginState::Enabled));
}

#[rstest]
fn cascading_disable_stops_dependents_first(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());

    let report = manager.disable("a", true).expect("cascade");
    assert!(report.is_success());
    assert_eq!(report.disabled(), ["c", "b", "a"]);
    assert_eq!(journal.of_phase(HookPhase::Deactivate), ["c", "b", "a"]);
    assert!(manager.services().is_empty());
    assert!(manager.enabled().is_empty());
}

#[rstest]
fn disabled_plugins_can_be_enabled_again(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());
    manager.disable("c", false).expect("leaf disable");
    assert_eq!(manager.state("c"), Some(PluginState::Disabled));

    let report = activate_all(&manager, &ActivationOptions::default());
    assert!(matches!(report.outcome("c"), Some(ActivationOutcome::Enabled)));
    assert!(manager.services().contains("c.service"));
}

#[rstest]
fn reset_and_unload_follow_the_state_machine(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());

    assert!(matches!(
        manager.unload("c"),
        Err(PluginError::InvalidTransition {
            from: PluginState::Enabled,
            to: PluginState::Unloaded,
            ..
        })
    ));
    manager.disable("c", false).expect("leaf disable");
    manager.reset("c").expect("disabled resets");
    assert_eq!(manager.state("c"), Some(PluginState::Loaded));
    manager.unload("c").expect("loaded unloads");
    assert_eq!(manager.state("c"), None);
    assert!(matches!(
        manager.unload("c"),
        Err(PluginError::UnknownPlugin { .. })
    ));
}

#[rstest]
fn disabling_a_loaded_plugin_is_rejected(journal: Journal) {
    let manager = chain(&journal);
    assert!(matches!(
        manager.disable("a", true),
        Err(PluginError::InvalidTransition {
            from: PluginState::Loaded,
            to: PluginState::Disabling,
            ..
        })
    ));
}

#[rstest]
fn deactivate_failure_marks_the_plugin_failed(journal: Journal) {
    let catalog = scripted_catalog(&[(
        Scripted::new("a", &journal)
            .providing("a.service")
            .failing_on(HookPhase::Deactivate),
        &[],
    )]);
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    activate_all(&manager, &ActivationOptions::default());

    let report = manager.disable("a", false).expect("preconditions hold");
    assert!(matches!(
        report.failures(),
        [PluginError::ActivationHook {
            phase: HookPhase::Deactivate,
            ..
        }]
    ));
    assert_eq!(manager.state("a"), Some(PluginState::Failed));
    assert!(!manager.services().contains("a.service"));
}

#[rstest]
fn shutdown_disables_in_reverse_and_empties_the_catalog(journal: Journal) {
    let manager = chain(&journal);
    activate_all(&manager, &ActivationOptions::default());

    let report = manager.shutdown();
    assert!(report.is_success());
    assert_eq!(report.disabled(), ["c", "b", "a"]);
    assert!(manager.states().is_empty());
}

#[test]
fn overrides_notify_the_displaced_plugin() {
    let mut original = MockPlugin::new();
    original.expect_configure().returning(|_| Ok(()));
    original.expect_activate().returning(|context| {
        context
            .register_service("shared.cache", 1_u32)
            .map_err(|error| HookError::with_source("register", error))
    });
    original
        .expect_service_displaced()
        .withf(|key: &str, new_owner: &str| key == "shared.cache" && new_owner == "replacement")
        .times(1)
        .return_const(());

    let mut replacement = MockPlugin::new();
    replacement.expect_configure().returning(|_| Ok(()));
    replacement.expect_activate().returning(|context| {
        context
            .override_service("shared.cache", 2_u32)
            .map(|_| ())
            .map_err(|error| HookError::with_source("override", error))
    });

    let mut catalog = Catalog::new();
    for (id, entry) in [
        ("original", Arc::new(original) as Arc<dyn Plugin>),
        ("replacement", Arc::new(replacement) as Arc<dyn Plugin>),
    ] {
        catalog
            .insert(descriptor_with(manifest(id, "1.0.0", &[]), entry))
            .expect("insert");
    }
    let rules = OverrideRules {
        allow_override: true,
        policy: OverridePolicy::Replace,
    };
    let manager = LifecycleManager::new(catalog, rules);
    let report = activate_all(&manager, &ActivationOptions::default());

    assert!(report.is_success());
    assert_eq!(
        manager.services().owner_of("shared.cache").as_deref(),
        Some("replacement")
    );
    let value = manager
        .services()
        .lookup_as::<u32>("shared.cache")
        .expect("overridden value");
    assert_eq!(*value, 2);
}

#[test]
fn manifest_extension_points_are_declared_on_enable() {
    let mut catalog = Catalog::new();
    catalog
        .insert(descriptor_with(
            manifest("host", "1.0.0", &[]).with_extension_point("host.widgets"),
            Arc::new(crate::plugin::InertPlugin),
        ))
        .expect("insert");
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    activate_all(&manager, &ActivationOptions::default());

    assert_eq!(
        manager.extensions().owner_of("host.widgets").as_deref(),
        Some("host")
    );
    manager.disable("host", false).expect("disable");
    assert!(manager.extensions().owner_of("host.widgets").is_none());
}

/// Publishes `farewell` both while starting and while stopping.
struct Lingering;

impl Plugin for Lingering {
    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        context
            .register_service("farewell", "hello")
            .map_err(|error| HookError::with_source("register", error))
    }

    fn deactivate(&self, context: &PluginContext) -> Result<(), HookError> {
        context
            .register_service("farewell", "goodbye")
            .map_err(|error| HookError::with_source("register", error))?;
        context
            .declare_extension_point("farewell.cards")
            .map_err(|error| HookError::with_source("declare", error))
    }
}

#[rstest]
#[case::clean_stop(false)]
#[case::failing_stop(true)]
fn registrations_made_while_stopping_are_withdrawn(#[case] fail_after_registering: bool) {
    struct Stopping {
        fail: bool,
    }

    impl Plugin for Stopping {
        fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
            Lingering.activate(context)
        }

        fn deactivate(&self, context: &PluginContext) -> Result<(), HookError> {
            Lingering.deactivate(context)?;
            if self.fail {
                return Err(HookError::new("stop failed"));
            }
            Ok(())
        }
    }

    let mut catalog = Catalog::new();
    catalog
        .insert(descriptor_with(
            manifest("r", "1.0.0", &[]),
            Arc::new(Stopping {
                fail: fail_after_registering,
            }),
        ))
        .expect("insert");
    let manager = LifecycleManager::new(catalog, OverrideRules::default());
    let report = activate_all(&manager, &ActivationOptions::default());
    assert!(report.is_success());
    assert!(manager.get_service("farewell").is_ok());

    let disabled = manager.disable("r", false).expect("disable starts");
    assert_eq!(disabled.is_success(), !fail_after_registering);
    let expected = if fail_after_registering {
        PluginState::Failed
    } else {
        PluginState::Disabled
    };
    assert_eq!(manager.state("r"), Some(expected));
    assert!(matches!(
        manager.get_service("farewell"),
        Err(PluginError::NotFound { .. })
    ));
    assert!(matches!(
        manager.extensions().extensions("farewell.cards"),
        Err(PluginError::UnknownExtensionPoint { .. })
    ));
}

/// Raises the shared flag from inside its own activation.
struct Cancelling {
    cancel: CancellationFlag,
}

impl Plugin for Cancelling {
    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        context
            .register_service("a.service", 1_u8)
            .map_err(|error| HookError::with_source("register", error))?;
        self.cancel.cancel();
        Ok(())
    }
}

#[test]
fn cancelling_mid_run_keeps_enabled_plugins_and_stops_the_rest() {
    let cancel = CancellationFlag::new();
    let mut catalog = Catalog::new();
    catalog
        .insert(descriptor_with(
            manifest("a", "1.0.0", &[]),
            Arc::new(Cancelling {
                cancel: cancel.clone(),
            }),
        ))
        .expect("insert a");
    catalog
        .insert(descriptor_with(
            manifest("b", "1.0.0", &["a"]),
            Arc::new(InertPlugin),
        ))
        .expect("insert b");
    let manager = LifecycleManager::new(catalog, OverrideRules::default());

    let report = activate_all(
        &manager,
        &ActivationOptions::default().with_cancellation(cancel.clone()),
    );

    assert!(cancel.is_cancelled());
    assert!(matches!(report.outcome("a"), Some(ActivationOutcome::Enabled)));
    assert!(matches!(report.outcome("b"), Some(ActivationOutcome::Cancelled)));
    assert_eq!(manager.state("a"), Some(PluginState::Enabled));
    assert_eq!(manager.state("b"), Some(PluginState::Loaded));
    assert!(manager.get_service("a.service").is_ok());
}
