//! Suspend/resume behaviour tests
//!
//! These drive the controller against the in-memory platform and check the
//! observable core state after each pass.

use amperage::{
    HotplugController, PowerEvent, PowerStateHandler, RestoreMode, SimulatedCpus, TunableStore,
    Tunables,
};
use proptest::prelude::*;
use std::sync::Arc;

fn controller(total: usize) -> HotplugController<SimulatedCpus> {
    HotplugController::new(
        SimulatedCpus::new(total),
        Arc::new(TunableStore::with_defaults(total)),
    )
}

#[test]
fn test_four_cores_without_powersave() {
    let mut ctl = controller(4);

    ctl.on_suspend();
    assert_eq!(
        ctl.platform().transitions(),
        vec![(3, false), (2, false), (1, false)]
    );
    assert!(ctl.platform().online_cores().contains(&0));

    ctl.platform().clear_transitions();
    ctl.on_resume();
    assert_eq!(
        ctl.platform().transitions(),
        vec![(1, true), (2, true), (3, true)]
    );
    assert_eq!(ctl.platform().online_cores(), vec![0, 1, 2, 3]);
}

#[test]
fn test_threshold_restore_skips_slow_cores() {
    let mut ctl = controller(4);
    let store = Arc::clone(ctl.tunables());
    store.set_powersave_enabled(true).unwrap();
    store.set_restore_mode(RestoreMode::ThresholdRestore).unwrap();
    store.set_plugging_threshold(1_497_000).unwrap();

    let cpus = ctl.platform();
    cpus.set_frequency(1, 1_600_000);
    cpus.set_frequency(2, 1_200_000);
    cpus.set_frequency(3, 1_497_000);

    ctl.on_suspend();
    ctl.platform().clear_transitions();
    ctl.on_resume();

    assert_eq!(ctl.platform().transitions(), vec![(1, true), (3, true)]);
    assert_eq!(ctl.platform().online_cores(), vec![0, 1, 3]);
}

#[test]
fn test_threshold_ignored_without_powersave() {
    let mut ctl = controller(4);
    let store = Arc::clone(ctl.tunables());
    store.set_restore_mode(RestoreMode::ThresholdRestore).unwrap();
    store.set_plugging_threshold(u64::MAX).unwrap();

    ctl.on_suspend();
    ctl.on_resume();
    assert_eq!(ctl.platform().online_count(), 4);
}

#[test]
fn test_powersave_full_restore_uses_plug_percent() {
    let mut ctl = controller(4);
    let store = Arc::clone(ctl.tunables());
    store.set_plug_percent(25).unwrap();
    store.set_powersave_enabled(true).unwrap();

    ctl.on_suspend();
    ctl.on_resume();
    assert_eq!(ctl.platform().online_cores(), vec![0, 1]);
}

#[test]
fn test_max_cores_caps_full_restore() {
    let mut ctl = controller(8);
    ctl.tunables().set_max_cores_online(3).unwrap();

    ctl.on_suspend();
    ctl.on_resume();
    assert_eq!(ctl.platform().online_cores(), vec![0, 1, 2]);
}

#[test]
fn test_rejected_write_keeps_previous_values() {
    let ctl = controller(4);
    let store = ctl.tunables();
    store.set_max_cores_online(2).unwrap();
    let before = store.snapshot();

    assert!(store.set_min_cores_online(3).is_err());
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_tunable_changes_apply_to_next_pass() {
    let mut ctl = controller(4);
    ctl.on_suspend();
    ctl.tunables().set_max_cores_online(2).unwrap();
    ctl.on_resume();
    assert_eq!(ctl.platform().online_cores(), vec![0, 1]);
}

#[test]
fn test_suspend_is_idempotent() {
    let mut ctl = controller(4);
    ctl.on_suspend();
    let once = ctl.platform().online_cores();
    ctl.on_suspend();
    assert_eq!(ctl.platform().online_cores(), once);
}

#[test]
fn test_resume_is_idempotent() {
    let mut ctl = controller(4);
    ctl.tunables().set_max_cores_online(3).unwrap();
    ctl.on_suspend();
    ctl.on_resume();
    let once = ctl.platform().online_cores();
    ctl.on_resume();
    assert_eq!(ctl.platform().online_cores(), once);
}

#[test]
fn test_failing_core_does_not_block_others() {
    let mut ctl = controller(6);
    ctl.platform().fail_core(3);

    ctl.on_suspend();
    let attempted: Vec<usize> = ctl.platform().transitions().iter().map(|t| t.0).collect();
    assert_eq!(attempted, vec![5, 4, 3, 2, 1]);
    assert_eq!(ctl.platform().online_cores(), vec![0, 3]);

    // Left online, then retried on the next suspend
    ctl.platform().heal_core(3);
    ctl.on_resume();
    ctl.on_suspend();
    assert_eq!(ctl.platform().online_cores(), vec![0]);
}

#[test]
fn test_failing_core_on_resume_does_not_block_others() {
    let mut ctl = controller(4);
    ctl.on_suspend();
    ctl.platform().fail_core(1);
    ctl.platform().clear_transitions();

    ctl.on_resume();
    assert_eq!(
        ctl.platform().transitions(),
        vec![(1, true), (2, true), (3, true)]
    );
    assert_eq!(ctl.last_pass().unwrap().failed, vec![1]);
    assert_eq!(ctl.platform().online_cores(), vec![0, 2, 3]);
}

#[test]
fn test_duplicate_notifications_are_ignored() {
    let mut ctl = controller(4);
    assert!(!ctl.handle(PowerEvent::Resume));
    assert!(ctl.handle(PowerEvent::Suspend));
    assert!(!ctl.handle(PowerEvent::Suspend));
    assert!(ctl.handle(PowerEvent::Resume));
}

fn valid_tunables() -> impl Strategy<Value = (usize, Tunables, Vec<u64>)> {
    (2usize..=16).prop_flat_map(|total| {
        (1..=total).prop_flat_map(move |max| {
            (
                1..=max,
                1u8..=100,
                any::<bool>(),
                any::<bool>(),
                0u64..3_000_000,
                prop::collection::vec(0u64..3_000_000, total),
            )
                .prop_map(move |(min, percent, powersave, threshold_mode, threshold, freqs)| {
                    let tunables = Tunables {
                        min_cores_online: min,
                        max_cores_online: max,
                        plug_percent: percent,
                        plugging_threshold: threshold,
                        powersave_enabled: powersave,
                        restore_mode: if threshold_mode {
                            RestoreMode::ThresholdRestore
                        } else {
                            RestoreMode::FullRestore
                        },
                    };
                    (total, tunables, freqs)
                })
        })
    })
}

proptest! {
    #[test]
    fn test_resume_respects_core_bounds((total, tunables, freqs) in valid_tunables()) {
        let store = Arc::new(TunableStore::new(total, tunables).unwrap());
        let cpus = SimulatedCpus::new(total);
        for (core, freq) in freqs.iter().enumerate() {
            cpus.set_frequency(core, *freq);
        }
        let mut ctl = HotplugController::new(cpus, store);

        ctl.on_suspend();
        ctl.on_resume();

        let online = ctl.platform().online_count();
        prop_assert!(online >= tunables.min_cores_online);
        prop_assert!(online <= tunables.max_cores_online);
        prop_assert!(ctl.platform().online_cores().contains(&0));
    }
}
