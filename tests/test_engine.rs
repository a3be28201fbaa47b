mod common;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{mixture, sinusoids, with_pulses, Probe};
use icapp::{
    epoch_around, remove_and_interpolate, retained_energy, total_energy, Decomposition, EngineConfig, Error,
    InterpolationWindow, LinearDecomposition, OnsetSet, RecomputeEngine, Target,
};
use ndarray::Array3;
use parking_lot::Mutex;

/// No baseline steps, so reconstructions are exact linear algebra.
fn raw_config() -> EngineConfig {
    EngineConfig {
        apply_baseline: false,
        rebaseline: false,
        ..EngineConfig::default()
    }
}

fn engine_with_probe(excluded: &[usize]) -> (RecomputeEngine, Arc<Probe>, Array3<f64>) {
    let (epochs, ica) = mixture(3, 5, 4, 120);
    let probe = Arc::new(Probe::new(ica));
    let engine = RecomputeEngine::new(
        epochs.clone(),
        Arc::clone(&probe) as Arc<dyn Decomposition>,
        excluded.iter().copied(),
        raw_config(),
    )
    .unwrap();
    (engine, probe, epochs)
}

#[test]
fn nothing_excluded_keeps_all_energy() {
    let (engine, _, epochs) = engine_with_probe(&[]);
    let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(current.data, epochs);
    approx::assert_abs_diff_eq!(current.retained_energy, 100.0, epsilon = 1e-12);
}

#[test]
fn excluding_every_component_keeps_nothing() {
    let (engine, _, _) = engine_with_probe(&[0, 1, 2, 3]);
    let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    approx::assert_abs_diff_eq!(current.retained_energy, 0.0, epsilon = 1e-12);
}

#[test]
fn repeated_request_is_served_from_cache() {
    let (engine, probe, _) = engine_with_probe(&[1]);
    let a = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    let b = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(probe.calls(), 1);
    assert_eq!(engine.computations(), 1);

    engine.toggle(2).unwrap();
    assert!(engine.cached(Target::Current).is_none());
    let c = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(probe.calls(), 2);
    assert_ne!(c.retained_energy, a.retained_energy);
}

#[test]
fn double_toggle_restores_content_with_new_version() {
    let (engine, _, _) = engine_with_probe(&[]);
    let v0 = engine.exclusion().version();
    engine.toggle(3).unwrap();
    let v2 = engine.toggle(3).unwrap();
    assert_eq!(v2, v0 + 2);
    assert!(!engine.is_excluded(3));
    assert!(engine.exclusion().members().is_empty());
}

#[test]
fn preview_matches_current_after_toggling_candidate() {
    let (engine, _, _) = engine_with_probe(&[0]);
    let preview = engine.request_recompute(Target::Preview(2)).unwrap().wait().unwrap();
    engine.toggle(2).unwrap();
    let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(preview.data, current.data);
    assert_eq!(preview.retained_energy, current.retained_energy);
}

#[test]
fn result_independent_of_toggle_order() {
    let (a, _, _) = engine_with_probe(&[]);
    let (b, _, _) = engine_with_probe(&[]);
    for k in [3, 0, 1] {
        a.toggle(k).unwrap();
    }
    for k in [1, 3, 0] {
        b.toggle(k).unwrap();
    }
    // Visiting a preview first must not change the current result.
    b.request_recompute(Target::Preview(2)).unwrap().wait().unwrap();
    let ra = a.request_recompute(Target::Current).unwrap().wait().unwrap();
    let rb = b.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(ra.data, rb.data);
}

#[test]
fn energy_matches_direct_computation() {
    let (engine, _, epochs) = engine_with_probe(&[1]);
    let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    let expected = retained_energy(&epochs, &current.data).unwrap();
    approx::assert_abs_diff_eq!(current.retained_energy, expected, epsilon = 1e-12);
}

#[test]
fn out_of_range_components_rejected() {
    let (engine, _, _) = engine_with_probe(&[]);
    assert!(matches!(engine.toggle(4), Err(Error::ComponentOutOfRange { index: 4, n_components: 4 })));
    assert!(matches!(
        engine.request_recompute(Target::Preview(9)).err(),
        Some(Error::ComponentOutOfRange { index: 9, .. })
    ));
    assert_eq!(engine.exclusion().version(), 0);

    let (epochs, ica) = mixture(2, 5, 4, 50);
    let err = RecomputeEngine::new(epochs, Arc::new(ica), [7], raw_config()).err();
    assert!(matches!(err, Some(Error::ComponentOutOfRange { index: 7, .. })));
}

#[test]
fn gate_serializes_requests_and_orders_completions() {
    let (epochs, ica) = mixture(2, 5, 4, 60);
    let (open, gate) = crossbeam::channel::unbounded();
    let probe = Arc::new(Probe::gated(ica, gate));
    let engine = RecomputeEngine::new(epochs, Arc::clone(&probe) as Arc<dyn Decomposition>, None::<usize>, raw_config())
        .unwrap();

    let busy_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&busy_events);
    engine.set_busy_listener(move |busy| sink.lock().push(busy));

    let order = Arc::new(Mutex::new(Vec::new()));
    let submit = |target: Target| {
        let order = Arc::clone(&order);
        engine.submit(target, move |outcome| {
            assert!(outcome.is_ok());
            order.lock().push(target);
        })
    };

    let first = submit(Target::Current).unwrap();
    assert!(engine.is_busy());
    assert!(matches!(submit(Target::Current), Err(Error::RecomputePending(Target::Current))));

    // Toggles are synchronous even while a recompute is pending.
    engine.toggle(1).unwrap();
    assert!(engine.is_excluded(1));

    let second = submit(Target::Preview(3)).unwrap();
    let third = submit(Target::Preview(0)).unwrap();
    assert!(first < second && second < third);

    let last = engine.request_recompute(Target::Preview(2)).unwrap();
    for _ in 0..4 {
        open.send(()).unwrap();
    }
    let result = last.wait().unwrap();
    // Snapshot taken at submission: includes the toggle of component 1.
    assert!(result.fingerprint.contains(1));
    drop(engine);

    assert_eq!(
        *order.lock(),
        vec![Target::Current, Target::Preview(3), Target::Preview(0)]
    );
    assert_eq!(*busy_events.lock(), vec![true, false]);
    assert_eq!(probe.calls(), 4);
}

#[test]
fn snapshot_taken_at_submission() {
    let (epochs, ica) = mixture(2, 5, 4, 60);
    let (open, gate) = crossbeam::channel::unbounded();
    let engine = RecomputeEngine::new(epochs, Arc::new(Probe::gated(ica, gate)), None::<usize>, raw_config()).unwrap();

    let pending = engine.request_recompute(Target::Current).unwrap();
    engine.toggle(0).unwrap();
    open.send(()).unwrap();
    let result = pending.wait().unwrap();
    assert_eq!(result.fingerprint.version(), 0);
    assert!(!result.fingerprint.contains(0));
    // The result is stale for the new exclusion set and is not kept.
    assert!(engine.cached(Target::Current).is_none());
    assert_eq!(engine.cache().ready_len(), 0);
}

#[test]
fn toggle_releases_stale_previews() {
    let (epochs, ica) = mixture(2, 5, 6, 80);
    let engine = RecomputeEngine::new(epochs, Arc::new(ica), None::<usize>, raw_config()).unwrap();
    for k in 0..6 {
        engine.request_recompute(Target::Preview(k)).unwrap().wait().unwrap();
    }
    assert_eq!(engine.cache().ready_len(), 6);

    engine.toggle(0).unwrap();
    assert_eq!(engine.cache().ready_len(), 0);

    engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(engine.cache().ready_len(), 1);
    assert_eq!(engine.cache().invalidate_stale(&engine.exclusion()), 0);
}

#[test]
fn failure_reported_and_state_kept() {
    let (engine, probe, _) = engine_with_probe(&[2]);
    probe.fail.store(true, Ordering::SeqCst);

    let err = engine.request_recompute(Target::Current).unwrap().wait().unwrap_err();
    assert!(matches!(err, Error::RecomputeFailed(_)));
    assert!(matches!(err.root(), Error::Decomposition(_)));
    assert_eq!(engine.exclusion().version(), 0);
    assert!(engine.is_excluded(2));
    assert!(engine.cached(Target::Current).is_none());

    probe.fail.store(false, Ordering::SeqCst);
    let ok = engine.request_recompute(Target::Current).unwrap().wait();
    assert!(ok.is_ok());
}

#[test]
fn panic_in_reconstruction_becomes_an_error() {
    let (engine, probe, _) = engine_with_probe(&[]);
    probe.panic.store(true, Ordering::SeqCst);
    let err = engine.request_recompute(Target::Preview(1)).unwrap().wait().unwrap_err();
    assert!(matches!(err.root(), Error::Panicked(msg) if msg.contains("probe asked to panic")));

    probe.panic.store(false, Ordering::SeqCst);
    assert!(engine.request_recompute(Target::Preview(1)).unwrap().wait().is_ok());
}

#[test]
fn replacing_dataset_clears_cache() {
    let (engine, _, epochs) = engine_with_probe(&[1]);
    let before = engine.request_recompute(Target::Current).unwrap().wait().unwrap();

    engine.replace_dataset(epochs.mapv(|v| 2.0 * v)).unwrap();
    assert!(engine.cached(Target::Current).is_none());

    let after = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert_eq!(engine.computations(), 2);
    assert_ne!(after.data, before.data);
    approx::assert_abs_diff_eq!(engine.reference_energy(), 4.0 * total_energy(&epochs), epsilon = 1e-6);
}

#[test]
fn zero_reference_rejected() {
    let (_, ica) = mixture(2, 5, 4, 60);
    let err = RecomputeEngine::new(Array3::zeros((2, 5, 60)), Arc::new(ica), None::<usize>, raw_config()).err();
    assert_eq!(err, Some(Error::DivisionByZero));
}

#[test]
fn artifact_pass_then_curation() {
    let window = InterpolationWindow::new(-2, 10);
    let onsets = OnsetSet::new([200, 600, 1000, 1400]);
    let raw = with_pulses(&sinusoids(4, 1600), &onsets, window);
    let clean = remove_and_interpolate(&raw, &onsets, window).unwrap();

    let (epochs, kept) = epoch_around(&clean, &onsets, 50, 149);
    assert_eq!(kept, onsets.as_slice());
    assert_eq!(epochs.dim(), (4, 4, 200));

    // Identity mixing: components are the channels themselves.
    let ica = LinearDecomposition::new(ndarray::Array2::eye(4), epochs.clone()).unwrap();
    let engine = RecomputeEngine::new(epochs, Arc::new(ica), [3], EngineConfig::default()).unwrap();
    let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
    assert!(current.retained_energy > 0.0 && current.retained_energy < 100.0);
    assert!(current.data.slice(ndarray::s![.., 3, ..]).iter().all(|v| v.abs() < 1e-9));
}
