//! BeliefCache Integration Tests
//!
//! Exercises the public API end to end:
//! - Access path: statistics, virtual cache and real cache together
//! - Adaptation: drift detection driving parameter experiments
//! - Pipeline: queued engine reporting through an advisor
//! - Simulation: trace replay

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Access Path Tests
// =============================================================================

mod access_tests {
    use beliefcache::cache::{CacheParameters, EvictionMode, ObjectId};
    use beliefcache::engine::PredictionCore;
    use beliefcache::Error;

    fn params() -> CacheParameters {
        CacheParameters {
            cache_size: 3,
            candidate_set_size: 2,
            voter_window_size: 3,
            history_window_size: 3,
            belief_threshold: 0.0,
            max_tracked_objects: 16,
            min_history_windows: 1,
        }
    }

    #[test]
    fn test_looping_stream_with_new_object() {
        let mut core = PredictionCore::new(params(), 3, EvictionMode::Lru).unwrap();

        let mut prefetched: Vec<ObjectId> = Vec::new();
        let mut last = None;
        for id in [1, 2, 3, 1, 2, 3, 1, 2, 3, 4] {
            let outcome = core.access(id).unwrap();
            prefetched.extend(outcome.prefetch.iter().map(|e| e.id));
            last = Some(outcome);
        }
        prefetched.sort_unstable();
        assert_eq!(prefetched, vec![1, 2, 3]);

        let last = last.unwrap();
        assert!(!last.real_hit);
        assert_eq!(last.evicted.len(), 1);
        assert_eq!(last.evicted[0].id, 1);
        assert!(core.real().contains(4));
        assert_eq!(core.hits() + core.misses(), 10);
    }

    #[test]
    fn test_rejects_ids_outside_tracked_range() {
        let mut core = PredictionCore::new(params(), 3, EvictionMode::Belief).unwrap();
        let result = core.access(99);
        assert!(matches!(result, Err(Error::ObjectIdOutOfRange { id: 99, .. })));
        assert_eq!(core.accesses(), 0);
    }

    #[test]
    fn test_pinned_objects_survive_pressure() {
        let mut core = PredictionCore::new(params(), 2, EvictionMode::Lru).unwrap();
        core.access(1).unwrap();
        assert!(core.pin(1));

        for id in [2, 3, 4, 5, 6] {
            core.access(id).unwrap();
        }
        assert!(core.real().contains(1));
        assert!(core.unpin(1));
    }
}

// =============================================================================
// Adaptation Tests
// =============================================================================

mod adaptation_tests {
    use super::*;
    use beliefcache::cache::{CacheParameters, VirtualCache};
    use beliefcache::drift::{CycleSignals, DriftConfig, DriftDetector};
    use beliefcache::switch::{SwitchConfig, SwitchController, SwitchState};

    #[test]
    fn test_phase_shift_starts_experiment() {
        let fired = Arc::new(AtomicU64::new(0));
        let counter = fired.clone();
        let mut detector = DriftDetector::with_callback(
            DriftConfig::default(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        let primary = VirtualCache::shared(CacheParameters {
            max_tracked_objects: 64,
            ..Default::default()
        })
        .unwrap();
        let mut switch = SwitchController::new(
            SwitchConfig {
                seed: Some(3),
                ..Default::default()
            },
            primary,
        )
        .unwrap();

        let mut shifted = false;
        for cycle in 0..300 {
            let level = if cycle < 100 { 0.0 } else { 1.0 };
            let signals = CycleSignals {
                frequency: level,
                recency: level,
                hitrate: level,
            };
            if detector.observe_cycle(signals) {
                switch.start_evaluation();
                shifted = true;
                break;
            }
        }

        assert!(shifted);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(detector.phase_shifts(), 1);
        assert_eq!(switch.state(), SwitchState::Evaluating);
        assert_eq!(switch.evaluations(), 1);
        assert_eq!(switch.caches().len(), 2);
    }

    #[test]
    fn test_experiment_completes_and_keeps_valid_parameters() {
        let primary = VirtualCache::shared(CacheParameters {
            cache_size: 4,
            candidate_set_size: 2,
            voter_window_size: 3,
            history_window_size: 3,
            belief_threshold: 0.0,
            max_tracked_objects: 64,
            min_history_windows: 1,
        })
        .unwrap();
        let mut switch = SwitchController::new(
            SwitchConfig {
                cycle_ticks: 10,
                cycles_per_test: 1,
                seed: Some(11),
                ..Default::default()
            },
            primary.clone(),
        )
        .unwrap();

        switch.start_evaluation();
        let mut reports = Vec::new();
        for id in [1, 2, 3, 4, 5].iter().cycle().take(40) {
            let hit = primary.read().contains(*id);
            if let Some(report) = switch.observe(*id, hit).unwrap() {
                reports.push(report);
            }
        }

        assert_eq!(reports.len(), 4);
        assert_eq!(switch.state(), SwitchState::Idle);
        assert_eq!(reports.last().unwrap().state, SwitchState::Idle);
        for report in &reports {
            assert_eq!(report.hit_rates.len(), 2);
            assert!(report.parameters.validate().is_ok());
        }
    }
}

// =============================================================================
// Pipeline Tests
// =============================================================================

mod pipeline_tests {
    use super::*;
    use beliefcache::cache::{CacheParameters, EvictionMode};
    use beliefcache::engine::{CacheAdvice, EngineConfig, InMemoryAdviceCollector, PredictionEngine};
    use beliefcache::switch::SwitchConfig;

    fn config(adaptive: bool) -> EngineConfig {
        EngineConfig {
            cache: CacheParameters {
                cache_size: 3,
                candidate_set_size: 2,
                voter_window_size: 3,
                history_window_size: 3,
                belief_threshold: 0.0,
                max_tracked_objects: 64,
                min_history_windows: 1,
            },
            real_capacity: 3,
            eviction_mode: EvictionMode::Lru,
            adaptive,
            switch: SwitchConfig {
                seed: Some(5),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_engine_reports_prefetch_and_evict_advice() {
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let engine = PredictionEngine::start(config(true), collector.clone()).unwrap();

        engine.submit_all([1, 2, 3, 1, 2, 3, 1, 2, 3, 4]).unwrap();
        let (snapshot, stats) = engine.shutdown().await.unwrap();

        assert_eq!(snapshot.accesses, 10);
        assert_eq!(stats.prediction.submitted, 10);
        assert_eq!(stats.prediction.processed, 10);

        let mut prefetched = collector.prefetched();
        prefetched.sort_unstable();
        assert_eq!(prefetched, vec![1, 2, 3]);
        assert_eq!(collector.evicted(), vec![1]);
        assert_eq!(collector.history(1).len(), 2);
        assert_eq!(collector.phase_shifts(), 0);

        for advice in collector.advice() {
            assert!(matches!(
                advice,
                CacheAdvice::Prefetch { .. } | CacheAdvice::Evict { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_metrics_survive_shutdown() {
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let engine = PredictionEngine::start(config(false), collector).unwrap();
        engine.submit(1).unwrap();

        let metrics = engine.metrics().clone();
        let (snapshot, _) = engine.shutdown().await.unwrap();
        assert_eq!(snapshot.accesses, 1);
        assert_eq!(metrics.accesses.get(), 1);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("beliefcache_accesses_total 1"));
    }
}

// =============================================================================
// Simulation Tests
// =============================================================================

mod simulation_tests {
    use beliefcache::cache::{CacheParameters, EvictionMode, ObjectId};
    use beliefcache::engine::EngineConfig;
    use beliefcache::simulation::{SimulationConfig, Simulator, Workload};
    use beliefcache::switch::SwitchConfig;

    const PHASE_LEN: u64 = 20_000;

    // even phases loop over 20 objects, odd phases scan fresh ones
    fn phase(index: u64) -> Workload {
        let ids: Vec<ObjectId> = if index % 2 == 0 {
            (0..PHASE_LEN).map(|i| i % 20).collect()
        } else {
            (0..PHASE_LEN).map(|i| 1_000 + index * PHASE_LEN + i).collect()
        };
        Workload::new(ids)
    }

    #[test]
    fn test_every_phase_boundary_starts_an_experiment() {
        let config = SimulationConfig {
            engine: EngineConfig {
                cache: CacheParameters {
                    cache_size: 8,
                    candidate_set_size: 2,
                    voter_window_size: 3,
                    history_window_size: 3,
                    belief_threshold: 0.0,
                    max_tracked_objects: 100_000,
                    min_history_windows: 1,
                },
                real_capacity: 50_000,
                eviction_mode: EvictionMode::Lru,
                adaptive: true,
                switch: SwitchConfig {
                    seed: Some(23),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let mut simulator = Simulator::new(config).unwrap();

        simulator.run(&phase(0)).unwrap();
        for boundary in 1..5u64 {
            let report = simulator.run(&phase(boundary)).unwrap();
            assert!(
                report.phase_shifts >= boundary,
                "no phase shift after boundary {}: {} so far",
                boundary,
                report.phase_shifts
            );
        }

        let shifts = simulator.metrics().phase_shifts.get();
        let switch = simulator.switch().expect("adaptive run has a switch");
        assert!(shifts >= 4);
        assert_eq!(switch.evaluations(), shifts);
    }

    #[test]
    fn test_replay_from_text_trace() {
        let workload: Workload = "# loop\n10 20 30\n10 20 30\n10 20 30\n10 20 30\n"
            .parse()
            .unwrap();
        let config = SimulationConfig {
            engine: EngineConfig {
                cache: CacheParameters {
                    cache_size: 4,
                    candidate_set_size: 2,
                    voter_window_size: 3,
                    history_window_size: 3,
                    belief_threshold: 0.0,
                    max_tracked_objects: 128,
                    min_history_windows: 1,
                },
                real_capacity: 4,
                eviction_mode: EvictionMode::Lru,
                adaptive: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut simulator = Simulator::new(config).unwrap();
        let report = simulator.run(&workload).unwrap();

        assert_eq!(report.replayed, 12);
        assert_eq!(report.misses, 3);
        assert_eq!(report.hits, 9);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["eviction_mode"], "lru");
        assert_eq!(json["hits"], 9);
    }

    #[test]
    fn test_simulation_config_from_yaml() {
        let config = SimulationConfig::from_yaml(
            "warmup: 100\ntrain: 50\nengine:\n  real_capacity: 128\n  adaptive: false\n",
        )
        .unwrap();
        assert_eq!(config.warmup, 100);
        assert_eq!(config.train, 50);
        assert_eq!(config.engine.real_capacity, 128);
        assert!(!config.engine.adaptive);
        assert!(config.intern_ids);
    }
}
