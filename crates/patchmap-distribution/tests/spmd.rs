//! SPMD integration tests.
//!
//! Every test runs one `DistributionManager` per `LocalGroup` rank on its
//! own thread, issuing the same calls everywhere, and compares what the
//! ranks computed.

use std::io::Write;

use patchmap_cluster::{Collective, LocalGroup, LocalUsage, run_group};
use patchmap_core::{DistributionConfig, IntVect, Strategy, WorkItem};
use patchmap_distribution::{DistributionError, DistributionManager};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn make_items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| {
            let weight = (i * 7919 % 13 + 1) as u64;
            let anchor = IntVect::new((i % 5) as i64 * 8, (i / 5 % 5) as i64 * 8, (i / 25) as i64 * 8);
            WorkItem::new(i, weight, anchor)
        })
        .collect()
}

fn config(strategy: Strategy) -> DistributionConfig {
    DistributionConfig::default().with_strategy(strategy)
}

#[test]
fn every_rank_computes_the_same_assignment() {
    init_tracing();
    for strategy in Strategy::ALL {
        let items = make_items(40);
        let out = run_group(LocalGroup::new(4), |comm| {
            let rank = comm.rank();
            let mut manager = DistributionManager::new(config(strategy), comm);
            manager.set_local_usage(LocalUsage::new(1000 * (rank as u64 % 3), 10));
            let map = manager.define(&items, 4).unwrap();
            (rank, map.sentinel(), map.fingerprint(), map.owners().to_vec())
        })
        .unwrap();

        for (rank, sentinel, fingerprint, owners) in &out {
            assert_eq!(sentinel, rank, "{strategy}");
            assert_eq!(fingerprint, &out[0].2, "{strategy}: rank {rank} diverged");
            assert_eq!(owners.len(), 40);
            assert!(owners.iter().all(|&o| o < 4));
        }
    }
}

#[test]
fn heaviest_item_goes_to_least_loaded_rank() {
    let items: Vec<WorkItem> = [9u64, 1, 1, 1]
        .iter()
        .enumerate()
        .map(|(i, &w)| WorkItem::new(i, w, IntVect::ZERO))
        .collect();
    let out = run_group(LocalGroup::new(4), |comm| {
        let rank = comm.rank() as u64;
        let mut manager = DistributionManager::new(config(Strategy::RoundRobin), comm);
        manager.set_local_usage(LocalUsage::new(100 * (4 - rank), 0));
        manager.define(&items, 4).unwrap().owners().to_vec()
    })
    .unwrap();
    // Rank 3 holds the fewest bytes.
    assert_eq!(out[0][0], 3);
    assert_eq!(out[0], out[3]);
}

#[test]
fn cache_hits_skip_the_collective() {
    // Ranks make different numbers of repeated calls; only misses
    // synchronize, so this must not deadlock.
    let items = make_items(12);
    let out = run_group(LocalGroup::new(3), |comm| {
        let repeats = comm.rank() + 1;
        let mut manager = DistributionManager::new(config(Strategy::Knapsack), comm);
        let first = manager.define(&items, 3).unwrap();
        for _ in 0..repeats {
            assert!(manager.define(&items, 3).unwrap().ptr_eq(&first));
        }
        let other = manager.define(&make_items(13), 3).unwrap();
        (first.fingerprint(), other.fingerprint(), manager.cache_len())
    })
    .unwrap();

    for result in &out {
        assert_eq!(result, &out[0]);
    }
    assert_eq!(out[0].2, 2);
}

#[test]
fn adopting_a_cached_shape_collides_everywhere() {
    let items = make_items(6);
    let out = run_group(LocalGroup::new(2), |comm| {
        let rank = comm.rank();
        let mut manager = DistributionManager::new(config(Strategy::SpaceFillingCurve), comm);
        manager.define(&items, 2).unwrap();
        let mut pmap = vec![0; 6];
        pmap.push(rank);
        manager.adopt(pmap, true).unwrap_err()
    })
    .unwrap();

    for err in out {
        assert!(matches!(err, DistributionError::CacheCollision { len: 7 }));
        assert!(err.is_fatal());
    }
}

#[test]
fn adopted_map_serves_later_defines() {
    let out = run_group(LocalGroup::new(2), |comm| {
        let rank = comm.rank();
        let mut manager = DistributionManager::new(config(Strategy::Knapsack), comm);
        let adopted = manager.adopt(vec![1, 1, 0, rank], true).unwrap();
        let defined = manager.define(&make_items(3), 2).unwrap();
        defined.ptr_eq(&adopted)
    })
    .unwrap();
    assert_eq!(out, vec![true, true]);
}

#[test]
fn cached_map_for_more_workers_is_rejected() {
    let items = make_items(12);
    let out = run_group(LocalGroup::new(4), |comm| {
        let mut manager = DistributionManager::new(config(Strategy::Knapsack), comm);
        let wide = manager.define(&items, 4).unwrap();
        let max_owner = wide.owners().iter().copied().max().unwrap();
        (max_owner, manager.define(&items, 2).unwrap_err())
    })
    .unwrap();

    for (max_owner, err) in out {
        assert!(max_owner >= 2);
        assert!(matches!(err, DistributionError::InvalidAssignment(_)));
        assert!(err.is_fatal());
    }
}

#[test]
fn cache_hit_stamped_for_another_rank_is_fatal() {
    let out = run_group(LocalGroup::new(2), |comm| {
        let rank = comm.rank();
        let mut manager = DistributionManager::new(config(Strategy::RoundRobin), comm);
        manager.adopt(vec![0, 1, 0, 1, 1 - rank], true).unwrap();
        (rank, manager.define(&make_items(4), 2).unwrap_err())
    })
    .unwrap();

    for (rank, err) in out {
        match &err {
            DistributionError::ForeignAssignment { expected, found } => {
                assert_eq!(*expected, rank);
                assert_eq!(*found, 1 - rank);
            }
            other => panic!("rank {rank}: unexpected {other:?}"),
        }
        assert!(err.is_fatal());
    }
}

#[test]
fn adopting_out_of_range_owners_is_rejected() {
    let out = run_group(LocalGroup::new(2), |comm| {
        let rank = comm.rank();
        let mut manager = DistributionManager::new(config(Strategy::Knapsack), comm);
        let err = manager.adopt(vec![0, 5, 1, rank], true).unwrap_err();
        (err, manager.cache_len())
    })
    .unwrap();

    for (err, cached) in out {
        assert!(matches!(err, DistributionError::InvalidAssignment(_)));
        assert_eq!(cached, 0);
    }
}

#[test]
fn proximity_runs_follow_the_machine() {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{ "lo": [0, 0, 0], "hi": [1, 1, 0], "slots": [[13, 12, 10, 11]] }"#)
        .unwrap();
    let path = file.path().to_path_buf();

    let items: Vec<WorkItem> = (0..8).map(|i| WorkItem::new(i, 1, IntVect::new(i as i64, 0, 0))).collect();
    let out = run_group(LocalGroup::with_node_ids(&[10, 11, 12, 13]), |comm| {
        let mut cfg = config(Strategy::ProximityFillingCurve);
        cfg.proximity.topology_file = Some(path.clone());
        let mut manager = DistributionManager::new(cfg, comm);
        let map = manager.define(&items, 4).unwrap();
        let order = manager.topology().unwrap().proximity_order().to_vec();
        (map.owners().to_vec(), order)
    })
    .unwrap();

    for (owners, order) in &out {
        assert_eq!(order, &vec![3, 2, 0, 1]);
        assert_eq!(owners, &vec![3, 3, 2, 2, 0, 0, 1, 1]);
    }
}

#[test]
fn load_report_arrives_on_io_rank() {
    let out = run_group(LocalGroup::new(3), |comm| {
        let rank = comm.rank() as u64;
        let mut manager = DistributionManager::new(DistributionConfig::default(), comm);
        manager.set_local_usage(LocalUsage::new(100 + rank, 1));
        manager.define(&make_items(9), 3).unwrap();
        manager.load_report().unwrap()
    })
    .unwrap();

    let report = out[0].as_ref().unwrap();
    assert_eq!(report.bytes, vec![100, 101, 102]);
    assert!(out[1].is_none());
}
