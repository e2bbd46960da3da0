//! Process-group integration tests.
//!
//! Drives `LocalGroup` ranks on real threads through the load aggregator
//! and the topology directory, and checks that every rank ends up with
//! the same view.

use std::io::Write;

use patchmap_cluster::*;
use patchmap_core::IntVect;

/// 2x2 torus: nodes 10..=13, two ranks per node.
const TORUS: &str = r#"{
    "lo": [0, 0, 0],
    "hi": [1, 1, 0],
    "slots": [[13, 12, 10, 11]]
}"#;

fn topology_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn directory_is_identical_on_every_rank() {
    let file = topology_file(TORUS);
    let path = file.path().to_path_buf();
    let members = LocalGroup::with_node_ids(&[10, 10, 11, 11, 12, 12, 13, 13]);

    let dirs = run_group(members, |comm| TopologyDirectory::build(&comm, Some(path.as_path())).unwrap()).unwrap();

    for dir in &dirs {
        assert_eq!(dir, &dirs[0]);
    }
    // Cells in Morton order: (0,0)=13, (1,0)=12, (0,1)=10, (1,1)=11.
    assert_eq!(dirs[0].proximity_order(), &[6, 7, 4, 5, 0, 1, 2, 3]);
    assert_eq!(dirs[3].coord_of_rank(3), Some(IntVect::new(1, 1, 0)));
    // Rank 0 sits at (0,1), rank 6 at (0,0), rank 4 at (1,0).
    assert_eq!(dirs[5].rank_hops(0, 6), Some(1));
    assert_eq!(dirs[5].rank_hops(0, 4), Some(2));
}

#[test]
fn only_io_rank_needs_the_description() {
    // Rank 1 is the IO rank; the path handed to the others does not exist.
    let file = topology_file(TORUS);
    let good = file.path().to_path_buf();
    let members: Vec<LocalGroup> = LocalGroup::with_node_ids(&[10, 11, 12, 13])
        .into_iter()
        .map(|m| m.with_io_rank(1))
        .collect();

    let dirs = run_group(members, |comm| {
        let source = if comm.rank() == 1 {
            good.clone()
        } else {
            "/nonexistent/topolcoords.json".into()
        };
        TopologyDirectory::build(&comm, Some(source.as_path())).unwrap()
    })
    .unwrap();

    assert!(dirs.iter().all(|d| d.has_topology()));
    assert_eq!(dirs[0].proximity_order(), &[3, 2, 0, 1]);
}

#[test]
fn unreadable_description_degrades_to_identity() {
    let file = topology_file("{ not json");
    let path = file.path().to_path_buf();

    let dirs = run_group(LocalGroup::new(3), |comm| TopologyDirectory::build(&comm, Some(path.as_path())).unwrap()).unwrap();
    for dir in &dirs {
        assert_eq!(dir.proximity_order(), &[0, 1, 2]);
        assert!(!dir.has_topology());
    }
}

#[test]
fn load_then_topology_keeps_collectives_paired() {
    let file = topology_file(TORUS);
    let path = file.path().to_path_buf();

    let out = run_group(LocalGroup::with_node_ids(&[10, 11, 12, 13]), |comm| {
        let r = comm.rank() as u64;
        let agg = LoadAggregator::new(LocalUsage::new(100 * (4 - r), 10 * (4 - r)));
        let before = agg.current_usage(&comm).unwrap();
        let dir = TopologyDirectory::build(&comm, Some(path.as_path())).unwrap();
        let after = agg.current_usage(&comm).unwrap();
        (before, dir.proximity_order().to_vec(), after)
    })
    .unwrap();

    for (before, order, after) in &out {
        assert_eq!(before, after);
        assert_eq!(before.worker_order(4), vec![3, 2, 1, 0]);
        assert_eq!(order, &vec![3, 2, 0, 1]);
    }
}
