use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use patchmap_cluster::{LocalGroup, TopologyDirectory, TopologyGrid};
use patchmap_core::{IntVect, NodeId, Rank};

use super::run_ranks;

#[derive(Debug, Serialize, PartialEq)]
struct RankPlacement {
    rank: Rank,
    node: Option<NodeId>,
    coord: Option<IntVect>,
    position: Option<usize>,
}

fn placements(directory: &TopologyDirectory) -> Vec<RankPlacement> {
    (0..directory.group_size())
        .map(|rank| RankPlacement {
            rank,
            node: directory.node_of_rank(rank),
            coord: directory.coord_of_rank(rank),
            position: directory.proximity_position(rank),
        })
        .collect()
}

pub async fn topology(grid: &Path, ranks: usize, nodes: &[NodeId], format: &str) -> anyhow::Result<()> {
    anyhow::ensure!(ranks > 0, "--ranks must be at least 1");
    anyhow::ensure!(
        nodes.is_empty() || nodes.len() == ranks,
        "{} node ids given for {ranks} ranks",
        nodes.len()
    );
    // Fail early on a broken description; the directory itself would only warn.
    let parsed = TopologyGrid::from_file(grid).with_context(|| format!("loading {}", grid.display()))?;

    let members = if nodes.is_empty() {
        LocalGroup::new(ranks)
    } else {
        LocalGroup::with_node_ids(nodes)
    };
    let source = grid.to_path_buf();
    let directories = run_ranks(members, move |comm| Ok(TopologyDirectory::build(&comm, Some(source.as_path()))?)).await?;

    let first = directories.first().context("no ranks ran")?;
    for (rank, directory) in directories.iter().enumerate() {
        anyhow::ensure!(directory == first, "rank {rank} built a different directory");
    }

    let rows = placements(first);
    match format {
        "json" => {
            let doc = serde_json::json!({
                "lo": parsed.lo,
                "hi": parsed.hi,
                "proximity_order": first.proximity_order(),
                "ranks": rows,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        _ => {
            println!("box {} .. {}, {} slots", parsed.lo, parsed.hi, parsed.slots.len());
            println!("proximity order: {:?}", first.proximity_order());
            for row in &rows {
                let node = row.node.map_or_else(|| "?".to_string(), |n| n.to_string());
                let coord = row.coord.map_or_else(|| "?".to_string(), |c| c.to_string());
                let position = row.position.map_or_else(|| "?".to_string(), |p| p.to_string());
                println!("rank {:>4}  node {node:>6}  coord {coord:<12}  position {position}", row.rank);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn rows_cover_every_rank() {
        let grid = TopologyGrid {
            lo: IntVect::new(0, 0, 0),
            hi: IntVect::new(1, 0, 0),
            slots: vec![vec![1, 0]],
        };
        let dir = TopologyDirectory::from_grid(vec![0, 1], Some(&grid));
        let rows = placements(&dir);
        assert_eq!(
            rows,
            vec![
                RankPlacement {
                    rank: 0,
                    node: Some(0),
                    coord: Some(IntVect::new(1, 0, 0)),
                    position: Some(1)
                },
                RankPlacement {
                    rank: 1,
                    node: Some(1),
                    coord: Some(IntVect::new(0, 0, 0)),
                    position: Some(0)
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn topology_command_checks_node_count() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "lo": [0,0,0], "hi": [1,0,0], "slots": [[7, 8]] }"#).unwrap();
        assert!(topology(file.path(), 2, &[7], "text").await.is_err());
        topology(file.path(), 2, &[8, 7], "json").await.unwrap();
    }
}
