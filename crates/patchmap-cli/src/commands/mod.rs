pub mod assign;
pub mod topology;

use std::sync::Arc;

use anyhow::Context;
use patchmap_cluster::LocalGroup;

/// Upper bound on simulated ranks; each one occupies a blocking thread.
pub const MAX_RANKS: usize = 256;

/// Run `f` once per rank, each on its own blocking thread, and collect the
/// results in rank order.
pub async fn run_ranks<T, F>(members: Vec<LocalGroup>, f: F) -> anyhow::Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(LocalGroup) -> anyhow::Result<T> + Send + Sync + 'static,
{
    anyhow::ensure!(
        members.len() <= MAX_RANKS,
        "{} ranks requested, at most {MAX_RANKS} can be simulated",
        members.len()
    );
    let f = Arc::new(f);
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let f = Arc::clone(&f);
            tokio::task::spawn_blocking(move || f(member))
        })
        .collect();

    let mut out = Vec::with_capacity(handles.len());
    for (rank, handle) in handles.into_iter().enumerate() {
        let result = handle.await.with_context(|| format!("rank {rank} did not finish"))?;
        out.push(result.with_context(|| format!("rank {rank} failed"))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchmap_cluster::Collective;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ranks_run_concurrently() {
        let out = run_ranks(LocalGroup::new(4), |comm| {
            let gathered = comm.all_gather(&[comm.rank() as i64])?;
            Ok(gathered.iter().sum::<i64>())
        })
        .await
        .unwrap();
        assert_eq!(out, vec![6, 6, 6, 6]);
    }

    #[tokio::test]
    async fn too_many_ranks_are_refused() {
        let members = LocalGroup::new(MAX_RANKS + 1);
        assert!(run_ranks(members, |_| Ok(())).await.is_err());
    }
}
