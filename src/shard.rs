//! # Workload partition arithmetic.
//!
//! Pure functions mapping workload ids to shards and shards to owning
//! clusters, plus the shard distribution used when the manager carves the
//! total shard range into per-cluster chunks.
//!
//! All functions are deterministic and total for valid topologies: every
//! shard id in `[0, total_shards)` maps to exactly one cluster id in
//! `[0, total_clusters)`. Zero totals are rejected with
//! [`ClusterError::InvalidTopology`].

use crate::error::ClusterError;

/// Identifier of one managed cluster (worker process).
pub type ClusterId = u32;

/// Identifier of one workload shard/partition.
pub type ShardId = u32;

/// Maps a workload id to its owning shard: `(id >> 22) % total_shards`.
///
/// The high bits of the workload id carry its placement; the low 22 bits are
/// sequence/entropy and are ignored for routing.
pub fn shard_id_for_workload(workload_id: u64, total_shards: u32) -> Result<ShardId, ClusterError> {
    if total_shards == 0 {
        return Err(ClusterError::InvalidTopology {
            detail: "total_shards must be at least 1".into(),
        });
    }
    Ok(((workload_id >> 22) % u64::from(total_shards)) as ShardId)
}

/// Maps a shard id to the cluster that owns it.
///
/// Shards are grouped into contiguous chunks of `ceil(total_shards /
/// total_clusters)`; the owning cluster is the chunk index.
pub fn cluster_id_for_shard(
    shard_id: ShardId,
    total_shards: u32,
    total_clusters: u32,
) -> Result<ClusterId, ClusterError> {
    if total_shards == 0 {
        return Err(ClusterError::InvalidTopology {
            detail: "total_shards must be at least 1".into(),
        });
    }
    if total_clusters == 0 {
        return Err(ClusterError::InvalidTopology {
            detail: "total_clusters must be at least 1".into(),
        });
    }
    let chunk = total_shards.div_ceil(total_clusters);
    Ok(shard_id / chunk)
}

/// Maps a workload id straight to its owning cluster.
pub fn cluster_id_for_workload(
    workload_id: u64,
    total_shards: u32,
    total_clusters: u32,
) -> Result<ClusterId, ClusterError> {
    let shard = shard_id_for_workload(workload_id, total_shards)?;
    cluster_id_for_shard(shard, total_shards, total_clusters)
}

/// Splits `[0, total_shards)` into at most `total_clusters` ordered, disjoint
/// chunks. Chunk `i` is exactly the shard list assigned to cluster `i`, and it
/// agrees with [`cluster_id_for_shard`] for every member.
pub fn distribute(total_shards: u32, total_clusters: u32) -> Result<Vec<Vec<ShardId>>, ClusterError> {
    if total_shards == 0 || total_clusters == 0 {
        return Err(ClusterError::InvalidTopology {
            detail: format!(
                "totals must be at least 1 (total_shards={total_shards}, total_clusters={total_clusters})"
            ),
        });
    }
    let chunk = total_shards.div_ceil(total_clusters) as usize;
    let shards: Vec<ShardId> = (0..total_shards).collect();
    Ok(shards.chunks(chunk).map(<[ShardId]>::to_vec).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_for_workload_uses_high_bits() {
        // Low 22 bits do not influence placement.
        let base: u64 = 42 << 22;
        assert_eq!(shard_id_for_workload(base, 16).unwrap(), 42 % 16);
        assert_eq!(shard_id_for_workload(base | 0x3F_FFFF, 16).unwrap(), 42 % 16);
    }

    #[test]
    fn test_zero_totals_rejected() {
        assert!(shard_id_for_workload(1, 0).is_err());
        assert!(cluster_id_for_shard(0, 0, 1).is_err());
        assert!(cluster_id_for_shard(0, 4, 0).is_err());
        assert!(distribute(0, 2).is_err());
        assert!(distribute(4, 0).is_err());
    }

    #[test]
    fn test_mapping_is_total_and_in_range() {
        for &(total_shards, total_clusters) in
            &[(1u32, 1u32), (4, 2), (5, 2), (7, 3), (16, 5), (9, 9), (3, 8)]
        {
            for shard in 0..total_shards {
                let cluster = cluster_id_for_shard(shard, total_shards, total_clusters).unwrap();
                assert!(
                    cluster < total_clusters,
                    "shard {shard} mapped to out-of-range cluster {cluster} \
                     (shards={total_shards}, clusters={total_clusters})"
                );
            }
        }
    }

    #[test]
    fn test_distribute_covers_range_disjointly() {
        let chunks = distribute(10, 3).unwrap();
        let flat: Vec<ShardId> = chunks.iter().flatten().copied().collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
        assert_eq!(chunks[0], vec![0, 1, 2, 3]);
        assert_eq!(chunks[1], vec![4, 5, 6, 7]);
        assert_eq!(chunks[2], vec![8, 9]);
    }

    #[test]
    fn test_distribute_agrees_with_cluster_mapping() {
        let chunks = distribute(11, 4).unwrap();
        for (cluster, shards) in chunks.iter().enumerate() {
            for &shard in shards {
                assert_eq!(
                    cluster_id_for_shard(shard, 11, 4).unwrap(),
                    cluster as ClusterId,
                    "shard {shard} should belong to cluster {cluster}"
                );
            }
        }
    }

    #[test]
    fn test_even_split_example() {
        // 2 clusters x 4 shards: cluster 0 owns [0,1], cluster 1 owns [2,3].
        let chunks = distribute(4, 2).unwrap();
        assert_eq!(chunks, vec![vec![0, 1], vec![2, 3]]);
    }
}
