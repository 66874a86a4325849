//! Replica failover as nodes go down and come back

mod common;

use common::*;
use shardlocate::cloud::{MemoryCoordinator, ReplicaManager, StateProvider, StateSource};
use shardlocate::Error;
use std::collections::HashSet;

fn setup(replicas: &[(&str, bool, bool)]) -> (MemoryCoordinator, shardlocate::CloudStateProvider) {
    let coord = MemoryCoordinator::new();
    coord.set_data(CLUSTER_STATE, collection_doc("docs", true, replicas));
    let provider = provider(&coord);
    provider.init().unwrap();
    (coord, provider)
}

#[test]
fn test_leader_serves_writes() {
    let (_coord, provider) = setup(&[("r1", true, true), ("r2", true, false)]);

    for _ in 0..20 {
        assert_eq!(
            provider.get_shard_url(true, Some("docs"), true).unwrap(),
            replica_url("docs", "r1")
        );
    }
    assert_eq!(provider.metrics().unwrap().forced_refreshes.get(), 0);
}

#[test]
fn test_reads_spread_over_active_replicas() {
    let (_coord, provider) = setup(&[("r1", true, true), ("r2", true, false)]);

    let seen: HashSet<String> = (0..200)
        .map(|_| provider.get_shard_url(false, Some("docs"), true).unwrap())
        .collect();
    assert_eq!(
        seen,
        HashSet::from([replica_url("docs", "r1"), replica_url("docs", "r2")])
    );
}

#[test]
fn test_leader_down_falls_back_to_follower() {
    let (coord, provider) = setup(&[("r1", true, true), ("r2", true, false)]);

    coord.set_data(
        CLUSTER_STATE,
        collection_doc("docs", true, &[("r1", false, true), ("r2", true, false)]),
    );

    assert_eq!(
        provider.get_shard_url(true, Some("docs"), true).unwrap(),
        replica_url("docs", "r2")
    );
    let metrics = provider.metrics().unwrap();
    assert_eq!(metrics.leader_fallbacks.get(), 1);
    assert_eq!(metrics.forced_refreshes.get(), 0);
}

#[test]
fn test_all_replicas_down_after_one_forced_refresh() {
    let (coord, provider) = setup(&[("r1", false, true), ("r2", false, false)]);
    assert_eq!(coord.data_reads(CLUSTER_STATE), 1);

    let err = provider.get_shard_url(true, Some("docs"), true).unwrap_err();
    assert!(matches!(
        err,
        Error::NoReplicaAvailable { ref collection, leader: true } if collection == "docs"
    ));
    assert_eq!(coord.data_reads(CLUSTER_STATE), 2);
    assert_eq!(provider.metrics().unwrap().forced_refreshes.get(), 1);

    // Without auto refresh nothing is fetched
    assert!(provider.get_shard_url(false, Some("docs"), false).is_err());
    assert_eq!(coord.data_reads(CLUSTER_STATE), 2);
}

#[test]
fn test_inactive_shard_is_skipped() {
    let coord = MemoryCoordinator::new();
    coord.set_data(CLUSTER_STATE, collection_doc("docs", false, &[("r1", true, true)]));
    let provider = provider(&coord);
    provider.init().unwrap();

    assert!(provider.select_replicas(false, Some("docs")).unwrap().is_empty());
    assert!(matches!(
        provider.get_shard_url(false, Some("docs"), true),
        Err(Error::NoReplicaAvailable { leader: false, .. })
    ));
}

#[test]
fn test_recovery_is_picked_up_by_watch() {
    let (coord, provider) = setup(&[("r1", false, true), ("r2", false, false)]);
    assert!(provider.get_shard_url(true, Some("docs"), false).is_err());

    coord.set_data(
        CLUSTER_STATE,
        collection_doc("docs", true, &[("r1", false, false), ("r2", true, true)]),
    );

    assert_eq!(
        provider.get_shard_url(true, Some("docs"), false).unwrap(),
        replica_url("docs", "r2")
    );
}

#[test]
fn test_recovery_missed_by_watch_found_by_forced_refresh() {
    let (coord, provider) = setup(&[("r1", false, true)]);

    // A lost session misses the update until the next refresh
    coord.refuse_connections(true);
    coord.expire_sessions();
    coord.refuse_connections(false);
    coord.set_data(CLUSTER_STATE, collection_doc("docs", true, &[("r1", true, true)]));

    assert!(provider.get_shard_url(true, Some("docs"), false).is_err());
    assert_eq!(
        provider.get_shard_url(true, Some("docs"), true).unwrap(),
        replica_url("docs", "r1")
    );
    assert_eq!(provider.metrics().unwrap().forced_refreshes.get(), 1);
}
