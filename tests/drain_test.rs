//! Lease draining around offload and release.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{manager_with, wait_until, Counters, MockLoader};
use gg_residency::residency::{ManagerConfig, Residency, ResidencyError};

fn config(drain_timeout: Duration) -> ManagerConfig {
    ManagerConfig {
        idle_timeout: None,
        drain_timeout,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_offload_waits_for_outstanding_lease() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_secs(5)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let lease = mgr.acquire(None).await.unwrap();
    let offload = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.offload().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!offload.is_finished(), "offload must wait for the lease");
    assert_eq!(counters.migrations(), 0);
    assert_eq!(mgr.residency(), Residency::OnDevice);

    drop(lease);
    offload.await.unwrap().unwrap();
    assert_eq!(mgr.residency(), Residency::OnHost);
    assert_eq!(counters.migrations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drain_timeout_keeps_model_on_device() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_millis(100)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let lease = mgr.acquire(None).await.unwrap();
    let err = mgr.offload().await.unwrap_err();
    assert!(matches!(err, ResidencyError::DrainTimeout { in_flight: 1 }));
    assert!(err.is_warning());
    assert_eq!(mgr.residency(), Residency::OnDevice);
    assert_eq!(counters.migrations(), 0);

    let again = mgr.acquire(None).await.unwrap();
    assert!(again.same_instance(&lease), "fast path still serves the model");
    drop(again);
    drop(lease);

    mgr.offload().await.unwrap();
    assert_eq!(mgr.residency(), Residency::OnHost);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acquire_during_offload_restores_afterwards() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_secs(5)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let lease = mgr.acquire(None).await.unwrap();
    let offload = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.offload().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let acquire = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.acquire(None).await.map(|l| l.id) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!acquire.is_finished(), "acquire waits behind the transition");

    drop(lease);
    offload.await.unwrap().unwrap();
    let id = acquire.await.unwrap().unwrap();

    assert_eq!(id, 1);
    assert_eq!(counters.loads(), 1);
    assert_eq!(counters.migrations(), 2);
    assert_eq!(mgr.residency(), Residency::OnDevice);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_release_with_outstanding_lease() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_millis(50)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let lease = mgr.acquire(None).await.unwrap();
    mgr.release().await;

    assert_eq!(mgr.residency(), Residency::Unloaded);
    assert_eq!(lease.id, 1, "lease stays usable after release");
    assert_eq!(counters.live(), 1);

    drop(lease);
    assert_eq!(counters.live(), 0);
    assert_eq!(mgr.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_release_waits_for_short_lease() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_secs(5)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let lease = mgr.acquire(None).await.unwrap();
    let release = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.release().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.live(), 1);
    drop(lease);

    release.await.unwrap();
    assert!(wait_until(Duration::from_secs(1), || counters.live() == 0).await);
    assert_eq!(mgr.residency(), Residency::Unloaded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_second_instance_while_released_one_is_leased() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_millis(50)));
    let loader = MockLoader::shared(&counters);
    mgr.preload(loader.clone()).await.unwrap();

    let old = mgr.acquire(None).await.unwrap();
    mgr.release().await;
    assert_eq!(mgr.residency(), Residency::Unloaded);

    let err = mgr.acquire(None).await.unwrap_err();
    assert!(matches!(err, ResidencyError::DrainTimeout { in_flight: 1 }));
    let err = mgr.preload(loader).await.unwrap_err();
    assert!(matches!(err, ResidencyError::DrainTimeout { in_flight: 1 }));
    assert_eq!(counters.loads(), 1);
    assert_eq!(mgr.residency(), Residency::Unloaded);

    drop(old);
    let fresh = mgr.acquire(None).await.unwrap();
    assert_eq!(fresh.id, 2);
    assert_eq!(counters.max_live.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cold_start_waits_for_released_lease() {
    let counters = Counters::new();
    let mgr = manager_with(config(Duration::from_millis(300)));
    mgr.preload(MockLoader::shared(&counters)).await.unwrap();

    let old = mgr.acquire(None).await.unwrap();
    mgr.release().await;
    let holder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(old);
    });

    let fresh = mgr.acquire(None).await.unwrap();
    assert_eq!(fresh.id, 2);
    assert_eq!(counters.live(), 1);
    assert_eq!(counters.max_live.load(Ordering::SeqCst), 1);
    holder.await.unwrap();
}
