use futures::stream::{FuturesUnordered, StreamExt};
use repos_ratelimit::ratelimit::{
    LimiterRegistry, ProfileTable, RateLimitError, ServiceProfile, WaitContext,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_limiter_constructs_once() {
    let registry = Arc::new(LimiterRegistry::new());

    let mut lookups = FuturesUnordered::new();
    for _ in 0..32 {
        let registry = Arc::clone(&registry);
        lookups.push(tokio::spawn(async move { registry.get_limiter("github") }));
    }

    let mut limiters = Vec::new();
    while let Some(limiter) = lookups.next().await {
        limiters.push(limiter.unwrap());
    }

    let first = &limiters[0];
    assert!(limiters.iter().all(|limiter| Arc::ptr_eq(first, limiter)));
    assert_eq!(registry.len(), 1);
    registry.stop().await;
}

#[tokio::test]
async fn test_registry_uses_custom_profiles() {
    let mut profiles = ProfileTable::builtin();
    profiles.insert(
        ServiceProfile::gitea()
            .with_service("git.internal")
            .with_initial_limit(2),
    );
    let registry = LimiterRegistry::with_profiles(profiles);

    let limiter = registry.get_limiter("git.internal");
    assert_eq!(limiter.current_status().limit, 2);
    assert_eq!(registry.profile("git.internal").initial_limit, 2);
    registry.stop().await;
}

#[tokio::test]
async fn test_services_share_nothing() {
    let registry = LimiterRegistry::new();
    let github = registry.get_limiter("github");
    let gitlab = registry.get_limiter("gitlab");

    github.wait(&WaitContext::background()).await.unwrap();
    assert_eq!(github.stats().total_requests, 1);
    assert_eq!(gitlab.stats().total_requests, 0);
    assert_eq!(registry.services(), vec!["github", "gitlab"]);
    registry.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_resolves_waiters_of_every_limiter() {
    let mut profiles = ProfileTable::builtin();
    profiles.insert(ServiceProfile::github().with_initial_limit(0));
    profiles.insert(ServiceProfile::gitlab().with_initial_limit(0));
    let registry = Arc::new(LimiterRegistry::with_profiles(profiles));

    let mut waiters = Vec::new();
    for service in ["github", "gitlab"] {
        let limiter = registry.get_limiter(service);
        waiters.push(tokio::spawn(async move {
            limiter.wait(&WaitContext::background()).await
        }));
    }

    for service in ["github", "gitlab"] {
        let limiter = registry.get_limiter(service);
        while limiter.stats().throttled_requests == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    registry.stop().await;

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RateLimitError::Stopped { .. })));
    }
}

#[tokio::test]
async fn test_snapshot_serializes_all_limiters() {
    let registry = LimiterRegistry::new();
    registry.get_limiter("gitlab");
    registry.get_limiter("github");

    let json = serde_json::to_value(registry.snapshot()).unwrap();
    let limiters = json["limiters"].as_array().unwrap();
    assert_eq!(limiters.len(), 2);
    assert_eq!(limiters[0]["service"], "github");
    assert_eq!(limiters[1]["service"], "gitlab");
    assert_eq!(limiters[0]["stats"]["efficiency"], 1.0);
    registry.stop().await;
}
