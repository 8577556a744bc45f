//! End-to-end tests of the coordination server against real clients.

use accord_http_ratelimiting::{
    headers::Present, InMemoryRatelimiter, Method, Path, RatelimitHeaders, Ratelimiter,
};
use accord_rpc::{LockClient, RemoteRatelimiter, RpcServer};
use std::time::Duration;

async fn spawn_server() -> String {
    let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
    let address = server.local_addr().unwrap().to_string();

    tokio::spawn(server.run());

    address
}

#[tokio::test]
async fn coordinator_learns_and_enforces_budgets() {
    let address = spawn_server().await;
    let remote = RemoteRatelimiter::new(accord_rpc::RpcClient::new(address));

    let path = Path::new(Method::Post, "/channels/1/messages");

    // Unknown fingerprint: admitted immediately.
    assert_eq!(Duration::ZERO, remote.authorize(&path).await.unwrap());

    // Report an exhausted bucket.
    remote
        .update(
            &path,
            RatelimitHeaders::Present(Present::new(Some("b".to_owned()), 5, 0, 60_000)),
        )
        .await
        .unwrap();

    let wait = remote.authorize(&path).await.unwrap();
    assert!(wait > Duration::ZERO);
}

#[tokio::test]
async fn identify_lock_round_trip() {
    let address = spawn_server().await;

    let first = LockClient::new(address.clone());
    let second = LockClient::new(address);

    let grant = first.acquire(Duration::from_secs(30)).await.unwrap();
    assert!(grant.granted);

    // Another process is refused while the lease is live.
    let refused = second.acquire(Duration::from_secs(30)).await.unwrap();
    assert!(!refused.granted);

    // Renewing keeps it; releasing frees it.
    let renewal = first
        .renew(&grant.token, Duration::from_secs(30))
        .await
        .unwrap();
    assert!(renewal.granted);

    first.release(&grant.token).await.unwrap();

    let regrant = second.acquire(Duration::from_secs(30)).await.unwrap();
    assert!(regrant.granted);
}

#[tokio::test]
async fn unreachable_coordinator_falls_back() {
    // Nothing listens here.
    let client = accord_rpc::RpcClient::new("127.0.0.1:1");

    let local = InMemoryRatelimiter::new();
    let remote = RemoteRatelimiter::with_fallback(client, local.clone());

    let path = Path::new(Method::Get, "/guilds/5");

    // The fallback answers instead of surfacing the connection error.
    assert_eq!(Duration::ZERO, remote.authorize(&path).await.unwrap());

    remote
        .update(
            &path,
            RatelimitHeaders::Present(Present::new(Some("g".to_owned()), 1, 0, 60_000)),
        )
        .await
        .unwrap();

    // State landed in the local ratelimiter.
    assert!(local.authorize(&path).await.unwrap() > Duration::ZERO);
}

#[tokio::test]
async fn unreachable_coordinator_surfaces_without_fallback() {
    let client = accord_rpc::RpcClient::new("127.0.0.1:1");
    let remote = RemoteRatelimiter::new(client);

    let path = Path::new(Method::Get, "/guilds/5");

    assert!(remote.authorize(&path).await.is_err());
}
