use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kgfl_session::endpoints::{self, match_add_goal};
use kgfl_session::{EntityKind, FetchOutcome, SessionConfig, SessionContext};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

async fn context(server: &MockServer) -> SessionContext {
    SessionContext::builder(SessionConfig::with_base_url(format!("{}/api", server.uri())))
        .build()
        .expect("context builds")
}

async fn mount_list(server: &MockServer, p: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api{p}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn settle() {
    // Let spawned consumer refreshes run to completion.
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn goal_write_refreshes_top_scorers_but_not_clubs() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        endpoints::TOP_SCORERS,
        json!({"count": 1, "next": null, "previous": null, "results": [{"player": "Aidar", "goals": 7}]}),
    )
    .await;
    mount_list(&server, endpoints::CLUBS, json!([{"id": 1, "name": "Dordoi"}])).await;
    Mock::given(method("POST"))
        .and(path("/api/matches/42/add_goal/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 900})))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let top = ctx.list_consumer::<Value>(endpoints::top_scorers());
    let clubs = ctx.list_consumer::<Value>(endpoints::clubs());
    let _top_mount = top.mount(ctx.bus()).await.expect("mount top scorers");
    let _clubs_mount = clubs.mount(ctx.bus()).await.expect("mount clubs");

    assert_eq!(top.issued(), 1);
    assert_eq!(clubs.issued(), 1);
    assert_eq!(top.result().expect("initial fetch")[0]["goals"], 7);

    let mut top_state = top.watch();
    top_state.borrow_and_update();
    ctx.mutator()
        .post(
            &match_add_goal(42),
            json!({"player": 5, "minute": 63}),
            [EntityKind::PLAYER_STATS],
        )
        .await
        .expect("write accepted");

    tokio::time::timeout(
        Duration::from_secs(5),
        top_state.wait_for(|s| s.last_fetched_version == 2 && !s.loading),
    )
    .await
    .expect("top scorers refreshed in time")
    .expect("consumer alive");
    settle().await;

    assert_eq!(top.issued(), 2);
    assert_eq!(clubs.issued(), 1);

    let club_reads = server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|r| r.url.path() == "/api/clubs/")
        .count();
    assert_eq!(club_reads, 1);
}

#[tokio::test]
async fn failed_write_publishes_nothing() {
    let server = MockServer::start().await;
    mount_list(&server, endpoints::MATCHES, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/matches/42/add_goal/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "minute out of range"})))
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let matches = ctx.list_consumer::<Value>(endpoints::matches());
    let _mounted = matches.mount(ctx.bus()).await.expect("mount");

    let err = ctx
        .mutator()
        .post(&match_add_goal(42), json!({"minute": 300}), [EntityKind::GOAL])
        .await
        .expect_err("write rejected");
    assert_eq!(err.http_status(), Some(400));
    settle().await;
    assert_eq!(matches.issued(), 1);
}

#[tokio::test]
async fn unmounted_consumer_stops_refreshing() {
    let server = MockServer::start().await;
    mount_list(&server, endpoints::SEASONS, json!([{"id": 2025}])).await;

    let ctx = context(&server).await;
    let seasons = ctx.list_consumer::<Value>(endpoints::seasons());
    let mounted = seasons.mount(ctx.bus()).await.expect("mount");
    assert!(mounted.is_subscribed());
    assert_eq!(ctx.bus().subscribers_for(&EntityKind::SEASON), 1);

    assert_eq!(ctx.bus().publish_now(EntityKind::SEASON), 1);
    settle().await;
    assert_eq!(seasons.issued(), 2);

    let seasons = mounted.unmount();
    assert_eq!(ctx.bus().subscriber_count(), 0);
    assert_eq!(ctx.bus().publish_now(EntityKind::SEASON), 0);
    settle().await;
    assert_eq!(seasons.issued(), 2);
}

#[tokio::test]
async fn dropping_the_mount_unsubscribes() {
    let server = MockServer::start().await;
    mount_list(&server, endpoints::REFEREES, json!([])).await;

    let ctx = context(&server).await;
    let referees = ctx.list_consumer::<Value>(endpoints::referees());
    {
        let _mounted = referees.mount(ctx.bus()).await.expect("mount");
        assert_eq!(ctx.bus().subscriber_count(), 1);
    }
    assert_eq!(ctx.bus().subscriber_count(), 0);
}

#[tokio::test]
async fn shutdown_detaches_every_consumer() {
    let server = MockServer::start().await;
    mount_list(&server, endpoints::MEDIA, json!([])).await;

    let ctx = context(&server).await;
    let media = ctx.list_consumer::<Value>(endpoints::media());
    let mounted = media.mount(ctx.bus()).await.expect("mount");

    ctx.shutdown();
    assert!(!mounted.is_subscribed());
    assert_eq!(ctx.bus().publish_now(EntityKind::MEDIA), 0);
}

/// Answers the first read slowly with stale data, every later read at once.
struct SlowFirstRead {
    calls: AtomicUsize,
}

impl Respond for SlowFirstRead {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => ResponseTemplate::new(200)
                .set_body_json(json!([{"name": "stale"}]))
                .set_delay(Duration::from_millis(300)),
            _ => ResponseTemplate::new(200).set_body_json(json!([{"name": "fresh"}])),
        }
    }
}

#[tokio::test]
async fn late_response_from_superseded_fetch_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .respond_with(SlowFirstRead {
            calls: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let clubs = ctx.list_consumer::<Value>(endpoints::clubs());

    let (first, second) = tokio::join!(clubs.refresh(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        clubs.refresh().await
    });

    assert_eq!(first, FetchOutcome::Superseded);
    assert_eq!(second, FetchOutcome::Applied);
    let state = clubs.state();
    assert!(!state.loading);
    assert_eq!(state.last_fetched_version, 2);
    assert_eq!(state.result.expect("result")[0]["name"], "fresh");
}

#[tokio::test]
async fn loading_stays_set_until_the_latest_fetch_resolves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let clubs = ctx.list_consumer::<Value>(endpoints::clubs());
    let observer = clubs.clone();

    let (outcome, loading_mid_flight) = tokio::join!(clubs.refresh(), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        observer.is_loading()
    });
    assert_eq!(outcome, FetchOutcome::Applied);
    assert!(loading_mid_flight);
    assert!(!clubs.is_loading());
}

#[tokio::test]
async fn abandoned_fetch_does_not_leave_loading_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let clubs = ctx.list_consumer::<Value>(endpoints::clubs());

    let abandoned = tokio::time::timeout(Duration::from_millis(50), clubs.refresh()).await;
    assert!(abandoned.is_err(), "fetch dropped mid-flight");
    assert!(!clubs.is_loading());
    assert_eq!(clubs.last_fetched_version(), 0);

    assert_eq!(clubs.refresh().await, FetchOutcome::Applied);
    assert!(!clubs.is_loading());
    assert_eq!(clubs.last_fetched_version(), 2);
}

/// Succeeds once, then fails with a server error.
struct FailAfterFirst {
    calls: AtomicUsize,
}

impl Respond for FailAfterFirst {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => ResponseTemplate::new(200).set_body_json(json!([{"name": "Abdysh-Ata"}])),
            _ => ResponseTemplate::new(503).set_body_json(json!({"message": "maintenance"})),
        }
    }
}

#[tokio::test]
async fn failed_refresh_keeps_the_last_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .respond_with(FailAfterFirst {
            calls: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let ctx = context(&server).await;
    let clubs = ctx.list_consumer::<Value>(endpoints::clubs());

    assert_eq!(clubs.refresh().await, FetchOutcome::Applied);
    assert_eq!(clubs.refresh().await, FetchOutcome::Failed);

    let state = clubs.state();
    assert_eq!(state.last_fetched_version, 1);
    assert_eq!(state.result.expect("kept")[0]["name"], "Abdysh-Ata");
    let error = state.error.expect("error recorded");
    assert_eq!(error.http_status(), Some(503));
}

#[tokio::test]
async fn cache_buster_is_added_to_consumer_reads() {
    let server = MockServer::start().await;
    mount_list(&server, endpoints::PLAYERS, json!([])).await;

    let ctx = context(&server).await;
    let players = ctx.list_consumer::<Value>(endpoints::players());
    assert_eq!(players.refresh().await, FetchOutcome::Applied);

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].url.query_pairs().any(|(k, _)| k == "_ts"));
}
