use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tbot_leaderboard::config::Config;
use tbot_leaderboard::datasource::{AssetKind, DataSource, ReputationRequest, TransferPageRequest};
use tbot_leaderboard::error::{AppError, AppResult};
use tbot_leaderboard::services::leaderboard::LeaderboardResponse;
use tbot_leaderboard::services::transfers::{TimeRange, TransferFetcher, TransferQuery};
use tbot_leaderboard::{router, AppState};
use tokio::sync::Mutex;
use tower::ServiceExt;

type Canned = Result<Value, u16>;

#[derive(Default)]
struct StubDataSource {
    transfer_pages: Vec<Canned>,
    owner_reputation: Option<Canned>,
    token_reputation: HashMap<String, Canned>,
    catalogue: Option<Canned>,
    transfer_requests: Mutex<Vec<TransferPageRequest>>,
    reputation_requests: Mutex<Vec<ReputationRequest>>,
}

fn answer(canned: Option<&Canned>) -> AppResult<Value> {
    match canned {
        Some(Ok(body)) => Ok(body.clone()),
        Some(Err(status)) => Err(AppError::UpstreamError {
            status: *status,
            body: "stub failure".to_string(),
        }),
        None => Err(AppError::UpstreamError {
            status: 404,
            body: "not found".to_string(),
        }),
    }
}

#[async_trait]
impl DataSource for StubDataSource {
    async fn get_transfers(&self, request: &TransferPageRequest) -> AppResult<Value> {
        let mut requests = self.transfer_requests.lock().await;
        requests.push(request.clone());
        let index = requests.len() - 1;
        match self.transfer_pages.get(index) {
            Some(canned) => answer(Some(canned)),
            None => Ok(json!({ "nft_transfers": [] })),
        }
    }

    async fn get_reputation(&self, request: &ReputationRequest) -> AppResult<Value> {
        self.reputation_requests.lock().await.push(request.clone());
        match request {
            ReputationRequest::Catalogue => answer(self.catalogue.as_ref()),
            ReputationRequest::Owner { .. } => answer(self.owner_reputation.as_ref()),
            ReputationRequest::Token { token_id, .. } => answer(self.token_reputation.get(token_id)),
        }
    }
}

fn transfer(sender: &str, token_id: &str, ts: i64) -> Value {
    json!({
        "sender_id": sender,
        "method": "nft_transfer",
        "timestamp_nanosec": ts.to_string(),
        "args": { "token_id": token_id }
    })
}

fn full_page(size: usize) -> Canned {
    let records: Vec<Value> = (0..size)
        .map(|i| transfer(&format!("sender{}", i % 7), &i.to_string(), 1_000))
        .collect();
    Ok(json!({ "nft_transfers": records }))
}

fn app_with(stub: Arc<StubDataSource>, config: Config) -> axum::Router {
    let datasource: Arc<dyn DataSource> = stub;
    router(AppState::new(datasource, config))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn totals(body: &Value) -> Vec<(String, f64)> {
    let response: LeaderboardResponse = serde_json::from_value(body.clone()).unwrap();
    response
        .leaderboard
        .into_iter()
        .map(|entry| (entry.wallet, entry.total))
        .collect()
}

fn nft_query(limit: u32) -> TransferQuery {
    TransferQuery {
        kind: AssetKind::Nft,
        wallet_id: "owner.near".into(),
        limit,
        skip: 0,
        range: TimeRange::default(),
    }
}

#[tokio::test]
async fn pagination_stops_after_short_page() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(200), full_page(200), full_page(50)],
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 500);

    let fetched = fetcher.fetch_all(nft_query(200)).await;

    assert_eq!(fetched.raw_count, 450);
    assert_eq!(fetched.records.len(), 450);
    assert_eq!(fetched.pages, 3);

    let requests = stub.transfer_requests.lock().await;
    let skips: Vec<u64> = requests.iter().map(|r| r.skip).collect();
    assert_eq!(skips, vec![0, 200, 400]);
    assert!(requests.iter().all(|r| r.limit == 200 && r.wallet_id == "owner.near"));
}

#[tokio::test]
async fn pagination_keeps_partial_result_on_failure() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(200), Err(502), full_page(200)],
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 500);

    let fetched = fetcher.fetch_all(nft_query(200)).await;

    assert_eq!(fetched.records.len(), 200);
    assert_eq!(stub.transfer_requests.lock().await.len(), 2);
}

#[tokio::test]
async fn pagination_stops_on_empty_or_unreadable_page() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(10), Ok(json!({ "detail": "maintenance" }))],
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 500);

    let fetched = fetcher.fetch_all(nft_query(10)).await;

    assert_eq!(fetched.records.len(), 10);
    assert_eq!(stub.transfer_requests.lock().await.len(), 2);
}

#[tokio::test]
async fn page_cap_bounds_endless_upstream() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: (0..10).map(|_| full_page(5)).collect(),
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 3);

    let fetched = fetcher.fetch_all(nft_query(5)).await;

    assert_eq!(fetched.pages, 3);
    assert_eq!(stub.transfer_requests.lock().await.len(), 3);
}

#[tokio::test]
async fn pages_are_fetched_lazily() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(5), full_page(5), full_page(5)],
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 500);

    let first: Vec<_> = fetcher.pages(nft_query(5)).take(1).collect().await;

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].raw_len, 5);
    assert_eq!(stub.transfer_requests.lock().await.len(), 1);
}

#[tokio::test]
async fn missing_wallet_is_bad_request_without_upstream_calls() {
    let stub = Arc::new(StubDataSource::default());
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/nft-reputation?limit=10").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter wallet_id is required");
    assert!(stub.transfer_requests.lock().await.is_empty());
    assert!(stub.reputation_requests.lock().await.is_empty());
}

#[tokio::test]
async fn ranks_senders_by_owner_reputation() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [
                transfer("a", "1", 10),
                transfer("a", "2", 20),
                transfer("b", "1", 30),
            ]
        }))],
        owner_reputation: Some(Ok(json!({
            "nfts": [
                { "token_id": "1", "reputation": 10 },
                { "token_id": "2", "reputation": 5 },
                { "token_id": "99", "reputation": 1000 }
            ]
        }))),
        ..Default::default()
    });
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/nft-reputation?wallet_id=owner.near").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        totals(&body),
        vec![("a".to_string(), 15.0), ("b".to_string(), 10.0)]
    );
    assert!(body.get("debug").is_none());
    assert!(body["leaderboard"][0].get("tokens").is_none());

    let reputation_requests = stub.reputation_requests.lock().await;
    assert_eq!(
        *reputation_requests,
        vec![ReputationRequest::Owner {
            owner: "owner.near".into()
        }]
    );
}

#[tokio::test]
async fn reputation_outage_still_returns_zero_totals() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [transfer("a", "1", 1), transfer("b", "2", 2), transfer("a", "3", 3)]
        }))],
        owner_reputation: Some(Err(500)),
        ..Default::default()
    });
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/nft-reputation?wallet_id=owner.near").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        totals(&body),
        vec![("a".to_string(), 0.0), ("b".to_string(), 0.0)]
    );
    // no single-token lookups once the bulk call failed
    assert_eq!(stub.reputation_requests.lock().await.len(), 1);
}

#[tokio::test]
async fn required_reputation_failure_is_server_error() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({ "nft_transfers": [transfer("a", "1", 1)] }))],
        owner_reputation: Some(Err(503)),
        ..Default::default()
    });
    let config = Config {
        reputation_required: true,
        ..Config::default()
    };
    let app = app_with(stub, config);

    let (status, body) = get(app, "/api/nft-reputation?wallet_id=owner.near").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Reputation API 503");
}

#[tokio::test]
async fn single_token_fallback_fills_gaps_and_shows_in_debug() {
    let mut token_reputation = HashMap::new();
    token_reputation.insert("2".to_string(), Ok(json!({ "token_id": "2", "reputation": 7 })));
    token_reputation.insert("3".to_string(), Err(500));

    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [transfer("a", "1", 1), transfer("b", "2", 2), transfer("c", "3", 3)]
        }))],
        owner_reputation: Some(Ok(json!({ "nfts": [{ "token_id": "1", "reputation": 4 }] }))),
        token_reputation,
        ..Default::default()
    });
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/nft-reputation?wallet_id=owner.near&debug=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        totals(&body),
        vec![
            ("b".to_string(), 7.0),
            ("a".to_string(), 4.0),
            ("c".to_string(), 0.0)
        ]
    );

    let debug = &body["debug"];
    assert_eq!(debug["observed_token_ids"], json!(["1", "2", "3"]));
    assert_eq!(debug["fallback_token_ids"], json!(["2"]));
    assert_eq!(debug["unmatched_keys"], json!(["3"]));
    assert_eq!(debug["key_kind"], "token_id");
    assert_eq!(debug["pages_fetched"], 1);
    assert_eq!(debug["reputation_payloads"].as_array().map(Vec::len), Some(2));

    assert_eq!(stub.reputation_requests.lock().await.len(), 3);
}

#[tokio::test]
async fn fallback_lookups_are_capped() {
    let records: Vec<Value> = (0..6).map(|i| transfer("a", &i.to_string(), 1)).collect();
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({ "nft_transfers": records }))],
        owner_reputation: Some(Ok(json!({ "nfts": [] }))),
        ..Default::default()
    });
    let config = Config {
        fallback_lookup_limit: 2,
        ..Config::default()
    };
    let app = app_with(stub.clone(), config);

    let (status, _) = get(app, "/api/nft-reputation?wallet_id=owner.near&limit=50").await;

    assert_eq!(status, StatusCode::OK);
    // one bulk call plus two single-token calls
    assert_eq!(stub.reputation_requests.lock().await.len(), 3);
}

#[tokio::test]
async fn time_window_is_inclusive_and_filters_totals() {
    // 2024-01-01T00:00:00Z and 2024-01-02T00:00:00Z in nanoseconds
    let start: i64 = 1_704_067_200_000_000_000;
    let end: i64 = 1_704_153_600_000_000_000;

    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [
                transfer("early", "1", start - 1),
                transfer("edge_start", "1", start),
                transfer("inside", "1", start + 5),
                transfer("edge_end", "1", end),
                transfer("late", "1", end + 1),
            ]
        }))],
        owner_reputation: Some(Ok(json!([{ "token_id": "1", "reputation": 2 }]))),
        ..Default::default()
    });
    let app = app_with(stub, Config::default());

    let (status, body) = get(
        app,
        "/api/nft-reputation?wallet_id=owner.near&start_time=2024-01-01T00:00:00Z&end_time=2024-01-02T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        totals(&body),
        vec![
            ("edge_start".to_string(), 2.0),
            ("inside".to_string(), 2.0),
            ("edge_end".to_string(), 2.0)
        ]
    );
}

#[tokio::test]
async fn invalid_time_bounds_exclude_nothing() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [transfer("a", "1", 1), transfer("b", "1", i64::MAX)]
        }))],
        owner_reputation: Some(Ok(json!({ "nfts": [] }))),
        ..Default::default()
    });
    let app = app_with(stub, Config::default());

    let (status, body) = get(
        app,
        "/api/nft-reputation?wallet_id=owner.near&start_time=not-a-date&end_time=",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(totals(&body).len(), 2);
}

#[tokio::test]
async fn title_catalogue_board_lists_contributing_tokens() {
    let titled = |sender: &str, title: &str| {
        json!({ "sender_id": sender, "args": { "token_id": title.len().to_string(), "title": title } })
    };
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [
                titled("x", "Gold Medal"),
                titled("y", "Bronze"),
                titled("x", "gold medal "),
                titled("x", "Unlisted"),
            ]
        }))],
        catalogue: Some(Ok(json!({
            "reputation_records": [
                { "title": "Gold Medal", "reputation": 10 },
                { "title": "Bronze", "reputation": 1 }
            ]
        }))),
        ..Default::default()
    });
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/nft-title-reputation?wallet_id=owner.near").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        totals(&body),
        vec![("x".to_string(), 20.0), ("y".to_string(), 1.0)]
    );
    assert_eq!(
        body["leaderboard"][0]["tokens"],
        json!([{ "title": "Gold Medal", "rep": 10.0 }])
    );
    assert_eq!(
        *stub.reputation_requests.lock().await,
        vec![ReputationRequest::Catalogue]
    );
}

#[tokio::test]
async fn ft_transfers_forward_upstream_status() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Err(503)],
        ..Default::default()
    });
    let app = app_with(stub, Config::default());

    let (status, body) = get(app, "/api/ft-transfers?wallet_id=oao_north.near").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Upstream 503: stub failure");
}

#[tokio::test]
async fn grecha_passes_the_default_page_through() {
    let page = json!({ "transfers": [{ "from": "x", "amount": "5" }] });
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(page.clone())],
        ..Default::default()
    });
    let app = app_with(stub.clone(), Config::default());

    let (status, body) = get(app, "/api/grecha").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, page);

    let requests = stub.transfer_requests.lock().await;
    assert_eq!(
        requests[0],
        TransferPageRequest {
            kind: AssetKind::Ft {
                symbol: "GRECHA".into()
            },
            wallet_id: "oao_north.near".into(),
            limit: 200,
            skip: 0,
        }
    );
}

#[tokio::test]
async fn offset_at_u64_max_stops_after_one_page() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(200), full_page(200)],
        ..Default::default()
    });
    let fetcher = TransferFetcher::new(stub.clone(), 500);

    let fetched = fetcher
        .fetch_all(TransferQuery {
            skip: u64::MAX,
            ..nft_query(200)
        })
        .await;

    assert_eq!(fetched.pages, 1);
    assert_eq!(fetched.records.len(), 200);

    let requests = stub.transfer_requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].skip, u64::MAX);
}

#[tokio::test]
async fn maximal_skip_query_is_served_without_rereading_pages() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![full_page(200), full_page(200)],
        owner_reputation: Some(Ok(json!({ "nfts": [] }))),
        ..Default::default()
    });
    let config = Config {
        fallback_lookup_limit: 0,
        ..Config::default()
    };
    let app = app_with(stub.clone(), config);

    let (status, body) = get(
        app,
        "/api/nft-reputation?wallet_id=owner.near&skip=18446744073709551615&debug=true",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["debug"]["pages_fetched"], 1);
    assert_eq!(body["debug"]["transfers_fetched"], 200);
    assert_eq!(stub.transfer_requests.lock().await.len(), 1);
}

#[tokio::test]
async fn non_numeric_reputation_counts_as_unmatched() {
    let stub = Arc::new(StubDataSource {
        transfer_pages: vec![Ok(json!({
            "nft_transfers": [transfer("a", "1", 1), transfer("b", "2", 2)]
        }))],
        owner_reputation: Some(Ok(json!([
            { "token_id": "1", "reputation": "NaN" },
            { "token_id": "2", "reputation": 5 }
        ]))),
        ..Default::default()
    });
    let config = Config {
        fallback_lookup_limit: 0,
        ..Config::default()
    };
    let app = app_with(stub, config);

    let (status, body) = get(app, "/api/nft-reputation?wallet_id=owner.near").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["leaderboard"]
        .as_array()
        .unwrap()
        .iter()
        .all(|entry| entry["total"].is_number()));
    assert_eq!(
        totals(&body),
        vec![("b".to_string(), 5.0), ("a".to_string(), 0.0)]
    );
}

#[tokio::test]
async fn repeated_query_key_is_json_bad_request() {
    let stub = Arc::new(StubDataSource::default());

    for uri in [
        "/api/nft-reputation?wallet_id=a.near&wallet_id=b.near",
        "/api/nft-title-reputation?wallet_id=a.near&wallet_id=b.near",
        "/api/ft-transfers?wallet_id=a.near&wallet_id=b.near",
    ] {
        let app = app_with(stub.clone(), Config::default());
        let (status, body) = get(app, uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
        assert_eq!(body["status"], 400);
    }

    assert!(stub.transfer_requests.lock().await.is_empty());
    assert!(stub.reputation_requests.lock().await.is_empty());
}
