//! Rate-limit recovery across two accounts: a 429 on the first account must
//! rotate to the second and still return the parsed records within the
//! same logical call.

use std::collections::HashMap;
use std::time::Duration;

use catalog_core::account_pool::AccountStatusLabel;
use catalog_core::query::{build_query_path, Predicate, QueryType};
use catalog_infra::account_pool::AccountPool;
use catalog_infra::upstream_client::{UpstreamClient, DEFAULT_TIMEOUT};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gp_refresh_path(constellation_contains: &str) -> String {
    let predicates = vec![
        Predicate::Contains { field: "OBJECT_NAME".to_string(), value: constellation_contains.to_string() },
        Predicate::IsNull { field: "DECAY_DATE".to_string() },
    ];
    format!("/{}", build_query_path(QueryType::GpRefresh.upstream_class(), &predicates, "NORAD_CAT_ID", true))
}

#[tokio::test(start_paused = true)]
async fn second_account_recovers_after_first_is_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ajaxauth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("login ok"))
        .mount(&server)
        .await;

    let query_path = gp_refresh_path("STARLINK");

    Mock::given(method("GET"))
        .and(path(&query_path))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let body = r#"[{"NORAD_CAT_ID":"44713","OBJECT_NAME":"STARLINK-1007","EPOCH":"2024-01-15T06:30:00"}]"#;
    Mock::given(method("GET"))
        .and(path(&query_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut credentials = HashMap::new();
    credentials.insert("accountA".to_string(), "secretA".to_string());
    credentials.insert("accountB".to_string(), "secretB".to_string());
    let client = UpstreamClient::new(server.uri(), credentials);
    let pool = AccountPool::new(vec!["accountA".to_string(), "accountB".to_string()]);

    let predicates = vec![
        Predicate::Contains { field: "OBJECT_NAME".to_string(), value: "STARLINK".to_string() },
        Predicate::IsNull { field: "DECAY_DATE".to_string() },
    ];
    let result = client
        .execute_query(&pool, QueryType::GpRefresh, "starlink", &predicates, "NORAD_CAT_ID", true, DEFAULT_TIMEOUT)
        .await
        .expect("retry-and-rotate should recover via the second account");

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].norad_cat_id.as_deref(), Some("44713"));

    let snapshot = pool.status_snapshot().await;
    let rate_limited = snapshot.iter().filter(|a| a.status == AccountStatusLabel::RateLimited).count();
    assert_eq!(rate_limited, 1, "exactly one account should have taken the 429");

    let recovered = snapshot
        .iter()
        .find(|a| a.status != AccountStatusLabel::RateLimited)
        .expect("the other account should remain usable");
    assert_eq!(recovered.total_requests, 1);
    assert_eq!(recovered.consecutive_errors, 0);
}
