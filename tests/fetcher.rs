use std::time::Duration;

use pretty_assertions::assert_eq;
use proxy_harvest::{
    FetchError, FetcherConfig, ProxySource, RetryPolicy, Scheme, SourceFetcher, SourceFormat,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_fetcher(max_retries: u32) -> SourceFetcher {
    let config = FetcherConfig::new()
        .with_timeout(Duration::from_secs(2))
        .with_retry(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        });
    SourceFetcher::with_config(config).unwrap()
}

#[tokio::test]
async fn fetch_returns_body_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/http.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("1.2.3.4:8080\n", "text/plain; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetched = fast_fetcher(3)
        .fetch(&format!("{}/http.txt", server.uri()))
        .await
        .expect("fetch ok");

    assert_eq!(fetched.body, "1.2.3.4:8080\n");
    assert!(fetched.content_type.unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn fetch_retries_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("5.6.7.8:3128"))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = fast_fetcher(3)
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .expect("fetch should succeed after retries");
    assert_eq!(fetched.body, "5.6.7.8:3128");
}

#[tokio::test]
async fn fetch_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = fast_fetcher(2)
        .fetch(&format!("{}/down", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Status(500));
}

#[tokio::test]
async fn fetch_does_not_retry_terminal_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fast_fetcher(3)
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Status(404));
}

#[tokio::test]
async fn fetch_reports_connection_refused_as_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fast_fetcher(1)
        .fetch(&format!("http://{}/list", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn fetch_source_parses_json_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"ip": "1.2.3.4", "port": "8080", "protocols": ["http"], "country": "US"},
                {"ip": "bad", "port": "x"}
            ]
        })))
        .mount(&server)
        .await;

    let source = ProxySource::new("mock-json", &format!("{}/api", server.uri()), Scheme::Http);
    let report = fast_fetcher(0).fetch_source(source).await;

    let attempt = report.result.expect("source ok");
    assert_eq!(attempt.format, SourceFormat::Json);
    assert_eq!(attempt.candidates.len(), 1);
    assert_eq!(attempt.candidates[0].host, "1.2.3.4");
    assert_eq!(attempt.candidates[0].country.as_deref(), Some("US"));
}
