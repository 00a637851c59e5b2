//! End-to-end pipeline tests: axum router behind the admission middleware,
//! with a canned geo resolver that counts database lookups.

use std::collections::HashMap;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::{middleware, Router};
use tower::ServiceExt;

use stategate::geo::{GeoRecord, GeoResolver, LookupError};
use stategate::{admission_middleware, Config, StateFilter};

struct CountingResolver {
    records: HashMap<IpAddr, GeoRecord>,
    calls: AtomicUsize,
}

impl CountingResolver {
    fn new(records: &[(&str, &str, &[&str])]) -> Self {
        let records = records
            .iter()
            .map(|(ip, country, subs)| {
                (
                    ip.parse().unwrap(),
                    GeoRecord {
                        country_code: country.to_string(),
                        subdivisions: subs.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self {
            records,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl GeoResolver for CountingResolver {
    fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, LookupError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.records
            .get(&ip)
            .cloned()
            .ok_or_else(|| LookupError(format!("no record for {ip}")))
    }
}

fn test_config() -> Config {
    Config {
        blocked_states: vec!["CA".to_string()],
        whitelisted_ips: vec!["9.9.9.9".to_string()],
        whitelisted_paths: vec!["/.well-known/acme-challenge/".to_string()],
        ..Config::default()
    }
}

fn build(
    records: &[(&str, &str, &[&str])],
    config: Config,
) -> (Router, Arc<StateFilter>, Arc<CountingResolver>) {
    let resolver = Arc::new(CountingResolver::new(records));
    let filter = Arc::new(StateFilter::with_resolver(
        &config,
        "test",
        Arc::clone(&resolver) as Arc<dyn GeoResolver>,
    ));

    let app = Router::new()
        .fallback(|| async { "upstream" })
        .layer(middleware::from_fn_with_state(
            Arc::clone(&filter),
            admission_middleware,
        ));

    (app, filter, resolver)
}

async fn send(app: &Router, path: &str, headers: &[(&str, &str)]) -> Response {
    let mut builder = Request::builder().uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut req = builder.body(Body::empty()).unwrap();

    let peer: SocketAddr = "192.0.2.9:4711".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));

    app.clone().oneshot(req).await.unwrap()
}

async fn body_string(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn blocked_state_gets_403_with_state_in_body() {
    let (app, _, _) = build(&[("1.2.3.4", "US", &["CA"])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/html"));

    let body = body_string(resp).await;
    assert!(body.contains("CA"));
}

#[tokio::test]
async fn unblocked_state_admitted() {
    let (app, _, _) = build(&[("1.2.3.4", "US", &["NY"])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "upstream");
}

#[tokio::test]
async fn non_us_denied_unconditionally() {
    let (app, _, _) = build(&[("81.2.69.142", "GB", &["ENG"])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "81.2.69.142")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(body_string(resp).await.contains("GB"));
}

#[tokio::test]
async fn us_without_subdivision_denied_unknown() {
    let (app, _, _) = build(&[("1.2.3.4", "US", &[])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(body_string(resp).await.contains("Unknown"));
}

#[tokio::test]
async fn whitelisted_ip_never_classified() {
    // would be denied as GB if the classifier ran
    let (app, _, resolver) = build(&[("9.9.9.9", "GB", &[])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "9.9.9.9")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test]
async fn whitelisted_path_reaches_upstream_once_with_no_geo_or_cache_activity() {
    let resolver = Arc::new(CountingResolver::new(&[("1.2.3.4", "GB", &[])]));
    let filter = Arc::new(StateFilter::with_resolver(
        &test_config(),
        "test",
        Arc::clone(&resolver) as Arc<dyn GeoResolver>,
    ));

    let upstream_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&upstream_hits);
    let app = Router::new()
        .fallback(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "upstream"
            }
        })
        .layer(middleware::from_fn_with_state(
            Arc::clone(&filter),
            admission_middleware,
        ));

    let resp = send(
        &app,
        "/.well-known/acme-challenge/token123",
        &[("x-forwarded-for", "1.2.3.4")],
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.calls(), 0);
    assert!(filter.cache().is_empty());
}

#[tokio::test]
async fn repeat_request_served_from_cache() {
    let (app, filter, resolver) = build(&[("1.2.3.4", "US", &["CA"])], test_config());

    let first = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;
    let second = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;

    assert_eq!(first.status(), StatusCode::FORBIDDEN);
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    assert_eq!(resolver.calls(), 1);
    assert_eq!(filter.cache().len(), 1);
}

#[tokio::test]
async fn xff_first_entry_decides() {
    // first XFF entry is the blocked Californian; second would be allowed
    let (app, _, _) = build(
        &[("1.2.3.4", "US", &["CA"]), ("5.6.7.8", "US", &["NY"])],
        test_config(),
    );

    let resp = send(&app, "/", &[("x-forwarded-for", "1.2.3.4, 5.6.7.8")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(body_string(resp).await.contains("CA"));
}

#[tokio::test]
async fn cf_connecting_ip_takes_precedence_over_xff() {
    let (app, _, _) = build(
        &[("1.2.3.4", "US", &["CA"]), ("5.6.7.8", "US", &["NY"])],
        test_config(),
    );

    let resp = send(
        &app,
        "/",
        &[
            ("cf-connecting-ip", "5.6.7.8"),
            ("x-forwarded-for", "1.2.3.4"),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn peer_address_used_when_no_headers() {
    // peer in send() is 192.0.2.9:4711
    let (app, _, resolver) = build(&[("192.0.2.9", "US", &["CA"])], test_config());

    let resp = send(&app, "/", &[]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn unknown_ip_fails_open_to_upstream() {
    // resolver has no record: lookup error, request admitted
    let (app, filter, _) = build(&[], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", "203.0.113.77")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(filter.cache().is_empty());
}

#[tokio::test]
async fn degenerate_xff_fails_open_without_classifying_peer() {
    // ", 5.6.7.8" resolves to the empty first entry; it cannot be parsed, so
    // the request is admitted and the (blockable) peer address is never
    // consulted
    let (app, filter, resolver) = build(&[("192.0.2.9", "GB", &[])], test_config());

    let resp = send(&app, "/", &[("x-forwarded-for", ", 5.6.7.8")]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resolver.calls(), 0);
    assert!(filter.cache().is_empty());
}

#[tokio::test]
async fn template_body_substitutes_state_marker() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "<html><body>Sorry, access from {{{{STATE}}}} is not permitted.</body></html>"
    )
    .unwrap();

    let config = Config {
        template_path: Some(file.path().display().to_string()),
        ..test_config()
    };
    let (app, _, _) = build(&[("1.2.3.4", "US", &["CA"])], config);

    let resp = send(&app, "/", &[("x-forwarded-for", "1.2.3.4")]).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_string(resp).await,
        "<html><body>Sorry, access from CA is not permitted.</body></html>"
    );
}
