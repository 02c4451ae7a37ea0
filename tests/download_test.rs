mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

use common::{fast_config, serve};
use site_cloner::download::{download_all, AssetOutcome};
use site_cloner::fetcher::Fetcher;
use site_cloner::output::OutputLayout;
use site_cloner::{AssetCategory, AssetRegistry};

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[tokio::test]
async fn downloads_never_exceed_concurrency_limit() {
    let in_flight = Arc::new(InFlight::default());
    let tracker = in_flight.clone();
    let app = Router::new().route(
        "/js/:name",
        get(move || {
            let tracker = tracker.clone();
            async move {
                let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
                tracker.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                tracker.current.fetch_sub(1, Ordering::SeqCst);
                "void 0"
            }
        }),
    );
    let addr = serve(app).await;

    let mut registry = AssetRegistry::new();
    for n in 0..12 {
        registry.insert(AssetCategory::Script, &format!("http://{addr}/js/{n}.js"));
    }
    let tmp = TempDir::new().unwrap();
    let output = OutputLayout::new(tmp.path());
    output.scaffold().await.unwrap();
    let fetcher = Fetcher::new(&fast_config()).unwrap();

    let report = download_all(&registry, &fetcher, &output, 3, |_| {}).await;

    assert_eq!(report.saved(AssetCategory::Script), 12);
    let peak = in_flight.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak {peak} exceeded limit");
    assert!(peak > 1, "downloads ran one at a time");
    assert!(tmp.path().join("js/script_11.js").exists());
}

#[tokio::test]
async fn unwritable_output_fails_the_asset() {
    let addr = serve(Router::new().route("/a.css", get(|| async { "a {}" }))).await;
    let mut registry = AssetRegistry::new();
    registry.insert(AssetCategory::Stylesheet, &format!("http://{addr}/a.css"));
    let tmp = TempDir::new().unwrap();
    // Never scaffolded, so css/ does not exist.
    let output = OutputLayout::new(tmp.path().join("missing"));
    let fetcher = Fetcher::new(&fast_config()).unwrap();
    let outcomes = Mutex::new(Vec::new());

    let report = download_all(&registry, &fetcher, &output, 4, |outcome| {
        outcomes.lock().unwrap().push(outcome.clone())
    })
    .await;

    assert_eq!(report.total_saved(), 0);
    assert_eq!(report.bytes_written, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].category, AssetCategory::Stylesheet);
    let outcomes = outcomes.into_inner().unwrap();
    assert!(matches!(outcomes.as_slice(), [AssetOutcome::Failed { .. }]));
    assert!(!tmp.path().join("missing/css/style_0.css").exists());
}
