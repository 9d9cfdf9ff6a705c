use crate::support::{
    crawler, detail_page, fast_config, page_url, results_page, seed, Card, ScriptedSite,
};
use mora_core::{CrawlStatus, PropertyType, QualityFlag};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_crawl_collects_records_from_results_page() {
    let cards = [
        Card::complete("mx-1", "/p/mx-1.html"),
        Card {
            id: Some("mx-2"),
            href: Some("/p/mx-2.html"),
            title: "Consultorio en Roma Norte",
            price: None,
            location: Some("Roma Norte, Cuauhtémoc"),
            features: &["38 m²"],
        },
    ];
    let site = ScriptedSite::new().page("/consultorios", results_page(&cards, None));

    let mut config = fast_config();
    config.follow_details = false;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 1);
    assert_eq!(outcome.summary.records_emitted, 2);
    assert_eq!(outcome.summary.flagged_records, 1);

    // Output is sorted by id.
    assert_eq!(outcome.records[0].id, "mx-1");
    assert_eq!(outcome.records[1].id, "mx-2");

    let first = &outcome.records[0];
    assert_eq!(first.title.as_deref(), Some("Consultorio en Polanco"));
    assert_eq!(first.area_m2, Some(45.0));
    assert_eq!(first.rooms, Some(2));
    assert!(first.quality_flags.is_empty());
    assert_eq!(
        first.location.as_ref().and_then(|l| l.alcaldia.as_deref()),
        Some("Miguel Hidalgo")
    );

    let second = &outcome.records[1];
    assert!(second.price.is_none());
    assert!(second.quality_flags.contains(&QualityFlag::PriceMissing));
}

#[tokio::test]
async fn test_crawl_follows_pagination() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[
                    Card::complete("mx-1", "/p/mx-1.html"),
                    Card::complete("mx-2", "/p/mx-2.html"),
                ],
                Some("/consultorios?pagina=2"),
            ),
        )
        .page(
            "/consultorios?pagina=2",
            results_page(&[Card::complete("mx-3", "/p/mx-3.html")], None),
        );

    let mut config = fast_config();
    config.follow_details = false;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 2);
    assert_eq!(outcome.summary.records_emitted, 3);
}

#[tokio::test]
async fn test_detail_pages_enrich_card_records() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(&[Card::complete("mx-1", "/p/mx-1.html")], None),
        )
        .page(
            "/p/mx-1.html",
            detail_page(
                "mx-1",
                "Consultorio equipado en Polanco",
                "$25,000 MXN por mes",
                "Av. Horacio 1030, Polanco, Miguel Hidalgo",
            ),
        );

    let outcome = crawler(site, fast_config())
        .crawl(vec![seed("/consultorios")])
        .await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 2);
    // The card and the detail page collapse into one record, and the richer
    // detail extraction wins the merge.
    assert_eq!(outcome.records.len(), 1);

    let record = &outcome.records[0];
    assert_eq!(record.id, "mx-1");
    assert_eq!(record.property_type, Some(PropertyType::Consultorio));
    assert_eq!(
        record.title.as_deref(),
        Some("Consultorio equipado en Polanco")
    );
    assert_eq!(
        record.location.as_ref().and_then(|l| l.colonia.as_deref()),
        Some("Polanco")
    );
}

#[tokio::test]
async fn test_duplicate_listings_collapse_across_pages() {
    // mx-1 appears on both result pages.
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[Card::complete("mx-1", "/p/mx-1.html")],
                Some("/consultorios?pagina=2"),
            ),
        )
        .page(
            "/consultorios?pagina=2",
            results_page(
                &[
                    Card::complete("mx-1", "/p/mx-1.html"),
                    Card::complete("mx-2", "/p/mx-2.html"),
                ],
                None,
            ),
        );

    let mut config = fast_config();
    config.follow_details = false;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.records_emitted, 2);
    let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["mx-1", "mx-2"]);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(&[Card::complete("mx-1", "/p/mx-1.html")], None),
        )
        .failing_transiently("/consultorios", 2);
    let attempts = site.attempt_log();

    let mut config = fast_config();
    config.follow_details = false;
    config.max_attempts = 3;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_skipped, 0);
    assert_eq!(outcome.records.len(), 1);
    // Two failed attempts plus the one that succeeded.
    assert_eq!(attempts.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_skip_the_page() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[Card::complete("mx-1", "/p/mx-1.html")],
                Some("/consultorios?pagina=2"),
            ),
        )
        .failing_transiently("/consultorios?pagina=2", 10);
    let attempts = site.attempt_log();

    let mut config = fast_config();
    config.follow_details = false;
    config.max_attempts = 3;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    // A transient failure on a discovered page is not fatal.
    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 1);
    assert_eq!(outcome.summary.pages_skipped, 1);
    assert_eq!(outcome.records.len(), 1);
    // One attempt for the seed, max_attempts for the broken page.
    assert_eq!(attempts.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_permanent_seed_failure_aborts() {
    let site = ScriptedSite::new().failing_permanently("/consultorios");
    let attempts = site.attempt_log();

    let outcome = crawler(site, fast_config())
        .crawl(vec![seed("/consultorios")])
        .await;

    assert_eq!(outcome.summary.status, CrawlStatus::Aborted);
    assert_eq!(outcome.summary.pages_skipped, 1);
    assert!(outcome.records.is_empty());
    // Permanent failures are not retried.
    assert_eq!(attempts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
    // The transient failure forces a backoff wait, so cancellation is
    // observed while the first page is still in flight.
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[Card::complete("mx-1", "/p/mx-1.html")],
                Some("/consultorios?pagina=2"),
            ),
        )
        .page(
            "/consultorios?pagina=2",
            results_page(&[Card::complete("mx-2", "/p/mx-2.html")], None),
        )
        .failing_transiently("/consultorios", 1);

    let mut config = fast_config();
    config.follow_details = false;
    config.backoff_base = std::time::Duration::from_millis(50);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = crawler(site, config)
        .crawl_with_cancellation(vec![seed("/consultorios")], cancel)
        .await;

    assert_eq!(outcome.summary.status, CrawlStatus::Aborted);
    // The in-flight seed page is drained, the discovered page is never
    // dispatched.
    assert_eq!(outcome.summary.pages_fetched, 1);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].id, "mx-1");
}

#[tokio::test]
async fn test_max_pages_budget_stops_the_crawl() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[Card::complete("mx-1", "/p/mx-1.html")],
                Some("/consultorios?pagina=2"),
            ),
        )
        .page(
            "/consultorios?pagina=2",
            results_page(
                &[Card::complete("mx-2", "/p/mx-2.html")],
                Some("/consultorios?pagina=3"),
            ),
        )
        .page(
            "/consultorios?pagina=3",
            results_page(&[Card::complete("mx-3", "/p/mx-3.html")], None),
        );

    let mut config = fast_config();
    config.follow_details = false;
    config.max_pages = 2;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    // Budget exhaustion is a normal completion, not an abort.
    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 2);
    assert_eq!(outcome.summary.records_emitted, 2);
}

#[tokio::test]
async fn test_max_records_budget_stops_the_crawl() {
    let site = ScriptedSite::new().page(
        "/consultorios",
        results_page(
            &[
                Card::complete("mx-1", "/p/mx-1.html"),
                Card::complete("mx-2", "/p/mx-2.html"),
                Card::complete("mx-3", "/p/mx-3.html"),
            ],
            Some("/consultorios?pagina=2"),
        ),
    );

    let mut config = fast_config();
    config.follow_details = false;
    config.max_records = Some(2);
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 1);
    // Pages already in flight still land, so the cap can be overshot by up
    // to one page's worth of records.
    assert_eq!(outcome.summary.records_emitted, 3);
}

#[tokio::test]
async fn test_unrecognized_layout_is_counted_not_fatal() {
    let site = ScriptedSite::new()
        .page(
            "/consultorios",
            results_page(
                &[Card::complete("mx-1", "/p/mx-1.html")],
                Some("/consultorios?pagina=2"),
            ),
        )
        .page(
            "/consultorios?pagina=2",
            "<html><body><h1>Sitio en mantenimiento</h1></body></html>".to_string(),
        );

    let mut config = fast_config();
    config.follow_details = false;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.status, CrawlStatus::Completed);
    assert_eq!(outcome.summary.pages_fetched, 2);
    assert_eq!(outcome.summary.unrecognized_layouts, 1);
    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn test_candidates_without_identity_are_dropped() {
    let cards = [
        Card::complete("mx-1", "/p/mx-1.html"),
        // No data-id and no link: nothing to derive an id from.
        Card {
            id: None,
            href: None,
            title: "Consultorio sin enlace",
            price: Some("$10,000 MXN"),
            location: Some("Del Valle, Benito Juárez"),
            features: &[],
        },
    ];
    let site = ScriptedSite::new().page("/consultorios", results_page(&cards, None));

    let mut config = fast_config();
    config.follow_details = false;
    let outcome = crawler(site, config).crawl(vec![seed("/consultorios")]).await;

    assert_eq!(outcome.summary.dropped_candidates, 1);
    assert_eq!(outcome.summary.records_emitted, 1);
}

#[tokio::test]
async fn test_seed_url_helper_resolves_against_base() {
    assert_eq!(
        page_url("/consultorios?pagina=2").as_str(),
        "https://portal.test/consultorios?pagina=2"
    );
}
