//! Whole-document scans: batching, loop merging and failure policy.

mod common;

use common::{FakeFetcher, decode_calls, document, expected, machine, url};
use core::time::Duration;
use tokio::time::timeout;
use webp_machine::{Element, FailurePolicy, MachineError, PolyfillConfig};

const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn scan_polyfills_every_match_in_document_order() {
    let fetcher = FakeFetcher::default();
    let machine = machine(
        fetcher.clone(),
        PolyfillConfig::new("img, div[data-bg]", FailurePolicy::Abort),
    );
    let mut doc = document();
    let cat = doc.append(Element::image("cat.webp"));
    let logo = doc.append(Element::image("logo.png"));
    let hero = doc.append(Element::new("div").with_attr("data-bg", "hero.webp"));
    let styled = doc.append(Element::background("skipped.webp"));

    let report = machine.polyfill_document(&doc, None).await.unwrap();

    assert_eq!(report.queued, 3);
    assert_eq!(report.processed, 3);
    assert!(!report.merged);
    assert!(report.failures.is_empty());
    assert_eq!(fetcher.fetched(), [url("cat.webp"), url("hero.webp")]);
    assert_eq!(cat.attribute("src"), Some(expected("cat.webp")));
    assert_eq!(logo.attribute("src").as_deref(), Some("logo.png"));
    assert_eq!(
        hero.background_image(),
        Some(format!("url(\"{}\")", expected("hero.webp")))
    );
    // Not matched by the selector list.
    assert_eq!(styled.background_image().as_deref(), Some("url(\"skipped.webp\")"));
    assert!(!machine.is_processing());
    assert_eq!(machine.pending(), 0);
}

#[tokio::test]
async fn explicit_selector_overrides_configured_default() {
    let fetcher = FakeFetcher::default();
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut doc = document();
    doc.append(Element::image("plain.webp"));
    let lazy = doc.append(Element::image("lazy.webp").with_attr("class", "lazy"));

    let report = machine.polyfill_document(&doc, Some("img.lazy")).await.unwrap();

    assert_eq!(report.queued, 1);
    assert_eq!(fetcher.fetched(), [url("lazy.webp")]);
    assert_eq!(lazy.attribute("src"), Some(expected("lazy.webp")));
}

#[tokio::test]
async fn overlapping_scans_merge_into_one_loop_newest_first() {
    let (fetcher, reached, release) = FakeFetcher::gated("a1.webp");
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut older = document();
    older.append(Element::image("a1.webp"));
    let a2 = older.append(Element::image("a2.webp"));
    let mut newer = document();
    let b1 = newer.append(Element::image("b1.webp"));
    newer.append(Element::image("b2.webp"));

    let first = machine.polyfill_document(&older, None);
    let second = async {
        reached.notified().await;
        assert!(machine.is_processing());
        let report = machine.polyfill_document(&newer, None).await.unwrap();
        // Returned without waiting: b1, b2 and a2 are still queued.
        assert_eq!(machine.pending(), 3);
        release.notify_one();
        report
    };
    let (first, second) = timeout(LIMIT, async { tokio::join!(first, second) })
        .await
        .unwrap();

    let first = first.unwrap();
    assert!(!first.merged);
    assert_eq!(first.queued, 2);
    assert_eq!(first.processed, 4);
    assert!(second.merged);
    assert_eq!(second.queued, 2);
    assert_eq!(second.processed, 0);

    assert_eq!(
        fetcher.fetched(),
        [url("a1.webp"), url("b1.webp"), url("b2.webp"), url("a2.webp")]
    );
    assert_eq!(decode_calls(&machine), 4);
    assert_eq!(b1.attribute("src"), Some(expected("b1.webp")));
    assert_eq!(a2.attribute("src"), Some(expected("a2.webp")));
    assert!(!machine.is_processing());
}

#[tokio::test]
async fn failure_aborts_loop_and_discards_remaining_elements() {
    let fetcher = FakeFetcher::default();
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut doc = document();
    let first = doc.append(Element::image("a.webp"));
    doc.append(Element::image("corrupt.webp"));
    let third = doc.append(Element::image("c.webp"));

    let err = machine.polyfill_document(&doc, None).await.unwrap_err();

    assert!(matches!(err, MachineError::PolyfillFailed { .. }));
    assert_eq!(err.url(), Some(url("corrupt.webp").as_str()));
    assert!(matches!(err.root(), MachineError::DecodeFailed { .. }));
    assert_eq!(fetcher.fetched(), [url("a.webp"), url("corrupt.webp")]);
    assert_eq!(first.attribute("src"), Some(expected("a.webp")));
    assert_eq!(third.attribute("src").as_deref(), Some("c.webp"));
    assert!(!machine.is_processing());
    assert_eq!(machine.pending(), 0);
}

#[tokio::test]
async fn abort_drops_merged_batches_until_rescanned() {
    let (fetcher, reached, release) = FakeFetcher::gated("corrupt.webp");
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut older = document();
    older.append(Element::image("corrupt.webp"));
    let tail = older.append(Element::image("tail.webp"));
    let mut newer = document();
    let merged = newer.append(Element::image("merged.webp"));

    let first = machine.polyfill_document(&older, None);
    let second = async {
        reached.notified().await;
        let report = machine.polyfill_document(&newer, None).await.unwrap();
        release.notify_one();
        report
    };
    let (first, second) = timeout(LIMIT, async { tokio::join!(first, second) })
        .await
        .unwrap();

    assert_eq!(first.unwrap_err().url(), Some(url("corrupt.webp").as_str()));
    assert!(second.merged);
    assert_eq!(fetcher.fetched(), [url("corrupt.webp")]);
    assert_eq!(merged.attribute("src").as_deref(), Some("merged.webp"));
    assert_eq!(tail.attribute("src").as_deref(), Some("tail.webp"));
    assert!(!machine.is_processing());
    assert_eq!(machine.pending(), 0);

    // Re-invoking resumes work with a fresh loop.
    let report = machine.polyfill_document(&newer, None).await.unwrap();
    assert!(!report.merged);
    assert_eq!(report.processed, 1);
    assert_eq!(merged.attribute("src"), Some(expected("merged.webp")));
}

#[tokio::test]
async fn continue_policy_records_failures_and_keeps_draining() {
    let fetcher = FakeFetcher::default();
    let machine = machine(
        fetcher.clone(),
        PolyfillConfig::default().with_failure_policy(FailurePolicy::Continue),
    );
    let mut doc = document();
    doc.append(Element::image("a.webp"));
    doc.append(Element::image("missing.webp"));
    let third = doc.append(Element::image("c.webp"));

    let report = machine.polyfill_document(&doc, None).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url(), Some(url("missing.webp").as_str()));
    assert!(matches!(
        report.failures[0].root(),
        MachineError::FetchFailed { .. }
    ));
    assert_eq!(third.attribute("src"), Some(expected("c.webp")));
    assert!(!machine.is_processing());
}

#[tokio::test]
async fn cancelled_loop_releases_flag_and_leaves_work_for_next_scan() {
    let (fetcher, _reached, _release) = FakeFetcher::gated("a1.webp");
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut doc = document();
    doc.append(Element::image("a1.webp"));
    let a2 = doc.append(Element::image("a2.webp"));

    {
        let scan = machine.polyfill_document(&doc, None);
        tokio::pin!(scan);
        assert!(futures::poll!(scan.as_mut()).is_pending());
        assert!(machine.is_processing());
    }
    assert!(!machine.is_processing());
    assert_eq!(machine.pending(), 1);

    // A later scan with no matches still drains what the cancelled loop left.
    let report = timeout(LIMIT, machine.polyfill_document(&doc, Some("[data-none]")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.queued, 0);
    assert_eq!(report.processed, 1);
    assert_eq!(a2.attribute("src"), Some(expected("a2.webp")));
}

#[tokio::test]
async fn invalid_selector_fails_before_touching_the_queue() {
    let fetcher = FakeFetcher::default();
    let machine = machine(fetcher.clone(), PolyfillConfig::default());
    let mut doc = document();
    doc.append(Element::image("a.webp"));

    let err = machine.polyfill_document(&doc, Some("body img")).await.unwrap_err();

    assert!(matches!(err, MachineError::InvalidSelector { .. }));
    assert_eq!(fetcher.calls(), 0);
    assert!(!machine.is_processing());
    assert_eq!(machine.pending(), 0);
}
