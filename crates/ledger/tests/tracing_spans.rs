//! Integration test verifying that ledger operations produce the expected
//! spans, down to the storage calls they make.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use coffer_ledger::{Ledger, LedgerConfig, OwnerId};
use coffer_storage::MemoryBackend;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

#[tokio::test]
async fn deposit_creates_nested_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let ledger =
        Ledger::new(MemoryBackend::new(), LedgerConfig::default()).expect("valid ledger");
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");
    ledger.deposit(account.id, 10, owner).await.expect("deposit");

    let recorded = spans.lock().expect("lock poisoned");
    for name in ["open_account", "deposit", "update", "get", "compare_and_set", "set"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}

#[tokio::test]
async fn history_creates_range_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let ledger =
        Ledger::new(MemoryBackend::new(), LedgerConfig::default()).expect("valid ledger");
    let owner = OwnerId::generate();
    let account = ledger.open_account(owner).await.expect("open");
    ledger.history(account.id, owner).await.expect("history");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "history"), "got: {recorded:?}");
    assert_eq!(recorded.iter().filter(|s| *s == "get_range").count(), 3);
}
