// Single-consumer enrichment pipeline: request handlers enqueue, one task drains
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::db::models::{Wish, WishImage};
use crate::db::RepositoryError;
use crate::enrichment::fetcher::{FetchError, MetadataFetcher, PageMetadata};
use crate::wishes::domain::MAX_NAME_LEN;
use crate::wishes::{validate_url, DynWishRepository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentJob {
    pub wish_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Enqueued,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Unparsable price: {0}")]
    InvalidPrice(String),

    #[error("Wish was edited while enrichment ran")]
    Superseded,
}

/// Producer side. Never blocks the caller.
#[derive(Clone)]
pub struct EnrichmentQueue {
    sender: mpsc::Sender<EnrichmentJob>,
}

impl EnrichmentQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EnrichmentJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Returns `Enqueued`, or `Failed` when the job was dropped.
    pub fn enqueue(&self, job: EnrichmentJob) -> JobStatus {
        match self.sender.try_send(job) {
            Ok(()) => JobStatus::Enqueued,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(wish_id = %job.wish_id, "Enrichment queue full, dropping job");
                JobStatus::Failed
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(wish_id = %job.wish_id, "Enrichment worker stopped, dropping job");
                JobStatus::Failed
            }
        }
    }
}

pub struct EnrichmentWorker {
    wishes: DynWishRepository,
    fetcher: Arc<dyn MetadataFetcher>,
    lock: Arc<Mutex<()>>,
}

impl EnrichmentWorker {
    pub fn new(wishes: DynWishRepository, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self {
            wishes,
            fetcher,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Drain the queue until every sender is gone or `shutdown` turns true.
    /// Jobs still queued at shutdown are dropped, and an in-flight job is
    /// abandoned.
    pub async fn run(
        self,
        mut receiver: mpsc::Receiver<EnrichmentJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Enrichment worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let wish_id = job.wish_id.clone();
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => {
                    tracing::info!(wish_id = %wish_id, "Enrichment interrupted by shutdown");
                    break;
                }
                _ = self.process(job) => {}
            }
        }
        tracing::info!("Enrichment worker stopped");
    }

    pub async fn process(&self, job: EnrichmentJob) -> JobStatus {
        let _guard = self.lock.lock().await;
        tracing::debug!(wish_id = %job.wish_id, url = %job.url, status = ?JobStatus::Processing, "Enrichment job");

        match self.enrich(&job).await {
            Ok(()) => {
                tracing::info!(wish_id = %job.wish_id, "Wish enriched");
                JobStatus::Done
            }
            Err(e) => {
                tracing::warn!(wish_id = %job.wish_id, url = %job.url, "Enrichment failed: {}", e);
                JobStatus::Failed
            }
        }
    }

    async fn enrich(&self, job: &EnrichmentJob) -> Result<(), EnrichmentError> {
        let metadata = self.fetcher.fetch(&job.url).await?;
        let mut wish = self.wishes.get_by_id(None, &job.wish_id).await?;
        let read_at = wish.updated_at;

        let image = apply_metadata(&mut wish, &metadata)?
            .filter(|_| wish.images.is_empty())
            .map(|url| WishImage {
                id: Uuid::now_v7().to_string(),
                wish_id: wish.id.clone(),
                url,
                width: 0,
                height: 0,
                position: 0,
                created_at: Utc::now(),
            });
        wish.updated_at = Utc::now();

        if !self
            .wishes
            .store_enrichment(&wish, read_at, image.as_ref())
            .await?
        {
            return Err(EnrichmentError::Superseded);
        }
        Ok(())
    }
}

/// Resolves once a stop is requested. A dropped sender never stops the worker.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Patch the fields the page provided. Returns the image URL, if any, for the
/// caller to attach. Price and currency are only ever written together.
pub fn apply_metadata(
    wish: &mut Wish,
    metadata: &PageMetadata,
) -> Result<Option<String>, EnrichmentError> {
    if let Some(name) = metadata.name() {
        wish.name = Some(name.chars().take(MAX_NAME_LEN).collect());
    }

    let currency = metadata
        .currency()
        .map(str::to_ascii_uppercase)
        .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()));

    match metadata.price_text() {
        Some(text) => {
            let price = parse_price(text)?;
            match currency.or_else(|| wish.currency.clone()) {
                Some(currency) => {
                    wish.price = Some(price);
                    wish.currency = Some(currency);
                }
                None => {
                    tracing::debug!(wish_id = %wish.id, "Price without currency, skipping");
                }
            }
        }
        None => {
            if let (Some(currency), Some(_)) = (currency, wish.price) {
                wish.currency = Some(currency);
            }
        }
    }

    Ok(metadata
        .image()
        .filter(|url| validate_url(url).is_ok())
        .map(str::to_string))
}

fn parse_price(text: &str) -> Result<f64, EnrichmentError> {
    match text.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(EnrichmentError::InvalidPrice(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, insert_test_user};
    use crate::wishes::{SqliteWishRepository, WishRepository};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct StubFetcher(Result<PageMetadata, u16>);

    #[async_trait]
    impl MetadataFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<PageMetadata, FetchError> {
            self.0.clone().map_err(FetchError::Status)
        }
    }

    fn metadata(meta: &[(&str, &str)]) -> PageMetadata {
        PageMetadata {
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        }
    }

    async fn setup(fetched: Result<PageMetadata, u16>) -> (EnrichmentWorker, DynWishRepository, TempDir) {
        let (pool, temp) = db::test_pool();
        insert_test_user(&pool, "alice");
        let wishes: DynWishRepository = Arc::new(SqliteWishRepository::new(pool));

        let mut wish = Wish::new("w1", "alice");
        wish.url = Some("https://shop.example.com/item".into());
        wishes.create(&wish, &["home".into()]).await.unwrap();

        let worker = EnrichmentWorker::new(wishes.clone(), Arc::new(StubFetcher(fetched)));
        (worker, wishes, temp)
    }

    fn job() -> EnrichmentJob {
        EnrichmentJob {
            wish_id: "w1".into(),
            url: "https://shop.example.com/item".into(),
        }
    }

    #[test]
    fn price_needs_a_currency() {
        let mut wish = Wish::new("w1", "alice");
        apply_metadata(&mut wish, &metadata(&[("og:price:amount", "10")])).unwrap();
        assert_eq!(wish.price, None);
        assert_eq!(wish.currency, None);

        apply_metadata(
            &mut wish,
            &metadata(&[("og:price:amount", "10"), ("og:price:currency", "usd")]),
        )
        .unwrap();
        assert_eq!(wish.price, Some(10.0));
        assert_eq!(wish.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn price_reuses_existing_currency() {
        let mut wish = Wish::new("w1", "alice");
        wish.price = Some(5.0);
        wish.currency = Some("EUR".into());

        apply_metadata(&mut wish, &metadata(&[("og:price:amount", "7.25")])).unwrap();
        assert_eq!(wish.price, Some(7.25));
        assert_eq!(wish.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn currency_alone_never_lands_on_a_priceless_wish() {
        let mut wish = Wish::new("w1", "alice");
        apply_metadata(&mut wish, &metadata(&[("og:price:currency", "GBP")])).unwrap();
        assert_eq!(wish.currency, None);
    }

    #[test]
    fn unparsable_price_fails() {
        let mut wish = Wish::new("w1", "alice");
        let err = apply_metadata(
            &mut wish,
            &metadata(&[("og:price:amount", "ten bucks"), ("og:price:currency", "USD")]),
        )
        .unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidPrice(_)));
    }

    #[test]
    fn name_falls_back_to_title_and_image_must_be_http() {
        let mut wish = Wish::new("w1", "alice");
        let page = PageMetadata {
            title: Some("Plain title".into()),
            image: Some("data:image/png;base64,AAAA".into()),
            ..Default::default()
        };
        let image = apply_metadata(&mut wish, &page).unwrap();
        assert_eq!(wish.name.as_deref(), Some("Plain title"));
        assert_eq!(image, None);
    }

    #[tokio::test]
    async fn test_process_patches_wish_and_keeps_categories() {
        let (worker, wishes, _temp) = setup(Ok(metadata(&[
            ("og:title", "Floor lamp"),
            ("og:price:amount", "89.90"),
            ("og:price:currency", "EUR"),
            ("og:image", "https://cdn.example.com/lamp.jpg"),
        ])))
        .await;

        assert_eq!(worker.process(job()).await, JobStatus::Done);

        let wish = wishes.get_by_id(None, "w1").await.unwrap();
        assert_eq!(wish.name.as_deref(), Some("Floor lamp"));
        assert_eq!(wish.price, Some(89.9));
        assert_eq!(wish.currency.as_deref(), Some("EUR"));
        assert_eq!(wish.category_ids(), vec!["home"]);
        assert_eq!(wish.images.len(), 1);
        assert_eq!(wish.images[0].url, "https://cdn.example.com/lamp.jpg");
    }

    #[tokio::test]
    async fn test_process_does_not_stack_images() {
        let (worker, wishes, _temp) = setup(Ok(metadata(&[(
            "og:image",
            "https://cdn.example.com/lamp.jpg",
        )])))
        .await;

        worker.process(job()).await;
        worker.process(job()).await;

        let wish = wishes.get_by_id(None, "w1").await.unwrap();
        assert_eq!(wish.images.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_leave_wish_untouched() {
        let (worker, wishes, _temp) = setup(Err(502)).await;
        assert_eq!(worker.process(job()).await, JobStatus::Failed);
        assert_eq!(wishes.get_by_id(None, "w1").await.unwrap().name, None);

        let missing = EnrichmentJob {
            wish_id: "gone".into(),
            url: "https://shop.example.com/item".into(),
        };
        assert_eq!(worker.process(missing).await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_enqueue_drops_when_full() {
        let (queue, mut receiver) = EnrichmentQueue::new(1);
        assert_eq!(queue.enqueue(job()), JobStatus::Enqueued);
        assert_eq!(queue.enqueue(job()), JobStatus::Failed);

        assert_eq!(receiver.recv().await, Some(job()));
        drop(receiver);
        assert_eq!(queue.enqueue(job()), JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_exits_when_senders_drop() {
        let (worker, wishes, _temp) = setup(Ok(metadata(&[("og:title", "Queued")]))).await;
        let (queue, receiver) = EnrichmentQueue::new(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(receiver, shutdown_rx));

        queue.enqueue(job());
        drop(queue);
        handle.await.unwrap();

        let wish = wishes.get_by_id(None, "w1").await.unwrap();
        assert_eq!(wish.name.as_deref(), Some("Queued"));
    }

    struct SlowFetcher;

    #[async_trait]
    impl MetadataFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<PageMetadata, FetchError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(metadata(&[("og:title", "Slow")]))
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_with_jobs_queued() {
        let (_, wishes, _temp) = setup(Err(502)).await;
        let worker = EnrichmentWorker::new(wishes.clone(), Arc::new(SlowFetcher));
        let (queue, receiver) = EnrichmentQueue::new(10);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for _ in 0..6 {
            assert_eq!(queue.enqueue(job()), JobStatus::Enqueued);
        }
        let handle = tokio::spawn(worker.run(receiver, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker kept draining after shutdown")
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        // The queue stays open, the interrupted job wrote nothing
        drop(queue);
        assert_eq!(wishes.get_by_id(None, "w1").await.unwrap().name, None);
    }
}
