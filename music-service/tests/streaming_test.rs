mod common;

use common::{FakeHub, FakeTransport};
use futures::{StreamExt, TryStreamExt};
use music_service::hub::{CHUNK_SIZE, ChunkPlan, HubPool, HubTransport, StreamError, Worker};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

fn test_file(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn started_worker(hub: &Arc<FakeHub>) -> Arc<Worker> {
    Worker::start(0, Arc::new(FakeTransport(hub.clone())))
        .await
        .expect("worker starts")
}

async fn collect_window(
    worker: &Arc<Worker>,
    start: u64,
    end: u64,
    chunk_size: u64,
) -> Result<Vec<u8>, StreamError> {
    let descriptor = worker.get_file_properties(-100, 1).await?;
    let plan = ChunkPlan::for_window(start, end, descriptor.file_size, chunk_size)?;
    let chunks: Vec<_> = worker.stream(descriptor, plan).try_collect().await?;
    Ok(chunks.concat())
}

#[tokio::test]
async fn reassembles_the_exact_requested_window() {
    let file = test_file(5000);
    let hub = Arc::new(FakeHub::new(file.clone()));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    for (start, end) in [(0u64, 4999u64), (13, 87), (700, 4321), (4999, 4999), (0, 0)] {
        for chunk_size in [64u64, 256, 1024, 4096, 8192] {
            let bytes = collect_window(&worker, start, end, chunk_size)
                .await
                .expect("stream succeeds");
            assert_eq!(
                bytes,
                &file[start as usize..=end as usize],
                "window {start}..={end} at chunk size {chunk_size}"
            );
        }
    }
}

#[tokio::test]
async fn formula_driven_range_over_a_megabyte_file() {
    // the spec'd end-to-end scenario: 1,000,000 bytes, 512 KiB chunks,
    // Range: bytes=600000-700000
    let file = test_file(1_000_000);
    let hub = Arc::new(FakeHub::new(file.clone()));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let (start, end) = (600_000u64, 700_000u64);
    let plan = ChunkPlan::for_window(start, end, file.len() as u64, CHUNK_SIZE).unwrap();
    assert_eq!(plan.offset, start - (start % CHUNK_SIZE));

    let bytes = collect_window(&worker, start, end, CHUNK_SIZE)
        .await
        .unwrap();
    assert_eq!(bytes.len() as u64, end - start + 1);
    assert_eq!(bytes, &file[start as usize..=end as usize]);
}

#[tokio::test]
async fn short_file_ends_the_stream_cleanly() {
    // the hub advertises more bytes than it can serve; the empty chunk at
    // end-of-file finishes the stream without an error
    let file = test_file(1000);
    let hub = Arc::new(FakeHub::new(file.clone()).with_advertised_size(4000));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let bytes = collect_window(&worker, 0, 3999, 256).await.unwrap();
    assert_eq!(bytes, file);
    assert_eq!(worker.workload(), 0);
}

#[tokio::test]
async fn descriptor_resolution_hits_the_backend_once() {
    let hub = Arc::new(FakeHub::new(test_file(100)));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let first = worker.get_file_properties(-100, 1).await.unwrap();
    let second = worker.get_file_properties(-100, 1).await.unwrap();
    assert_eq!(first.file_unique_id, second.file_unique_id);
    assert_eq!(hub.resolve_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_message_is_not_found() {
    let hub = Arc::new(FakeHub::new(test_file(100)));
    let worker = started_worker(&hub).await;

    let result = worker.get_file_properties(-100, 99).await;
    assert!(matches!(result, Err(StreamError::NotFound)));
}

#[tokio::test]
async fn workload_returns_to_zero_on_every_exit_path() {
    let file = test_file(2048);
    let hub = Arc::new(FakeHub::new(file.clone()));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;
    let descriptor = worker.get_file_properties(-100, 1).await.unwrap();

    // normal completion
    let plan = ChunkPlan::for_window(0, 2047, 2048, 256).unwrap();
    let _: Vec<_> = worker
        .stream(descriptor.clone(), plan)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(worker.workload(), 0);

    // consumer abandons the stream after one chunk
    {
        let mut stream = Box::pin(worker.stream(descriptor.clone(), plan));
        assert_eq!(worker.workload(), 1);
        let first = stream.next().await;
        assert!(first.is_some());
        assert_eq!(worker.workload(), 1);
    }
    assert_eq!(worker.workload(), 0);

    // a stream that is never polled at all
    {
        let _stream = worker.stream(descriptor.clone(), plan);
        assert_eq!(worker.workload(), 1);
    }
    assert_eq!(worker.workload(), 0);

    // several concurrent streams
    let streams: Vec<_> = (0..5)
        .map(|_| worker.stream(descriptor.clone(), plan))
        .collect();
    assert_eq!(worker.workload(), 5);
    for stream in streams {
        let _: Vec<_> = stream.try_collect().await.unwrap();
    }
    assert_eq!(worker.workload(), 0);
}

#[tokio::test(start_paused = true)]
async fn workload_is_released_when_a_fetch_fails_for_good() {
    let hub = Arc::new(FakeHub::new(test_file(2048)).with_fetch_timeouts(100));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;
    let descriptor = worker.get_file_properties(-100, 1).await.unwrap();

    let plan = ChunkPlan::for_window(0, 2047, 2048, 256).unwrap();
    let result: Result<Vec<_>, _> = worker.stream(descriptor, plan).try_collect().await;
    assert!(matches!(result, Err(StreamError::Timeout { offset: 0 })));
    assert_eq!(worker.workload(), 0);
}

#[tokio::test(start_paused = true)]
async fn chunk_timeouts_are_retried_with_backoff() {
    let file = test_file(512);
    let hub = Arc::new(FakeHub::new(file.clone()).with_fetch_timeouts(2));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let started = Instant::now();
    let bytes = collect_window(&worker, 0, 511, 512).await.unwrap();
    assert_eq!(bytes, file);

    // attempts 1 and 2 timed out: waits were 1s + 2s, and the third
    // attempt succeeded before any 4s wait
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(hub.fetch_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn chunk_timeout_budget_is_three_retries() {
    let hub = Arc::new(FakeHub::new(test_file(512)).with_fetch_timeouts(4));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let started = Instant::now();
    let result = collect_window(&worker, 0, 511, 512).await;
    assert!(matches!(result, Err(StreamError::Timeout { .. })));
    assert_eq!(started.elapsed(), Duration::from_secs(7));
    assert_eq!(hub.fetch_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn foreign_datacenter_runs_the_import_handshake_once() {
    let file = test_file(1024);
    let hub = Arc::new(FakeHub::new(file.clone()).with_media_dc(4));
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let bytes = collect_window(&worker, 0, 1023, 256).await.unwrap();
    assert_eq!(bytes, file);
    assert_eq!(hub.export_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hub.import_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hub.sessions_opened.load(Ordering::SeqCst), 1);

    // the cached session is reused for the next stream
    let bytes = collect_window(&worker, 100, 200, 64).await.unwrap();
    assert_eq!(bytes, &file[100..=200]);
    assert_eq!(hub.sessions_opened.load(Ordering::SeqCst), 1);
    assert_eq!(worker.session_count().await, 1);
}

#[tokio::test]
async fn import_retries_then_succeeds_within_budget() {
    let file = test_file(1024);
    let hub = Arc::new(
        FakeHub::new(file.clone())
            .with_media_dc(4)
            .with_import_failures(3),
    );
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;

    let bytes = collect_window(&worker, 0, 1023, 256).await.unwrap();
    assert_eq!(bytes, file);
    assert_eq!(hub.import_calls.load(Ordering::SeqCst), 4);
    assert_eq!(worker.session_count().await, 1);
}

#[tokio::test]
async fn exhausted_import_budget_fails_and_caches_nothing() {
    let hub = Arc::new(
        FakeHub::new(test_file(1024))
            .with_media_dc(4)
            .with_import_failures(100),
    );
    hub.add_audio_message(-100, 1, "u1");
    let worker = started_worker(&hub).await;
    let descriptor = worker.get_file_properties(-100, 1).await.unwrap();

    let plan = ChunkPlan::for_window(0, 1023, 1024, 256).unwrap();
    let result: Result<Vec<_>, _> = worker.stream(descriptor, plan).try_collect().await;
    assert!(matches!(result, Err(StreamError::AuthorizationFailed(4))));

    // six attempts total, never a seventh, and no broken session kept
    assert_eq!(hub.import_calls.load(Ordering::SeqCst), 6);
    assert_eq!(hub.export_calls.load(Ordering::SeqCst), 6);
    assert_eq!(worker.session_count().await, 0);
    assert_eq!(worker.workload(), 0);
}

#[tokio::test]
async fn least_loaded_worker_wins_with_stable_ties() {
    let hubs: Vec<Arc<FakeHub>> = (0..3)
        .map(|_| {
            let hub = Arc::new(FakeHub::new(test_file(4096)));
            hub.add_audio_message(-100, 1, "u1");
            hub
        })
        .collect();
    let transports = hubs
        .iter()
        .map(|hub| Arc::new(FakeTransport(hub.clone())) as Arc<dyn HubTransport>)
        .collect();
    let pool = HubPool::start(transports).await.unwrap();

    // everyone idle: the primary wins the tie
    assert_eq!(pool.get_available_worker().unwrap().index(), 0);

    // workloads [3, 1, 1]: index 1 beats index 2 at the shared minimum
    let workers = pool.workers();
    let descriptor = workers[0].get_file_properties(-100, 1).await.unwrap();
    let plan = ChunkPlan::for_window(0, 4095, 4096, 1024).unwrap();
    let mut held = Vec::new();
    for (index, count) in [(0usize, 3usize), (1, 1), (2, 1)] {
        for _ in 0..count {
            held.push(workers[index].stream(descriptor.clone(), plan));
        }
    }
    assert_eq!(pool.get_available_worker().unwrap().index(), 1);
    drop(held);
    assert_eq!(pool.get_available_worker().unwrap().index(), 0);
}

#[tokio::test]
async fn secondary_start_failures_are_skipped() {
    let good = Arc::new(FakeHub::new(test_file(16)));
    let bad = Arc::new(FakeHub::new(test_file(16)).failing_to_start());
    let pool = HubPool::start(vec![
        Arc::new(FakeTransport(good.clone())) as Arc<dyn HubTransport>,
        Arc::new(FakeTransport(bad.clone())) as Arc<dyn HubTransport>,
    ])
    .await
    .unwrap();
    assert_eq!(pool.workers().len(), 1);
}

#[tokio::test]
async fn primary_start_failure_is_fatal() {
    let bad = Arc::new(FakeHub::new(test_file(16)).failing_to_start());
    let result = HubPool::start(vec![Arc::new(FakeTransport(bad.clone())) as Arc<dyn HubTransport>]).await;
    assert!(result.is_err());
}
