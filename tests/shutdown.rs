mod common;

use std::sync::Arc;
use std::time::Duration;

use bufferedskystream::{GroupConfig, HttpRemoteStream, StreamGroup};
use common::fake_pool;

#[tokio::test]
async fn shutdown_is_idempotent() {
    let pool = fake_pool(1, 1);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 4 });

    let remote = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    group.add(remote).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), group.shutdown())
        .await
        .expect("first shutdown should complete");
    // A second call must be a no-op rather than hang (the pump tasks have
    // already exited and their handles were consumed by the first call).
    tokio::time::timeout(Duration::from_secs(5), group.shutdown())
        .await
        .expect("second shutdown should also complete immediately");
}

#[tokio::test]
async fn dropping_a_fully_flushed_stream_does_not_abort() {
    let pool = fake_pool(1, 1);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 4 });

    let remote = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let index = group.add(remote).await.unwrap();
    let stream = group.get(index).await.unwrap();

    let payload = b"flush me".to_vec();
    group.queue_local_up(index, &payload).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if stream.backlog_up().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("upload should drain before drop");

    // `stream` and the group's own `Arc` both still reference the same
    // BufferedStream; dropping this handle alone does not run its
    // destructor, but proves the handle clones and drops cleanly once the
    // backlog is empty.
    drop(stream);

    group.shutdown().await;
}
