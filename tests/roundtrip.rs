mod common;

use std::sync::Arc;
use std::time::Duration;

use bufferedskystream::{GroupConfig, HttpRemoteStream, StreamEvent, StreamGroup};
use common::fake_pool;

async fn wait_for_upload(events: &mut tokio::sync::broadcast::Receiver<StreamEvent>, index: usize, at_least: u64) {
    let mut seen = 0u64;
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen < at_least {
            if let Ok(StreamEvent::Uploaded { index: i, bytes }) = events.recv().await {
                if i == index {
                    seen += bytes;
                }
            }
        }
    })
    .await
    .expect("upload did not complete in time");
}

#[tokio::test]
async fn upload_then_download_round_trips() {
    let pool = fake_pool(2, 2);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 8 });

    let remote = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let index = group.add(remote).await.unwrap();
    let mut events = group.subscribe();

    let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
    group.queue_local_up(index, &payload).await.unwrap();
    wait_for_upload(&mut events, index, payload.len() as u64).await;

    let read_back = group
        .xfer_local_down(index, 0, payload.len() as u64, None)
        .await
        .unwrap();
    assert_eq!(read_back, payload);

    group.shutdown().await;
}

#[tokio::test]
async fn partial_reads_cover_the_full_window() {
    let pool = fake_pool(2, 2);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 16 });

    let remote = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let index = group.add(remote).await.unwrap();
    let mut events = group.subscribe();

    let payload: Vec<u8> = (0..100u8).collect();
    group.queue_local_up(index, &payload).await.unwrap();
    wait_for_upload(&mut events, index, payload.len() as u64).await;

    let mut assembled = Vec::new();
    let mut offset = 0u64;
    while (offset as usize) < payload.len() {
        let chunk = group
            .xfer_local_down(index, offset, 10, Some(payload.len() as u64))
            .await
            .unwrap();
        assert!(!chunk.is_empty(), "expected forward progress at offset {offset}");
        offset += chunk.len() as u64;
        assembled.extend(chunk);
    }
    assert_eq!(assembled, payload);

    group.shutdown().await;
}
