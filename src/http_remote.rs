//! Default [`RemoteStream`] implementation backed by a [`PortalPool`].
//!
//! Skynet skyfiles are immutable, so "append-write" is modeled as a flat
//! sequence of segments, each its own skyfile: every [`RemoteStream::write`]
//! call uploads one new segment and records its offset/length/skylink in the
//! manifest. Each segment is exactly one storage block, which keeps
//! `block_span` a pure manifest lookup with no network round-trip.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::PortalError;
use crate::manifest::Manifest;
use crate::portal::{PortalPool, UploadFile, Worker};
use crate::remote::{BYTES, RemoteStream};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Segment {
    offset: u64,
    length: u64,
    skylink: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ManifestState {
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    tip: u64,
}

impl ManifestState {
    fn segment_containing(&self, offset: u64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| offset >= s.offset && offset < s.offset + s.length)
    }
}

/// A [`RemoteStream`] backed by a real (or faked) portal network, reachable
/// through a shared [`PortalPool`].
pub struct HttpRemoteStream {
    pool: Arc<PortalPool>,
    state: Mutex<ManifestState>,
}

impl HttpRemoteStream {
    /// Open an existing stream from its manifest, or create a fresh one if
    /// `manifest` is `None`.
    pub fn open_or_create(pool: Arc<PortalPool>, manifest: Option<Manifest>) -> Result<Self, PortalError> {
        let state = match manifest {
            Some(m) => serde_json::from_value(m.0).unwrap_or_default(),
            None => ManifestState::default(),
        };
        Ok(Self {
            pool,
            state: Mutex::new(state),
        })
    }
}

#[async_trait::async_trait]
impl RemoteStream for HttpRemoteStream {
    async fn span(&self, axis: &str) -> Result<(u64, u64), PortalError> {
        assert_eq!(axis, BYTES, "only the bytes axis is supported");
        let state = self.state.lock().await;
        Ok((0, state.tip))
    }

    async fn block_span(
        &self,
        axis: &str,
        offset: u64,
        _worker: Option<&mut Worker>,
    ) -> Result<(u64, u64), PortalError> {
        assert_eq!(axis, BYTES, "only the bytes axis is supported");
        let state = self.state.lock().await;
        if offset >= state.tip {
            return Err(PortalError::EndOfStream);
        }
        let segment = state
            .segment_containing(offset)
            .expect("offset within tip but not covered by any segment");
        Ok((segment.offset, segment.offset + segment.length))
    }

    async fn read(
        &self,
        axis: &str,
        offset: u64,
        _mode: &str,
        worker: &mut Worker,
    ) -> Result<Vec<u8>, PortalError> {
        assert_eq!(axis, BYTES, "only the bytes axis is supported");
        let (skylink, length) = {
            let state = self.state.lock().await;
            let segment = state
                .segments
                .iter()
                .find(|s| s.offset == offset)
                .expect("read called at a non-block-aligned offset")
                .clone();
            (segment.skylink, segment.length)
        };

        let block_size = self.pool.block_size();
        let mut data = Vec::with_capacity(length as usize);
        let mut fetched = 0u64;
        while fetched < length {
            let want = if block_size == 0 {
                length - fetched
            } else {
                (length - fetched).min(block_size)
            };
            let response = self
                .pool
                .download(&skylink, &[(fetched, fetched + want)], want, false, Some(worker))
                .await?;
            if response.data.is_empty() {
                break;
            }
            fetched += response.data.len() as u64;
            data.extend(response.data);
        }
        Ok(data)
    }

    async fn write(&self, bytes: &[u8], axis: &str, offset: u64) -> Result<(), PortalError> {
        assert_eq!(axis, BYTES, "only the bytes axis is supported");
        let mut state = self.state.lock().await;
        assert_eq!(offset, state.tip, "write must extend exactly at the tip");

        let filename = format!("segment-{offset}");
        let files = [UploadFile {
            filename: filename.clone(),
            content_type: "application/octet-stream".to_string(),
            data: bytes.to_vec(),
        }];
        let skylink = self.pool.upload(&filename, &files, false, None).await?;

        state.segments.push(Segment {
            offset,
            length: bytes.len() as u64,
            skylink,
        });
        state.tip += bytes.len() as u64;
        Ok(())
    }

    async fn identifiers(&self) -> Manifest {
        let state = self.state.lock().await;
        Manifest(serde_json::to_value(&*state).expect("ManifestState always serializes"))
    }
}
