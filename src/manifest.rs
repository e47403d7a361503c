//! The opaque JSON manifest that names a remote object and tracks its tip.

use serde::{Deserialize, Serialize};

/// Opaque JSON manifest carrying a stream's identity and current tip.
///
/// Created externally (or by [`crate::remote::RemoteStream::open_or_create`]
/// for a brand-new object), mutated only by the owning stream's `write`
/// path, and persisted by the caller — typically from the upload callback,
/// atomically via write-to-temp + rename. This crate never inspects the
/// manifest's shape beyond the fields it owns; a caller is free to embed
/// additional identity fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Manifest(pub serde_json::Value);

impl Manifest {
    /// An empty manifest, used when opening a brand-new stream that has not
    /// yet been assigned a skylink.
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// The underlying JSON value.
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for Manifest {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<Manifest> for serde_json::Value {
    fn from(manifest: Manifest) -> Self {
        manifest.0
    }
}
