//! Authenticated proof images materialized as transient local URLs.
//!
//! Each distinct proof list starts a new generation. Superseding a generation
//! cancels its fetches, revokes every URL it materialized and waits for its
//! tasks to finish before the next generation starts fetching. A task that
//! was already materializing when its generation closed revokes its own URL.
//!
//! Fetch tasks are never aborted, only cancelled, so a materialized URL is
//! always either recorded or revoked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vpnpanel_types::PaymentProof;

use crate::api::PortalApi;
use crate::blobs::{BlobStore, BlobUrl};
use crate::session::AuthHeaders;

pub struct ImageBlobCache<A: PortalApi, B: BlobStore> {
    api: Arc<A>,
    blobs: Arc<B>,
    scope: CancellationToken,
    current: Option<Generation>,
    next_generation: u64,
}

struct Generation {
    id: u64,
    proofs: Vec<PaymentProof>,
    cancel: CancellationToken,
    slots: Arc<Mutex<Slots>>,
    tasks: JoinSet<()>,
}

#[derive(Default)]
struct Slots {
    /// Set once the generation is released. Late fetches revoke their own URL.
    closed: bool,
    ready: HashMap<i64, BlobUrl>,
}

impl<A: PortalApi, B: BlobStore> ImageBlobCache<A, B> {
    /// `scope` is the owning screen's lifetime; cancelling it stops every fetch.
    pub fn new(api: Arc<A>, blobs: Arc<B>, scope: CancellationToken) -> Self {
        Self {
            api,
            blobs,
            scope,
            current: None,
            next_generation: 1,
        }
    }

    /// Point the cache at `proofs`. A list equal to the current one keeps the
    /// current generation; anything else drains it and starts fetching anew.
    pub async fn sync(&mut self, proofs: &[PaymentProof], auth: &AuthHeaders) {
        if let Some(current) = &self.current {
            if current.proofs == proofs {
                return;
            }
        }

        if let Some(mut previous) = self.release_current() {
            join_all(&mut previous.tasks).await;
        }

        if proofs.is_empty() || self.scope.is_cancelled() {
            return;
        }

        let id = self.next_generation;
        self.next_generation += 1;

        let cancel = self.scope.child_token();
        let slots = Arc::new(Mutex::new(Slots::default()));
        let mut tasks = JoinSet::new();

        for proof in proofs.iter().filter(|p| p.has_file()) {
            tasks.spawn(fetch_one(
                self.api.clone(),
                self.blobs.clone(),
                auth.clone(),
                proof.id,
                proof.file_url.clone(),
                cancel.clone(),
                slots.clone(),
            ));
        }

        debug!("Image generation {} started for {} proofs", id, proofs.len());
        self.current = Some(Generation {
            id,
            proofs: proofs.to_vec(),
            cancel,
            slots,
            tasks,
        });
    }

    /// Wait until every fetch of the current generation has finished.
    pub async fn wait_idle(&mut self) {
        if let Some(current) = self.current.as_mut() {
            join_all(&mut current.tasks).await;
        }
    }

    /// Snapshot of proof id -> local URL for the current generation.
    pub fn ready_map(&self) -> HashMap<i64, BlobUrl> {
        self.current
            .as_ref()
            .and_then(|g| g.slots.lock().ok().map(|s| s.ready.clone()))
            .unwrap_or_default()
    }

    pub fn get(&self, proof_id: i64) -> Option<BlobUrl> {
        let current = self.current.as_ref()?;
        let slots = current.slots.lock().ok()?;
        slots.ready.get(&proof_id).cloned()
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|g| g.id)
    }

    /// Release everything and wait for the released fetches to wind down.
    /// The cache stays usable for a later `sync`.
    pub async fn shutdown(&mut self) {
        if let Some(mut released) = self.release_current() {
            join_all(&mut released.tasks).await;
        }
    }

    /// Release everything without waiting. Fetches still running revoke
    /// whatever they materialize once they finish.
    pub fn teardown(&mut self) {
        if let Some(mut released) = self.release_current() {
            released.tasks.detach_all();
        }
    }

    /// Close the current generation and revoke its ready URLs. The caller
    /// decides whether to wait for the returned generation's tasks.
    fn release_current(&mut self) -> Option<Generation> {
        let generation = self.current.take()?;

        generation.cancel.cancel();

        let urls: Vec<BlobUrl> = match generation.slots.lock() {
            Ok(mut slots) => {
                slots.closed = true;
                slots.ready.drain().map(|(_, url)| url).collect()
            }
            Err(e) => {
                warn!("Image slots lock poisoned: {}", e);
                Vec::new()
            }
        };

        for url in &urls {
            self.blobs.revoke(url);
        }
        debug!("Image generation {} released ({} revoked)", generation.id, urls.len());
        Some(generation)
    }
}

impl<A: PortalApi, B: BlobStore> Drop for ImageBlobCache<A, B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            if !e.is_cancelled() {
                warn!("Image fetch task failed: {}", e);
            }
        }
    }
}

async fn fetch_one<A: PortalApi, B: BlobStore>(
    api: Arc<A>,
    blobs: Arc<B>,
    auth: AuthHeaders,
    proof_id: i64,
    file_url: String,
    cancel: CancellationToken,
    slots: Arc<Mutex<Slots>>,
) {
    let fetched = tokio::select! {
        _ = cancel.cancelled() => return,
        res = api.fetch_proof_image(&auth, &file_url) => res,
    };

    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Skipping image for proof {}: {}", proof_id, e);
            return;
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    let url = match blobs.materialize(&bytes).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Could not materialize image for proof {}: {}", proof_id, e);
            return;
        }
    };

    let mut guard = match slots.lock() {
        Ok(guard) => guard,
        Err(_) => {
            blobs.revoke(&url);
            return;
        }
    };
    if guard.closed || cancel.is_cancelled() {
        drop(guard);
        blobs.revoke(&url);
        return;
    }
    if let Some(old) = guard.ready.insert(proof_id, url) {
        // duplicate proof id in one list
        blobs.revoke(&old);
    }
}
