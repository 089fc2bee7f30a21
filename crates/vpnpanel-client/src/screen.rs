//! Mounted screens: a feed controller, its poll loop and its image cache
//! bound to one cancellation scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vpnpanel_types::Identity;

use crate::api::PortalApi;
use crate::blobs::{BlobStore, BlobUrl};
use crate::error::ClientResult;
use crate::feed::{AdminFeedSnapshot, AdminProofFeed, Confirm, MutationOutcome, SelfFeedSnapshot, SelfProofFeed};
use crate::images::ImageBlobCache;
use crate::poller::{PollHandle, Poller};
use crate::session::SessionStore;

type SharedCache<A, B> = Arc<Mutex<ImageBlobCache<A, B>>>;

/// Everything a screen needs to mount.
pub struct ScreenDeps<A: PortalApi, B: BlobStore> {
    pub api: Arc<A>,
    pub blobs: Arc<B>,
    pub sessions: SessionStore,
    pub identity: Identity,
    pub poll_interval: Duration,
}

impl<A: PortalApi, B: BlobStore> Clone for ScreenDeps<A, B> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            blobs: self.blobs.clone(),
            sessions: self.sessions.clone(),
            identity: self.identity.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

/// Shared pieces of a mounted screen.
struct Mount<A: PortalApi, B: BlobStore> {
    scope: CancellationToken,
    images: SharedCache<A, B>,
    poll: Option<PollHandle>,
    revision: watch::Sender<u64>,
}

impl<A: PortalApi, B: BlobStore> Mount<A, B> {
    fn new(deps: &ScreenDeps<A, B>) -> Self {
        let scope = CancellationToken::new();
        let images = ImageBlobCache::new(deps.api.clone(), deps.blobs.clone(), scope.child_token());
        let (revision, _) = watch::channel(0);
        Self {
            scope,
            images: Arc::new(Mutex::new(images)),
            poll: None,
            revision,
        }
    }

    async fn unmount(&mut self) {
        self.scope.cancel();
        if let Some(poll) = self.poll.take() {
            poll.shutdown().await;
        }
        self.images.lock().await.shutdown().await;
    }
}

impl<A: PortalApi, B: BlobStore> Drop for Mount<A, B> {
    fn drop(&mut self) {
        self.scope.cancel();
        // If a tick holds the cache right now, its own Drop revokes later.
        if let Ok(mut images) = self.images.try_lock() {
            images.teardown();
        }
    }
}

fn bump(revision: &watch::Sender<u64>) {
    revision.send_modify(|r| *r += 1);
}

/// Stop the screen once its feed saw the session rejected. Runs after the
/// final bump so watchers still see the signed-out snapshot.
fn close_if_signed_out(scope: &CancellationToken, signed_out: bool) {
    if signed_out && !scope.is_cancelled() {
        debug!("Session rejected, closing screen");
        scope.cancel();
    }
}

// ── Payment screen ──────────────────────────────────────────────────────

/// `/profile-pay`: the caller's proof history, polled, with images.
pub struct PayScreen<A: PortalApi, B: BlobStore> {
    feed: Arc<SelfProofFeed<A>>,
    mount: Mount<A, B>,
}

impl<A: PortalApi, B: BlobStore> PayScreen<A, B> {
    /// Mount the screen and start polling. The first refresh runs right away.
    pub fn mount(deps: ScreenDeps<A, B>) -> Self {
        let mut mount = Mount::new(&deps);
        let feed = Arc::new(SelfProofFeed::new(
            deps.api,
            deps.sessions,
            deps.identity,
            mount.scope.child_token(),
        ));

        let tick_feed = feed.clone();
        let tick_images = mount.images.clone();
        let tick_revision = mount.revision.clone();
        let tick_scope = mount.scope.clone();
        mount.poll = Some(Poller::spawn("pay", deps.poll_interval, &mount.scope, move || {
            let feed = tick_feed.clone();
            let images = tick_images.clone();
            let revision = tick_revision.clone();
            let scope = tick_scope.clone();
            async move {
                let result = feed.refresh().await;
                sync_self_images(&feed, &images).await;
                bump(&revision);
                close_if_signed_out(&scope, feed.snapshot().signed_out);
                result
            }
        }));

        debug!("Pay screen mounted for user {}", feed.identity().id);
        Self { feed, mount }
    }

    pub fn snapshot(&self) -> SelfFeedSnapshot {
        self.feed.snapshot()
    }

    /// Resolves each time a poll cycle or an action finished.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.mount.revision.subscribe()
    }

    /// True once the server rejected the session. The screen has stopped.
    pub fn signed_out(&self) -> bool {
        self.feed.snapshot().signed_out
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<()> {
        let result = self.feed.upload(file_name, bytes).await;
        sync_self_images(&self.feed, &self.mount.images).await;
        bump(&self.mount.revision);
        close_if_signed_out(&self.mount.scope, self.signed_out());
        result
    }

    pub async fn images(&self) -> HashMap<i64, BlobUrl> {
        self.mount.images.lock().await.ready_map()
    }

    /// Wait for the current image generation to finish fetching.
    pub async fn images_settled(&self) -> HashMap<i64, BlobUrl> {
        let mut images = self.mount.images.lock().await;
        images.wait_idle().await;
        images.ready_map()
    }

    pub async fn unmount(mut self) {
        self.feed.unmount();
        self.mount.unmount().await;
        debug!("Pay screen unmounted");
    }
}

async fn sync_self_images<A: PortalApi, B: BlobStore>(feed: &SelfProofFeed<A>, images: &SharedCache<A, B>) {
    let items = feed.snapshot().items;
    images.lock().await.sync(&items, &feed.auth_headers()).await;
}

// ── Admin review screen ─────────────────────────────────────────────────

/// `/admin-check`: per-user rollup, selected user's proofs, moderation.
pub struct AdminReviewScreen<A: PortalApi, B: BlobStore> {
    feed: Arc<AdminProofFeed<A>>,
    mount: Mount<A, B>,
}

impl<A: PortalApi, B: BlobStore> AdminReviewScreen<A, B> {
    pub fn mount(deps: ScreenDeps<A, B>) -> Self {
        Self::mount_with_selection(deps, None)
    }

    /// Mount with a user preselected, so the first cycle loads their proofs.
    pub fn mount_with_selection(deps: ScreenDeps<A, B>, user_id: Option<i64>) -> Self {
        let mut mount = Mount::new(&deps);
        let feed = Arc::new(AdminProofFeed::new(
            deps.api,
            deps.sessions,
            deps.identity,
            mount.scope.child_token(),
        ));
        if let Some(id) = user_id {
            feed.preselect(id);
        }

        let tick_feed = feed.clone();
        let tick_images = mount.images.clone();
        let tick_revision = mount.revision.clone();
        let tick_scope = mount.scope.clone();
        mount.poll = Some(Poller::spawn("admin", deps.poll_interval, &mount.scope, move || {
            let feed = tick_feed.clone();
            let images = tick_images.clone();
            let revision = tick_revision.clone();
            let scope = tick_scope.clone();
            async move {
                let result = feed.refresh().await;
                sync_admin_images(&feed, &images).await;
                bump(&revision);
                close_if_signed_out(&scope, feed.snapshot().signed_out);
                result
            }
        }));

        debug!("Admin review screen mounted");
        Self { feed, mount }
    }

    pub fn snapshot(&self) -> AdminFeedSnapshot {
        self.feed.snapshot()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.mount.revision.subscribe()
    }

    /// True once the server rejected the session. The screen has stopped.
    pub fn signed_out(&self) -> bool {
        self.feed.snapshot().signed_out
    }

    pub async fn select_user(&self, user_id: i64) -> ClientResult<()> {
        let result = self.feed.select_user(user_id).await;
        self.after_action().await;
        result
    }

    pub async fn approve(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        let result = self.feed.approve(proof_id).await;
        self.after_action().await;
        result
    }

    pub async fn reject(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        let result = self.feed.reject(proof_id).await;
        self.after_action().await;
        result
    }

    pub async fn reset_to_pending(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        let result = self.feed.reset_to_pending(proof_id).await;
        self.after_action().await;
        result
    }

    pub async fn delete(&self, proof_id: i64, confirm: &dyn Confirm) -> ClientResult<MutationOutcome> {
        let result = self.feed.delete(proof_id, confirm).await;
        self.after_action().await;
        result
    }

    async fn after_action(&self) {
        sync_admin_images(&self.feed, &self.mount.images).await;
        bump(&self.mount.revision);
        close_if_signed_out(&self.mount.scope, self.signed_out());
    }

    pub async fn images(&self) -> HashMap<i64, BlobUrl> {
        self.mount.images.lock().await.ready_map()
    }

    pub async fn images_settled(&self) -> HashMap<i64, BlobUrl> {
        let mut images = self.mount.images.lock().await;
        images.wait_idle().await;
        images.ready_map()
    }

    pub async fn unmount(mut self) {
        self.feed.unmount();
        self.mount.unmount().await;
        debug!("Admin review screen unmounted");
    }
}

async fn sync_admin_images<A: PortalApi, B: BlobStore>(feed: &AdminProofFeed<A>, images: &SharedCache<A, B>) {
    let proofs = feed.snapshot().proofs;
    images.lock().await.sync(&proofs, &feed.auth_headers()).await;
}
