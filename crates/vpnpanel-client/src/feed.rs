//! Proof feed controllers: the in-memory state behind the payment screen and
//! the admin review screen.
//!
//! Lists are replaced wholesale on every refresh. Nothing is committed once
//! the owning screen's scope is cancelled.
//!
//! Every load takes a cycle number before its requests go out. A load only
//! commits if no later-started load has committed already, so a slow poll
//! cycle cannot overwrite the re-fetch that follows a mutation.
//!
//! A 401 from any request means the stored session is no longer accepted:
//! the feed marks itself signed out, cancels its scope and returns
//! [`ClientError::NotAuthenticated`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vpnpanel_types::{Identity, PaymentProof, PaymentProofUser, PaymentStatus};

use crate::api::PortalApi;
use crate::error::{ClientError, ClientResult};
use crate::session::{AuthHeaders, SessionStore};

/// Extensions the upload form offers.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "heic", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// What happened to a requested mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Request accepted by the server; both lists were re-fetched.
    Applied,
    /// Another mutation was in flight; nothing was sent.
    Busy,
    /// The user declined the confirmation; nothing was sent.
    Declined,
    /// The proof already has the requested status; nothing was sent.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofAction {
    Approve,
    Reject,
    ResetToPending,
    Delete,
}

impl ProofAction {
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Approve => Some(PaymentStatus::Approved),
            Self::Reject => Some(PaymentStatus::Rejected),
            Self::ResetToPending => Some(PaymentStatus::Pending),
            Self::Delete => None,
        }
    }
}

/// Synchronous yes/no gate in front of destructive actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

// ── Self-service feed ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SelfFeedSnapshot {
    pub status: FeedStatus,
    pub items: Vec<PaymentProof>,
    /// Last load failure, cleared by the next successful load.
    pub error: Option<String>,
    /// Last upload failure, cleared when the next upload starts.
    pub action_error: Option<String>,
    pub is_uploading: bool,
    /// Cycle number of the last committed load.
    pub cycle: u64,
    /// The server rejected the session; the screen should send the user to sign in.
    pub signed_out: bool,
}

/// The caller's own proof history plus the upload action.
pub struct SelfProofFeed<A: PortalApi> {
    api: Arc<A>,
    sessions: SessionStore,
    identity: Identity,
    scope: CancellationToken,
    state: Mutex<SelfFeedSnapshot>,
    cycles: AtomicU64,
}

impl<A: PortalApi> SelfProofFeed<A> {
    pub fn new(api: Arc<A>, sessions: SessionStore, identity: Identity, scope: CancellationToken) -> Self {
        Self {
            api,
            sessions,
            identity,
            scope,
            state: Mutex::new(SelfFeedSnapshot::default()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SelfFeedSnapshot {
        lock(&self.state).clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn auth_headers(&self) -> AuthHeaders {
        self.sessions.build_auth_headers(&self.identity)
    }

    pub fn unmount(&self) {
        self.scope.cancel();
    }

    fn commit(&self, f: impl FnOnce(&mut SelfFeedSnapshot)) -> bool {
        if self.scope.is_cancelled() {
            return false;
        }
        f(&mut lock(&self.state));
        true
    }

    /// Commit the outcome of load `cycle` unless a later load got there first.
    fn commit_cycle(&self, cycle: u64, f: impl FnOnce(&mut SelfFeedSnapshot)) -> bool {
        self.commit(|s| {
            if cycle < s.cycle {
                debug!("Dropping stale load {} (have {})", cycle, s.cycle);
                return;
            }
            s.cycle = cycle;
            f(s);
        })
    }

    /// Close the feed after the server rejected the session.
    fn sign_out(&self) -> ClientError {
        warn!("Session rejected by the proofs API");
        self.commit(|s| {
            s.status = FeedStatus::Error;
            s.error = Some(ClientError::NotAuthenticated.user_message());
            s.signed_out = true;
        });
        self.scope.cancel();
        ClientError::NotAuthenticated
    }

    pub async fn refresh(&self) -> ClientResult<()> {
        if self.scope.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        self.commit(|s| s.status = FeedStatus::Loading);

        let auth = self.auth_headers();
        match self.api.list_my_proofs(&auth).await {
            Ok(items) => {
                debug!("Loaded {} own proofs", items.len());
                self.commit_cycle(cycle, |s| {
                    s.items = items;
                    s.status = FeedStatus::Ready;
                    s.error = None;
                });
                Ok(())
            }
            Err(e) if e.is_unauthorized() => Err(self.sign_out()),
            Err(e) => {
                let message = e.user_message();
                self.commit_cycle(cycle, |s| {
                    s.status = FeedStatus::Error;
                    s.error = Some(message);
                });
                Err(e)
            }
        }
    }

    /// Submit a new proof image, then reload the history.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<()> {
        if let Err(e) = validate_upload(file_name, &bytes) {
            let message = e.user_message();
            self.commit(|s| s.action_error = Some(message));
            return Err(e);
        }
        if self.scope.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        {
            let mut state = lock(&self.state);
            if state.is_uploading {
                return Err(ClientError::Rejected("An upload is already in progress".into()));
            }
            state.is_uploading = true;
            state.action_error = None;
        }

        let auth = self.auth_headers();
        let result = match self.api.upload_proof(&auth, file_name, bytes).await {
            Ok(()) => {
                info!("Uploaded payment proof {}", file_name);
                self.refresh().await
            }
            Err(e) if e.is_unauthorized() => Err(self.sign_out()),
            Err(e) => Err(e),
        };

        let action_error = result.as_ref().err().map(|e| e.user_message());
        // The flag is always cleared, even after unmount.
        {
            let mut state = lock(&self.state);
            state.is_uploading = false;
            if !self.scope.is_cancelled() {
                state.action_error = action_error;
            }
        }
        result
    }
}

fn validate_upload(file_name: &str, bytes: &[u8]) -> ClientResult<()> {
    if file_name.trim().is_empty() || bytes.is_empty() {
        return Err(ClientError::Rejected("Choose a file before submitting".into()));
    }
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ClientError::Rejected(format!(
            "Unsupported file type, expected one of: {}",
            ACCEPTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

// ── Admin feed ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AdminFeedSnapshot {
    pub status: FeedStatus,
    pub users: Vec<PaymentProofUser>,
    pub selected_user_id: Option<i64>,
    pub proofs: Vec<PaymentProof>,
    pub error: Option<String>,
    pub action_error: Option<String>,
    pub busy: bool,
    /// Cycle number of the last committed load.
    pub cycle: u64,
    /// The server rejected the session; the screen should send the user to sign in.
    pub signed_out: bool,
}

impl AdminFeedSnapshot {
    /// Buttons are disabled while a mutation runs and for the status the
    /// proof already has.
    pub fn is_action_enabled(&self, proof: &PaymentProof, action: ProofAction) -> bool {
        if self.busy {
            return false;
        }
        match action.target_status() {
            Some(target) => proof.status != target,
            None => true,
        }
    }

    pub fn selected_user(&self) -> Option<&PaymentProofUser> {
        let id = self.selected_user_id?;
        self.users.iter().find(|u| u.user_id == id)
    }
}

/// User aggregate plus the selected user's proofs, with serialized mutations.
pub struct AdminProofFeed<A: PortalApi> {
    api: Arc<A>,
    sessions: SessionStore,
    identity: Identity,
    scope: CancellationToken,
    state: Mutex<AdminFeedSnapshot>,
    in_flight: AtomicBool,
    cycles: AtomicU64,
}

/// Clears the in-flight flag however the mutation ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: PortalApi> AdminProofFeed<A> {
    pub fn new(api: Arc<A>, sessions: SessionStore, identity: Identity, scope: CancellationToken) -> Self {
        Self {
            api,
            sessions,
            identity,
            scope,
            state: Mutex::new(AdminFeedSnapshot::default()),
            in_flight: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> AdminFeedSnapshot {
        let mut snap = lock(&self.state).clone();
        snap.busy = self.in_flight.load(Ordering::Acquire);
        snap
    }

    pub fn selected_user_id(&self) -> Option<i64> {
        lock(&self.state).selected_user_id
    }

    pub fn auth_headers(&self) -> AuthHeaders {
        self.sessions.build_auth_headers(&self.identity)
    }

    pub fn unmount(&self) {
        self.scope.cancel();
    }

    fn commit(&self, f: impl FnOnce(&mut AdminFeedSnapshot)) -> bool {
        if self.scope.is_cancelled() {
            return false;
        }
        f(&mut lock(&self.state));
        true
    }

    fn next_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Commit the outcome of load `cycle` unless a later load got there first.
    fn commit_cycle(&self, cycle: u64, f: impl FnOnce(&mut AdminFeedSnapshot)) -> bool {
        self.commit(|s| {
            if cycle < s.cycle {
                debug!("Dropping stale load {} (have {})", cycle, s.cycle);
                return;
            }
            s.cycle = cycle;
            f(s);
        })
    }

    /// Close the feed after the server rejected the session.
    fn sign_out(&self) -> ClientError {
        warn!("Session rejected by the review API");
        self.commit(|s| {
            s.status = FeedStatus::Error;
            s.error = Some(ClientError::NotAuthenticated.user_message());
            s.signed_out = true;
        });
        self.scope.cancel();
        ClientError::NotAuthenticated
    }

    /// One polling cycle. With a selection, the aggregate and the proof list
    /// are fetched together and committed together. Without one, the first
    /// user of the fresh aggregate is selected and its proofs loaded.
    pub async fn refresh(&self) -> ClientResult<()> {
        if self.scope.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let cycle = self.next_cycle();
        self.commit(|s| s.status = FeedStatus::Loading);

        let auth = self.auth_headers();
        let result = match self.selected_user_id() {
            Some(user_id) => tokio::try_join!(
                self.api.list_proof_users(&auth),
                self.api.list_user_proofs(&auth, user_id),
            )
            .map(|(users, proofs)| (users, Some((user_id, proofs)))),
            None => self.load_with_first_user(&auth).await,
        };

        match result {
            Ok((users, proofs)) => {
                debug!("Loaded {} proof users", users.len());
                self.commit_cycle(cycle, |s| {
                    if s.selected_user_id.is_none() {
                        s.selected_user_id = users.first().map(|u| u.user_id);
                    }
                    s.users = users;
                    if let Some((user_id, proofs)) = proofs {
                        // A selection made while this cycle was in flight wins.
                        if s.selected_user_id == Some(user_id) {
                            s.proofs = proofs;
                        }
                    }
                    s.status = FeedStatus::Ready;
                    s.error = None;
                });
                Ok(())
            }
            Err(e) if e.is_unauthorized() => Err(self.sign_out()),
            Err(e) => {
                let message = e.user_message();
                self.commit_cycle(cycle, |s| {
                    s.status = FeedStatus::Error;
                    s.error = Some(message);
                });
                Err(e)
            }
        }
    }

    async fn load_with_first_user(
        &self,
        auth: &AuthHeaders,
    ) -> ClientResult<(Vec<PaymentProofUser>, Option<(i64, Vec<PaymentProof>)>)> {
        let users = self.api.list_proof_users(auth).await?;
        let Some(first) = users.first().map(|u| u.user_id) else {
            return Ok((users, None));
        };
        let proofs = self.api.list_user_proofs(auth, first).await?;
        Ok((users, Some((first, proofs))))
    }

    /// Set the selection without fetching. The next cycle loads its proofs.
    pub fn preselect(&self, user_id: i64) {
        lock(&self.state).selected_user_id = Some(user_id);
    }

    /// Select a user and load their proofs right away, outside the timer.
    pub async fn select_user(&self, user_id: i64) -> ClientResult<()> {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.selected_user_id != Some(user_id);
            state.selected_user_id = Some(user_id);
            if changed {
                state.proofs.clear();
            }
            changed
        };
        if changed {
            debug!("Selected proof user {}", user_id);
        }
        self.refresh_proofs().await
    }

    async fn refresh_proofs(&self) -> ClientResult<()> {
        let Some(user_id) = self.selected_user_id() else {
            return Ok(());
        };
        let cycle = self.next_cycle();
        let auth = self.auth_headers();
        match self.api.list_user_proofs(&auth, user_id).await {
            Ok(proofs) => {
                self.commit_cycle(cycle, |s| {
                    if s.selected_user_id == Some(user_id) {
                        s.proofs = proofs;
                    }
                });
                Ok(())
            }
            Err(e) if e.is_unauthorized() => Err(self.sign_out()),
            Err(e) => {
                let message = e.user_message();
                self.commit_cycle(cycle, |s| s.error = Some(message));
                Err(e)
            }
        }
    }

    pub async fn approve(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        self.set_status(proof_id, PaymentStatus::Approved).await
    }

    pub async fn reject(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        self.set_status(proof_id, PaymentStatus::Rejected).await
    }

    pub async fn reset_to_pending(&self, proof_id: i64) -> ClientResult<MutationOutcome> {
        self.set_status(proof_id, PaymentStatus::Pending).await
    }

    async fn set_status(&self, proof_id: i64, status: PaymentStatus) -> ClientResult<MutationOutcome> {
        let current = lock(&self.state)
            .proofs
            .iter()
            .find(|p| p.id == proof_id)
            .map(|p| p.status);
        if current == Some(status) {
            return Ok(MutationOutcome::Unchanged);
        }

        let Some(_guard) = self.begin_mutation() else {
            return Ok(MutationOutcome::Busy);
        };

        let auth = self.auth_headers();
        let result = self.api.update_proof_status(&auth, proof_id, status).await;
        self.finish_mutation(result, || format!("proof {} -> {}", proof_id, status))
            .await
    }

    /// Delete a proof after `confirm` agrees. Declining sends nothing.
    pub async fn delete(&self, proof_id: i64, confirm: &dyn Confirm) -> ClientResult<MutationOutcome> {
        let Some(_guard) = self.begin_mutation() else {
            return Ok(MutationOutcome::Busy);
        };

        if !confirm.confirm(&format!("Delete payment proof #{}?", proof_id)) {
            return Ok(MutationOutcome::Declined);
        }

        let auth = self.auth_headers();
        let result = self.api.delete_proof(&auth, proof_id).await;
        self.finish_mutation(result, || format!("proof {} deleted", proof_id))
            .await
    }

    fn begin_mutation(&self) -> Option<InFlight<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Mutation rejected: another one is in flight");
            return None;
        }
        self.commit(|s| s.action_error = None);
        Some(InFlight(&self.in_flight))
    }

    async fn finish_mutation(
        &self,
        result: ClientResult<()>,
        describe: impl FnOnce() -> String,
    ) -> ClientResult<MutationOutcome> {
        match result {
            Ok(()) => {
                info!("Admin mutation applied: {}", describe());
                if let Err(e) = self.refresh().await {
                    warn!("Reload after mutation failed: {}", e);
                }
                Ok(MutationOutcome::Applied)
            }
            Err(e) if e.is_unauthorized() => Err(self.sign_out()),
            Err(e) => {
                let message = e.user_message();
                self.commit(|s| s.action_error = Some(message));
                Err(e)
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // State is plain data; a panic mid-update cannot leave it unusable.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
