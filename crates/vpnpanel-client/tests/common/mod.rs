#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use tokio::sync::Notify;

use vpnpanel_client::session::AuthHeaders;
use vpnpanel_client::{ClientError, ClientResult, MemoryStore, PortalApi, SessionStore};
use vpnpanel_types::{
    AuthResponse, Identity, PaymentProof, PaymentProofUser, PaymentStatus, TelegramAuthPayload,
};

/// In-memory backend that records every call it receives.
#[derive(Default)]
pub struct FakeApi {
    pub mine: Mutex<Vec<PaymentProof>>,
    pub users: Mutex<Vec<PaymentProofUser>>,
    pub proofs_by_user: Mutex<HashMap<i64, Vec<PaymentProof>>>,
    pub calls: Mutex<Vec<String>>,
    /// file_url -> bytes. Missing entries fail with a 404.
    pub images: Mutex<HashMap<String, Vec<u8>>>,
    /// When set, status changes and deletes wait here before answering.
    pub mutation_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, image fetches wait here before answering.
    pub image_gate: Mutex<Option<Arc<Notify>>>,
    /// The next call of each kind waits here after reading its data.
    pub hold_users: Mutex<Option<Arc<Notify>>>,
    pub hold_user_proofs: Mutex<Option<Arc<Notify>>>,
    pub hold_mine: Mutex<Option<Arc<Notify>>>,
    pub fail_mutations: Mutex<bool>,
    /// List endpoints answer 500 while set.
    pub fail_lists: Mutex<bool>,
    /// Every authenticated endpoint answers 401 while set.
    pub unauthorized: Mutex<bool>,
    pub login_error: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn gate_mutations(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.mutation_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn gate_images(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.image_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold only the next call through `slot`. Release with `notify_one`.
    pub fn hold_next(slot: &Mutex<Option<Arc<Notify>>>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *slot.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn wait_hold(slot: &Mutex<Option<Arc<Notify>>>) {
        let gate = slot.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn check_auth(&self) -> ClientResult<()> {
        if *self.unauthorized.lock().unwrap() {
            return Err(ClientError::Server {
                status: StatusCode::UNAUTHORIZED,
                message: "Invalid token".into(),
            });
        }
        Ok(())
    }

    fn check_list(&self) -> ClientResult<()> {
        self.check_auth()?;
        if *self.fail_lists.lock().unwrap() {
            return Err(ClientError::Server {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Could not load payment proofs".into(),
            });
        }
        Ok(())
    }

    async fn wait_gate(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn apply_status(&self, proof_id: i64, status: PaymentStatus) {
        for proofs in self.proofs_by_user.lock().unwrap().values_mut() {
            for p in proofs.iter_mut().filter(|p| p.id == proof_id) {
                p.status = status;
            }
        }
    }
}

#[async_trait]
impl PortalApi for FakeApi {
    async fn telegram_login(&self, payload: &TelegramAuthPayload) -> ClientResult<AuthResponse> {
        self.record(format!("login {}", payload.id));
        if let Some(error) = self.login_error.lock().unwrap().clone() {
            return Err(ClientError::Server {
                status: StatusCode::FORBIDDEN,
                message: error,
            });
        }
        Ok(AuthResponse {
            id: payload.id,
            username: payload.username.clone(),
            photo: payload.photo_url.clone(),
            token: format!("token-{}", payload.id),
            subscription_url: Some("https://sub.example.com/abc".into()),
        })
    }

    async fn list_my_proofs(&self, auth: &AuthHeaders) -> ClientResult<Vec<PaymentProof>> {
        self.record(format!("list_mine {}", auth.user_id));
        self.check_list()?;
        let mine = self.mine.lock().unwrap().clone();
        Self::wait_hold(&self.hold_mine).await;
        Ok(mine)
    }

    async fn upload_proof(&self, _auth: &AuthHeaders, file_name: &str, bytes: Vec<u8>) -> ClientResult<()> {
        self.record(format!("upload {}", file_name));
        self.check_auth()?;
        let mut mine = self.mine.lock().unwrap();
        let id = 100 + mine.len() as i64;
        let mut p = proof(id, 42, PaymentStatus::Pending);
        p.file_url = format!("/api/payment-proofs/{}/file/", id);
        self.images.lock().unwrap().insert(p.file_url.clone(), bytes);
        mine.insert(0, p);
        Ok(())
    }

    async fn list_proof_users(&self, _auth: &AuthHeaders) -> ClientResult<Vec<PaymentProofUser>> {
        self.record("list_users".to_string());
        self.check_list()?;
        let users = self.users.lock().unwrap().clone();
        Self::wait_hold(&self.hold_users).await;
        Ok(users)
    }

    async fn list_user_proofs(&self, _auth: &AuthHeaders, user_id: i64) -> ClientResult<Vec<PaymentProof>> {
        self.record(format!("list_user {}", user_id));
        self.check_list()?;
        let proofs = self
            .proofs_by_user
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        Self::wait_hold(&self.hold_user_proofs).await;
        Ok(proofs)
    }

    async fn update_proof_status(
        &self,
        _auth: &AuthHeaders,
        proof_id: i64,
        status: PaymentStatus,
    ) -> ClientResult<()> {
        self.record(format!("update {} {}", proof_id, status));
        Self::wait_gate(&self.mutation_gate).await;
        self.check_auth()?;
        if *self.fail_mutations.lock().unwrap() {
            return Err(ClientError::Server {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Could not update status".into(),
            });
        }
        self.apply_status(proof_id, status);
        Ok(())
    }

    async fn delete_proof(&self, _auth: &AuthHeaders, proof_id: i64) -> ClientResult<()> {
        self.record(format!("delete {}", proof_id));
        Self::wait_gate(&self.mutation_gate).await;
        self.check_auth()?;
        for proofs in self.proofs_by_user.lock().unwrap().values_mut() {
            proofs.retain(|p| p.id != proof_id);
        }
        Ok(())
    }

    async fn fetch_proof_image(&self, _auth: &AuthHeaders, file_url: &str) -> ClientResult<Bytes> {
        self.record(format!("image {}", file_url));
        Self::wait_gate(&self.image_gate).await;
        match self.images.lock().unwrap().get(file_url) {
            Some(bytes) => Ok(Bytes::from(bytes.clone())),
            None => Err(ClientError::Server {
                status: StatusCode::NOT_FOUND,
                message: "Could not load image".into(),
            }),
        }
    }
}

pub fn proof(id: i64, user_id: i64, status: PaymentStatus) -> PaymentProof {
    PaymentProof {
        id,
        user_id,
        username: format!("user{}", user_id),
        status,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        reviewed_at: None,
        reviewed_by: None,
        reviewed_by_username: String::new(),
        file_url: String::new(),
    }
}

pub fn proof_with_file(id: i64, user_id: i64) -> PaymentProof {
    PaymentProof {
        file_url: format!("/api/payment-proofs/{}/file/", id),
        ..proof(id, user_id, PaymentStatus::Pending)
    }
}

pub fn user(user_id: i64, pending_count: u32) -> PaymentProofUser {
    PaymentProofUser {
        user_id,
        username: format!("user{}", user_id),
        pending_count,
    }
}

pub fn identity() -> Identity {
    Identity {
        id: 42,
        username: Some("bob".into()),
        photo: None,
    }
}

/// A session store already holding a token for [`identity`].
pub fn signed_in_store() -> SessionStore {
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    store
        .save(AuthResponse {
            id: 42,
            username: Some("bob".into()),
            photo: None,
            token: "abc".into(),
            subscription_url: None,
        })
        .unwrap();
    store
}
