use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, multipart};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use vpnpanel_types::{
    AuthResponse, ErrorBody, ItemsResponse, PaymentProof, PaymentProofUser, PaymentStatus,
    TelegramAuthPayload, UpdateStatusRequest,
};

use crate::error::{ClientError, ClientResult};
use crate::session::AuthHeaders;

/// The backend REST API as seen by the client. The HTTP implementation is
/// [`HttpApi`]; tests substitute their own.
#[async_trait]
pub trait PortalApi: Send + Sync + 'static {
    async fn telegram_login(&self, payload: &TelegramAuthPayload) -> ClientResult<AuthResponse>;

    async fn list_my_proofs(&self, auth: &AuthHeaders) -> ClientResult<Vec<PaymentProof>>;

    async fn upload_proof(
        &self,
        auth: &AuthHeaders,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<()>;

    async fn list_proof_users(&self, auth: &AuthHeaders) -> ClientResult<Vec<PaymentProofUser>>;

    async fn list_user_proofs(
        &self,
        auth: &AuthHeaders,
        user_id: i64,
    ) -> ClientResult<Vec<PaymentProof>>;

    async fn update_proof_status(
        &self,
        auth: &AuthHeaders,
        proof_id: i64,
        status: PaymentStatus,
    ) -> ClientResult<()>;

    async fn delete_proof(&self, auth: &AuthHeaders, proof_id: i64) -> ClientResult<()>;

    /// Fetch the image behind a proof's `file_url`.
    async fn fetch_proof_image(&self, auth: &AuthHeaders, file_url: &str) -> ClientResult<Bytes>;
}

/// reqwest-backed API client rooted at the server origin (the `/api`
/// prefix is added here).
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("bad API URL '{}': {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidConfig(format!("bad path '{}': {}", path, e)))
    }

    /// `file_url` is either absolute or relative to the server origin.
    fn resolve_file_url(&self, file_url: &str) -> ClientResult<Url> {
        match Url::parse(file_url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self.url(file_url),
            Err(e) => Err(ClientError::Decode(format!("bad file_url '{}': {}", file_url, e))),
        }
    }

    fn authed(&self, method: Method, url: Url, auth: &AuthHeaders) -> ClientResult<RequestBuilder> {
        Ok(self.client.request(method, url).headers(auth.to_header_map()?))
    }

    /// GET /api/health/
    pub async fn health(&self) -> ClientResult<()> {
        let resp = self.client.get(self.url("api/health/")?).send().await?;
        check(resp, "Health check failed").await?;
        Ok(())
    }
}

#[async_trait]
impl PortalApi for HttpApi {
    async fn telegram_login(&self, payload: &TelegramAuthPayload) -> ClientResult<AuthResponse> {
        let resp = self
            .client
            .post(self.url("api/auth/telegram/")?)
            .json(payload)
            .send()
            .await?;
        let resp = check(resp, "Authorization failed").await?;
        decode(resp).await
    }

    async fn list_my_proofs(&self, auth: &AuthHeaders) -> ClientResult<Vec<PaymentProof>> {
        let resp = self
            .authed(Method::GET, self.url("api/payment-proofs/")?, auth)?
            .send()
            .await?;
        let resp = check(resp, "Could not load your submissions").await?;
        Ok(decode::<ItemsResponse<PaymentProof>>(resp).await?.items)
    }

    async fn upload_proof(
        &self,
        auth: &AuthHeaders,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<()> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .authed(Method::POST, self.url("api/payment-proofs/")?, auth)?
            .multipart(form)
            .send()
            .await?;
        check(resp, "Upload failed").await?;
        Ok(())
    }

    async fn list_proof_users(&self, auth: &AuthHeaders) -> ClientResult<Vec<PaymentProofUser>> {
        let resp = self
            .authed(Method::GET, self.url("api/admin/payment-proofs/users/")?, auth)?
            .send()
            .await?;
        let resp = check(resp, "Could not load users").await?;
        Ok(decode::<ItemsResponse<PaymentProofUser>>(resp).await?.items)
    }

    async fn list_user_proofs(
        &self,
        auth: &AuthHeaders,
        user_id: i64,
    ) -> ClientResult<Vec<PaymentProof>> {
        let resp = self
            .authed(Method::GET, self.url("api/admin/payment-proofs/")?, auth)?
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let resp = check(resp, "Could not load user's submissions").await?;
        Ok(decode::<ItemsResponse<PaymentProof>>(resp).await?.items)
    }

    async fn update_proof_status(
        &self,
        auth: &AuthHeaders,
        proof_id: i64,
        status: PaymentStatus,
    ) -> ClientResult<()> {
        let url = self.url(&format!("api/admin/payment-proofs/{}/", proof_id))?;
        let resp = self
            .authed(Method::PATCH, url, auth)?
            .json(&UpdateStatusRequest { status })
            .send()
            .await?;
        check(resp, "Could not update status").await?;
        Ok(())
    }

    async fn delete_proof(&self, auth: &AuthHeaders, proof_id: i64) -> ClientResult<()> {
        let url = self.url(&format!("api/admin/payment-proofs/{}/", proof_id))?;
        let resp = self.authed(Method::DELETE, url, auth)?.send().await?;
        check(resp, "Could not delete submission").await?;
        Ok(())
    }

    async fn fetch_proof_image(&self, auth: &AuthHeaders, file_url: &str) -> ClientResult<Bytes> {
        let url = self.resolve_file_url(file_url)?;
        debug!("Fetching proof image {}", url);
        let resp = self.authed(Method::GET, url, auth)?.send().await?;
        let resp = check(resp, "Could not load image").await?;
        Ok(resp.bytes().await?)
    }
}

/// Turn a non-2xx response into `ClientError::Server`, preferring the
/// body's `error` field over `fallback`.
async fn check(resp: Response, fallback: &str) -> ClientResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());

    debug!("Request rejected ({}): {}", status, message);
    Err(ClientError::Server { status, message })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
