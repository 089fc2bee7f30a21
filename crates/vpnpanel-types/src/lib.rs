pub mod api;
pub mod models;

pub use api::{AuthResponse, ErrorBody, ItemsResponse, TelegramAuthPayload, UpdateStatusRequest};
pub use models::{Identity, PaymentProof, PaymentProofUser, PaymentStatus, Session};
