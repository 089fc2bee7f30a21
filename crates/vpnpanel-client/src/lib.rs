//! Client core for the VPN subscription portal: session persistence,
//! authenticated API access, polled proof feeds and the admin review flow.

pub mod admin;
pub mod api;
pub mod auth;
pub mod blobs;
pub mod config;
pub mod error;
pub mod expiry;
pub mod feed;
pub mod images;
pub mod poller;
pub mod profile;
pub mod router;
pub mod screen;
pub mod session;
pub mod storage;

pub use admin::AdminAllowList;
pub use api::{HttpApi, PortalApi};
pub use auth::AuthFlow;
pub use blobs::{BlobStore, BlobUrl, DiskBlobStore, MemoryBlobStore};
pub use config::{PortalConfig, RawConfig};
pub use error::{ClientError, ClientResult};
pub use expiry::{Expiry, RenewalSchedule, compute_expiry};
pub use feed::{
    AdminFeedSnapshot, AdminProofFeed, Confirm, FeedStatus, MutationOutcome, ProofAction,
    SelfFeedSnapshot, SelfProofFeed,
};
pub use images::ImageBlobCache;
pub use poller::{PollHandle, Poller};
pub use profile::ProfileView;
pub use router::{Route, Screen, route};
pub use screen::{AdminReviewScreen, PayScreen, ScreenDeps};
pub use session::{AuthHeaders, SessionStore};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
