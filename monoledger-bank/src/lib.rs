//! monoledger-bank: Monobank personal API client, API payloads and the
//! throttle retry policy.

pub mod client;
pub mod error;
pub mod models;
pub mod retry;

pub use client::{MonoClient, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use models::{Account, ClientInfo, WebhookAck, WebhookEvent, STATEMENT_ITEM};
pub use retry::RetryPolicy;
