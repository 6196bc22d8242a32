//! Client core for a 1:1 chat application.
//!
//! Persistence, auth, realtime sync, and file storage live in a hosted
//! backend; this crate owns the client-side semantics on top of it:
//! the identity session, the friend-request ledger, deterministic
//! pairwise channels, and the live message feed. UI layers bind to the
//! services and event streams exposed here; no rendering happens in
//! this crate.

pub mod avatar;
pub mod backend;
pub mod backoff;
pub mod cache;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod friends;
pub mod observability;
pub mod session;
pub mod validation;

pub use chat::{ChannelId, ChatService, Draft, FeedPhase, FeedView, Message, MessageFeed};
pub use client::ChatClient;
pub use config::Settings;
pub use error::{AppError, AppResult, ErrorCode};
pub use events::{ChatEvent, EventBus};
pub use friends::{FriendEntry, FriendRequest, FriendService, RequestStatus};
pub use session::{AuthSession, UserProfile};
