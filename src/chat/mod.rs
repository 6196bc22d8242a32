pub mod channel;
pub mod domain;
pub mod feed;
pub mod service;

pub use channel::ChannelId;
pub use domain::{ChannelMeta, Draft, FileAttachment, Message, OutgoingFile};
pub use feed::{FeedPhase, FeedView, MessageFeed};
pub use service::{ChatService, WipeSummary};
