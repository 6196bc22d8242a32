pub mod domain;
pub mod service;

pub use domain::{FriendEntry, FriendProfile, FriendRequest, PendingRequest, RequestStatus};
pub use service::FriendService;
