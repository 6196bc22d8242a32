//! Identity store. Owns the signed-in user and the auth flows; every
//! other service reads the current identity through [`AuthSession`]
//! instead of touching the backend's session state directly.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::backend::{AuthUser, Backend, ProfileUpdate, Query};
use crate::cache::WarmCache;
use crate::error::{AppError, AppResult};
use crate::validation::{
    normalize_display_name, normalize_email, validate_display_name, validate_email,
    validate_password,
};

pub(crate) const USERS_COLLECTION: &str = "users";
pub(crate) const PROFILE_IMAGE_PREFIX: &str = "profile_images";

/// The signed-in user as seen by the rest of the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub email: String,
}

/// Profile document mirrored into the `users` collection so other
/// participants can look a user up by uid or display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserDoc {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ProfileImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct AuthSession<B> {
    backend: Arc<B>,
    cache: WarmCache,
    identity: RwLock<Option<UserProfile>>,
}

impl<B: Backend> AuthSession<B> {
    pub fn new(backend: Arc<B>, cache: WarmCache) -> Self {
        Self {
            backend,
            cache,
            identity: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<UserProfile> {
        self.read_identity().clone()
    }

    pub(crate) fn require_current(&self) -> AppResult<UserProfile> {
        self.current().ok_or_else(AppError::not_authenticated)
    }

    fn read_identity(&self) -> std::sync::RwLockReadGuard<'_, Option<UserProfile>> {
        self.identity.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_identity(&self) -> std::sync::RwLockWriteGuard<'_, Option<UserProfile>> {
        self.identity.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-adopt a verified backend session, e.g. after process restart.
    pub async fn restore(&self) -> AppResult<Option<UserProfile>> {
        let Some(user) = self.backend.current_user().await? else {
            return Ok(None);
        };
        if !user.email_verified {
            return Ok(None);
        }

        let profile = profile_from(user);
        *self.write_identity() = Some(profile.clone());
        Ok(Some(profile))
    }

    /// Create an account. The session stays signed out: the account is
    /// unusable until the verification email is acted on.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        profile_image: Option<ProfileImage>,
    ) -> AppResult<()> {
        validate_email(email)?;
        validate_password(password)?;
        validate_display_name(display_name)?;

        let email = normalize_email(email);
        let display_name = normalize_display_name(display_name);

        let taken = self
            .backend
            .run_query(
                &Query::collection(USERS_COLLECTION).filter_eq("displayName", display_name.clone()),
            )
            .await?;
        if !taken.is_empty() {
            return Err(AppError::conflict("Display name already exists"));
        }

        let user = self.backend.sign_up(&email, password).await?;
        tracing::info!(component = "session", uid = %user.uid, "account created");

        let photo_url = match profile_image {
            Some(image) => {
                let path = format!("{}/{}", PROFILE_IMAGE_PREFIX, user.uid);
                self.backend
                    .upload(&path, image.bytes, &image.content_type)
                    .await?;
                Some(self.backend.download_url(&path).await?)
            }
            None => None,
        };

        self.backend
            .update_profile(ProfileUpdate {
                display_name: Some(display_name.clone()),
                photo_url: photo_url.clone(),
            })
            .await?;

        let doc = UserDoc {
            display_name,
            photo_url,
            email: email.clone(),
        };
        self.backend
            .set_document(USERS_COLLECTION, &user.uid, serde_json::to_value(&doc)?)
            .await?;

        self.backend.send_email_verification().await?;
        Ok(())
    }

    /// Sign in; rejects accounts that have not verified their email.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<UserProfile> {
        validate_email(email)?;
        validate_password(password)?;

        let user = self.backend.sign_in(&normalize_email(email), password).await?;

        if !user.email_verified {
            return Err(AppError::new(
                crate::error::ErrorCode::NotAuthenticated,
                "Please verify your email address before signing in",
            ));
        }

        let profile = profile_from(user);
        *self.write_identity() = Some(profile.clone());

        tracing::info!(component = "session", uid = %profile.uid, "signed in");
        Ok(profile)
    }

    /// Sign out and invalidate this user's warm-start cache rows.
    pub async fn sign_out(&self) -> AppResult<()> {
        self.backend.sign_out().await?;

        let previous = self.write_identity().take();
        if let Some(profile) = previous {
            self.cache.clear_owner(&profile.uid).await?;
            tracing::info!(component = "session", uid = %profile.uid, "signed out");
        }

        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        validate_email(email)?;
        self.backend.send_password_reset(&normalize_email(email)).await?;
        Ok(())
    }

    /// Replace the profile image: upload, point the backend profile and
    /// the `users` document at it, refresh the local identity.
    pub async fn update_avatar(&self, image: ProfileImage) -> AppResult<UserProfile> {
        let profile = self.require_current()?;

        let path = format!("{}/{}", PROFILE_IMAGE_PREFIX, profile.uid);
        self.backend
            .upload(&path, image.bytes, &image.content_type)
            .await?;
        let photo_url = self.backend.download_url(&path).await?;

        self.backend
            .update_profile(ProfileUpdate {
                display_name: None,
                photo_url: Some(photo_url.clone()),
            })
            .await?;

        let doc = UserDoc {
            display_name: profile.display_name.clone(),
            photo_url: Some(photo_url.clone()),
            email: profile.email.clone(),
        };
        self.backend
            .set_document(USERS_COLLECTION, &profile.uid, serde_json::to_value(&doc)?)
            .await?;

        let updated = UserProfile {
            photo_url: Some(photo_url),
            ..profile
        };
        *self.write_identity() = Some(updated.clone());

        Ok(updated)
    }
}

fn profile_from(user: AuthUser) -> UserProfile {
    UserProfile {
        uid: user.uid,
        // Accounts created before a display name was chosen fall back
        // to the email address.
        display_name: user.display_name.unwrap_or_else(|| user.email.clone()),
        photo_url: user.photo_url,
        email: user.email,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::DocumentStore;
    use crate::error::ErrorCode;
    use crate::friends::domain::FriendEntry;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_db_path(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.sqlite", prefix, Uuid::new_v4()))
    }

    async fn session_fixture(prefix: &str) -> (Arc<MemoryBackend>, AuthSession<MemoryBackend>, PathBuf) {
        let backend = Arc::new(MemoryBackend::new());
        let db_path = temp_db_path(prefix);
        let cache = WarmCache::new(db_path.clone()).await.expect("cache init");
        let session = AuthSession::new(backend.clone(), cache);
        (backend, session, db_path)
    }

    #[tokio::test]
    async fn sign_up_provisions_profile_without_session() {
        let (backend, session, db_path) = session_fixture("session-signup").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");

        assert!(session.current().is_none());
        assert_eq!(
            backend.sent_verification_emails(),
            vec!["alice@example.com".to_string()]
        );

        let docs = backend
            .run_query(&Query::collection(USERS_COLLECTION).filter_eq("displayName", "alice"))
            .await
            .expect("query users");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["email"], "alice@example.com");

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn duplicate_display_name_is_rejected_before_account_creation() {
        let (backend, session, db_path) = session_fixture("session-dup-name").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("first sign up");

        let err = session
            .sign_up("other@example.com", "hunter2", "alice", None)
            .await
            .expect_err("duplicate display name");
        assert_eq!(err.code, ErrorCode::Conflict);

        // Only one account got provisioned.
        assert_eq!(backend.sent_verification_emails().len(), 1);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn sign_in_gates_on_email_verification() {
        let (backend, session, db_path) = session_fixture("session-verify").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");

        let err = session
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect_err("unverified sign in");
        assert_eq!(err.code, ErrorCode::NotAuthenticated);

        backend.mark_email_verified("alice@example.com");

        let profile = session
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect("verified sign in");
        assert_eq!(profile.display_name, "alice");
        assert!(session.current().is_some());

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn wrong_password_surfaces_as_not_authenticated() {
        let (backend, session, db_path) = session_fixture("session-badpw").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");
        backend.mark_email_verified("alice@example.com");

        let err = session
            .sign_in("alice@example.com", "wrong")
            .await
            .expect_err("bad password");
        assert_eq!(err.code, ErrorCode::NotAuthenticated);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn sign_out_invalidates_warm_cache_rows() {
        let (backend, session, db_path) = session_fixture("session-signout").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");
        backend.mark_email_verified("alice@example.com");
        let profile = session
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect("sign in");

        let cache = WarmCache::new(db_path.clone()).await.expect("cache reopen");
        cache
            .replace_friends(
                &profile.uid,
                &[FriendEntry {
                    request_id: "r1".to_string(),
                    uid: "u2".to_string(),
                    display_name: "bob".to_string(),
                    avatar_url: None,
                    background_color: "hsl(1, 60%, 80%)".to_string(),
                }],
            )
            .await
            .expect("seed cache");

        session.sign_out().await.expect("sign out");

        assert!(session.current().is_none());
        assert!(cache
            .cached_friends(&profile.uid)
            .await
            .expect("load")
            .is_empty());

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn update_avatar_touches_storage_profile_and_users_doc() {
        let (backend, session, db_path) = session_fixture("session-avatar").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");
        backend.mark_email_verified("alice@example.com");
        let profile = session
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect("sign in");

        let updated = session
            .update_avatar(ProfileImage {
                bytes: vec![0xff, 0xd8],
                content_type: "image/jpeg".to_string(),
            })
            .await
            .expect("update avatar");

        let expected_url = format!("memory://{}/{}", PROFILE_IMAGE_PREFIX, profile.uid);
        assert_eq!(updated.photo_url.as_deref(), Some(expected_url.as_str()));

        let doc = backend
            .get_document(USERS_COLLECTION, &profile.uid)
            .await
            .expect("get")
            .expect("users doc");
        assert_eq!(doc.data["photoUrl"], expected_url);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn password_reset_goes_to_the_normalized_address() {
        let (backend, session, db_path) = session_fixture("session-reset").await;

        session
            .send_password_reset("  Alice@Example.com ")
            .await
            .expect("request reset");

        assert_eq!(
            backend.sent_password_resets(),
            vec!["alice@example.com".to_string()]
        );

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn restore_readopts_a_verified_backend_session() {
        let (backend, session, db_path) = session_fixture("session-restore").await;

        session
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up");

        // Unverified backend sessions are not adopted.
        let cache = WarmCache::new(db_path.clone()).await.expect("cache reopen");
        let fresh = AuthSession::new(backend.clone(), cache.clone());
        assert!(fresh.restore().await.expect("restore").is_none());

        backend.mark_email_verified("alice@example.com");
        session
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect("sign in");

        let restored = fresh.restore().await.expect("restore").expect("profile");
        assert_eq!(restored.display_name, "alice");
        assert!(fresh.current().is_some());

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_remote_call() {
        let (backend, session, db_path) = session_fixture("session-validate").await;

        assert_eq!(
            session
                .sign_up("not-an-email", "pw", "alice", None)
                .await
                .expect_err("bad email")
                .code,
            ErrorCode::InvalidInput
        );
        assert_eq!(
            session
                .sign_up("alice@example.com", "", "alice", None)
                .await
                .expect_err("blank password")
                .code,
            ErrorCode::InvalidInput
        );
        assert_eq!(
            session
                .sign_up("alice@example.com", "pw", "  ", None)
                .await
                .expect_err("blank display name")
                .code,
            ErrorCode::InvalidInput
        );

        assert!(backend.sent_verification_emails().is_empty());

        let _ = std::fs::remove_file(db_path);
    }
}
