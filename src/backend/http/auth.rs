use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::backend::{Auth, AuthUser, BackendError, ProfileUpdate};

use super::HttpBackend;

#[derive(Debug, Serialize)]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
    user: AuthUser,
}

impl Auth for HttpBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("auth/signup");

        let res = self
            .decorate(self.client.post(&url))
            .json(&CredentialsRequest { email, password })
            .send()
            .await?;

        let session: SessionResponse = Self::check(res, "sign up").await?.json().await?;
        self.set_token(Some(session.token)).await;

        Ok(session.user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("auth/login");

        let res = self
            .decorate(self.client.post(&url))
            .json(&CredentialsRequest { email, password })
            .send()
            .await?;

        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(BackendError::InvalidCredentials);
        }

        let session: SessionResponse = Self::check(res, "sign in").await?.json().await?;
        self.set_token(Some(session.token)).await;

        Ok(session.user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_token(None).await;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let Some(token) = self.get_token().await else {
            return Ok(None);
        };

        let url = self.endpoint("auth/me");

        let res = self
            .decorate(self.client.get(&url))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if res.status() == StatusCode::UNAUTHORIZED {
            // Session expired server-side; fall back to signed-out.
            self.set_token(None).await;
            return Ok(None);
        }

        let user: AuthUser = Self::check(res, "fetch current user").await?.json().await?;
        Ok(Some(user))
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<AuthUser, BackendError> {
        let url = self.endpoint("auth/profile");

        let res = self
            .decorate(self.client.patch(&url))
            .header("Authorization", self.auth_header().await?)
            .json(&update)
            .send()
            .await?;

        let user: AuthUser = Self::check(res, "update profile").await?.json().await?;
        Ok(user)
    }

    async fn send_email_verification(&self) -> Result<(), BackendError> {
        let url = self.endpoint("auth/verify-email");

        let res = self
            .decorate(self.client.post(&url))
            .header("Authorization", self.auth_header().await?)
            .send()
            .await?;

        Self::check(res, "send verification email").await?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), BackendError> {
        let url = self.endpoint("auth/reset-password");

        let res = self
            .decorate(self.client.post(&url))
            .json(&PasswordResetRequest { email })
            .send()
            .await?;

        Self::check(res, "send password reset").await?;
        Ok(())
    }
}
