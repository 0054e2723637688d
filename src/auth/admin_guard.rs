use std::future::Future;
use std::pin::Pin;

use actix_web::{dev, web, FromRequest, HttpRequest};

use argon2::{Argon2, PasswordHash, PasswordVerifier};

use anyhow::Context;

use secrecy::Secret;

use crate::auth::Credentials;
use crate::crypto::constant_time_eq;
use crate::error::{RestError, RestResult};
use crate::settings::AdminSettings;
use crate::telemetry::spawn_blocking_with_tracing;

/// Request guard admitting only the configured administrator
#[derive(Debug)]
pub struct Administrator;

impl FromRequest for Administrator {
    type Error = RestError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            // NOTE: Must be registered with the application at startup
            let admin = req
                .app_data::<web::Data<AdminSettings>>()
                .ok_or_else(|| RestError::InternalError("Administrator not configured".into()))?;

            let creds = Credentials::from_headers(req.headers())
                .map_err(RestError::FailedToAuthenticate)?;

            validate_credentials(admin, creds).await?;

            Ok(Administrator)
        })
    }
}

#[tracing::instrument("Validate credentials", skip(admin, credentials))]
async fn validate_credentials(admin: &AdminSettings, credentials: Credentials) -> RestResult<()> {
    let username_matches = constant_time_eq(
        credentials.username.as_bytes(),
        admin.username().as_bytes(),
    );

    let password = credentials.password;
    let password_hash = admin.password_hash();

    // Verified before the username check, for uniform timing
    spawn_blocking_with_tracing(move || verify_password_hash(password, password_hash))
        .await
        .context("Failed to spawn blocking task")??;

    if !username_matches {
        return Err(RestError::FailedToAuthenticate(anyhow::anyhow!(
            "Unknown username"
        )));
    }

    Ok(())
}

#[tracing::instrument("Verify password hash", skip(password, password_hash))]
fn verify_password_hash(password: Secret<String>, password_hash: Secret<String>) -> RestResult<()> {
    use secrecy::ExposeSecret;

    let password_hash = PasswordHash::new(password_hash.expose_secret())
        .context("Failed to parse stored password hash")?;

    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &password_hash)
        .context("Failed to verify password hash")
        .map_err(RestError::FailedToAuthenticate)?;

    Ok(())
}
