use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};

use serde::Deserialize;

use crate::sync::{EventBridge, WebhookError, WebhookEvent};

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    mailchimpwhs: Option<String>,
}

/// Form body posted by the remote service. Fields default to empty so a
/// malformed body still goes through the secret check.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "data[list_id]", default)]
    list_id: String,
    #[serde(rename = "data[email]", default)]
    email: Option<String>,
}

impl From<WebhookForm> for WebhookEvent {
    fn from(form: WebhookForm) -> Self {
        Self {
            kind: form.kind.as_str().into(),
            list_id: form.list_id,
            email: form.email,
        }
    }
}

/// The remote service checks the URL answers before registering it
#[tracing::instrument(name = "Validate webhook endpoint")]
#[get("")]
async fn validate() -> impl Responder {
    HttpResponse::Ok().finish()
}

#[tracing::instrument(name = "Receive webhook", skip(bridge, query, form))]
#[post("")]
async fn receive(
    bridge: web::Data<EventBridge>,
    query: web::Query<WebhookQuery>,
    form: web::Form<WebhookForm>,
) -> impl Responder {
    let event: WebhookEvent = form.into_inner().into();

    match bridge
        .handle_webhook(event, query.mailchimpwhs.as_deref())
        .await
    {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook handled");
            HttpResponse::Ok().finish()
        }
        Err(WebhookError::SecretMismatch(_)) => HttpResponse::NotFound().finish(),
        Err(WebhookError::Sync(e)) => {
            tracing::warn!("Webhook synchronization failed: {}", e);
            HttpResponse::Ok().finish()
        }
    }
}

/// Webhook endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/webhooks/mailchimp")
        .service(validate)
        .service(receive)
}
