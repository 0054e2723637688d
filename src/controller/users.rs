use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};

use crate::auth::Administrator;
use crate::domain::UserId;
use crate::error::RestResult;
use crate::sync::SubscriptionEngine;

/// Resync a user with every merged list and return the refreshed profile
#[tracing::instrument(name = "Resync a user", skip(_admin, engine))]
#[post("/{user_id}/sync")]
async fn sync(
    _admin: Administrator,
    engine: web::Data<SubscriptionEngine>,
    path: web::Path<(UserId,)>,
) -> RestResult<impl Responder> {
    let (user_id,) = path.into_inner();

    let profile = engine.resync(user_id).await?;

    Ok(HttpResponse::Ok().json(profile))
}

/// The stored synchronization status of a user
#[tracing::instrument(name = "Fetch a user's status", skip(_admin, engine))]
#[get("/{user_id}/status")]
async fn status(
    _admin: Administrator,
    engine: web::Data<SubscriptionEngine>,
    path: web::Path<(UserId,)>,
) -> RestResult<impl Responder> {
    let (user_id,) = path.into_inner();

    let user = engine.resolve_user(user_id.into()).await?;
    let profile = engine.profile(user.id).await?;

    Ok(HttpResponse::Ok().json(profile))
}

/// User administration endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/users").service(sync).service(status)
}
