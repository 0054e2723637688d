use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{get, HttpResponse, Responder};
use actix_web::{web, App, HttpServer};

use tracing_actix_web::TracingLogger;

use crate::controller::{users, webhooks};
use crate::settings::AdminSettings;
use crate::sync::{EventBridge, SubscriptionEngine};

/// Simple health-check endpoint
#[tracing::instrument(name = "Health check")]
#[get("/health_check")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}

/// Run the application on a specified TCP listener
pub fn run(
    listener: TcpListener,
    engine: SubscriptionEngine,
    admin: AdminSettings,
) -> anyhow::Result<Server> {
    // Wrap application data
    let bridge = web::Data::new(EventBridge::new(engine.clone()));
    let engine = web::Data::new(engine);
    let admin = web::Data::new(admin);

    // Start the server
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(engine.clone())
            .app_data(bridge.clone())
            .app_data(admin.clone())
            .service(health_check)
            .service(webhooks::scope())
            .service(users::scope())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
