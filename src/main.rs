use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;

use sqlx::PgPool;

use mailsync::app;
use mailsync::client::MailchimpClient;
use mailsync::host::TaskQueue;
use mailsync::repo::{PgStatusStore, PgUserDirectory};
use mailsync::settings::Settings;
use mailsync::sync::{run_worker, SubscriptionEngine, SyncContext};
use mailsync::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber("info".into(), std::io::stdout);
    telemetry::set_subscriber(subscriber)?;

    let settings = Settings::load()?;

    let pool = PgPool::connect_with(settings.database.with_db())
        .await
        .context("Failed to connect to the database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let remote = MailchimpClient::new(
        settings.mailchimp.api_base_url()?,
        settings.mailchimp.api_key(),
        settings.mailchimp.api_timeout(),
    )?;
    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let (tasks, jobs) = TaskQueue::new();

    let context = SyncContext::builder(
        Arc::new(remote),
        Arc::new(PgStatusStore::new(pool)),
        users.clone(),
    )
    .lists(settings.lists)
    .suppression(users)
    .tasks(Arc::new(tasks))
    .build()
    .context("Failed to compile list field maps")?;
    let engine = SubscriptionEngine::new(context);

    tokio::spawn(run_worker(jobs, engine.clone()));

    let listener = TcpListener::bind(settings.app.addr())?;

    app::run(listener, engine, settings.admin)?
        .await
        .context("Failed to run app")
}
