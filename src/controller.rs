pub mod users;
pub mod webhooks;
