use lambda_http::Error;
use log::info;

mod error;
mod handlers;
mod models;
mod notifications;
mod routes;
mod state;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize env_logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Family Service");

    let app = routes::create_router().await;

    lambda_http::run(app).await
}
