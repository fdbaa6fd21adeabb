use beanpay_server::{config::ServerConfig, errors::ServerError, server::run_server};
use log::*;

#[actix_web::main]
async fn main() -> Result<(), ServerError> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("🛍️️ BeanPay gateway starting ({:?} environment)", config.environment);
    if config.database_url.is_empty() {
        return Err(ServerError::ConfigurationError("BP_DATABASE_URL must be set".to_string()));
    }
    run_server(config).await?;
    info!("🛍️️ BeanPay gateway shutting down");
    Ok(())
}
