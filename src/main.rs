use anyhow::Result;
use script_improv::core::config::Config;
use script_improv::server;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please check 'config.yml' or unset SCRIPT_IMPROV_CONFIG.");
            return Err(e);
        }
    };

    server::run(config).await
}
