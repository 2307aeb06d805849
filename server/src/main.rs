use rocket::{Build, Rocket};
use sweeper_server::{build_rocket, config::Settings};
use tracing::{error, info};

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt::init();
    info!("Starting sweeper server");

    let settings = Settings::from_env();
    let rocket = match build_rocket(settings) {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Invalid CORS configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Endpoints: POST /create, GET /ws, GET /health");
    rocket
}
