#[macro_use]
extern crate rocket;

mod aggregate;
mod api;
mod categorize;
mod classifier;
mod config;
mod dates;
mod db;
mod error;
mod insights;
mod models;

use std::sync::Arc;

use classifier::{OpenAiClassifier, SharedClassifier};
use config::AppConfig;
use rocket::fairing::{self, AdHoc};
use rocket::{Build, Rocket};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn init_store(rocket: Rocket<Build>) -> fairing::Result {
    let Some(path) = rocket.state::<AppConfig>().map(|config| config.database_path.clone()) else {
        error!("application config missing before store init");
        return Err(rocket);
    };
    match db::init_db(&path) {
        Ok(pool) => Ok(rocket.manage(pool)),
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to open transaction store");
            Err(rocket)
        }
    }
}

async fn init_classifier(rocket: Rocket<Build>) -> fairing::Result {
    let Some(config) = rocket.state::<AppConfig>().map(|config| config.classifier.clone()) else {
        error!("application config missing before classifier init");
        return Err(rocket);
    };
    match OpenAiClassifier::new(&config) {
        Ok(classifier) => {
            if config.resolved_api_key().is_none() {
                warn!("no classifier API key; categorization falls back and insights fail");
            }
            info!(model = %config.model, base_url = %config.base_url, "classifier ready");
            let shared: SharedClassifier = Arc::new(classifier);
            Ok(rocket.manage(shared))
        }
        Err(err) => {
            error!(error = %err, "failed to build classifier client");
            Err(rocket)
        }
    }
}

/// Routes and catchers, without any managed state.
fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .register("/", api::catchers())
}

#[launch]
fn rocket() -> _ {
    init_tracing();
    mount(rocket::build())
        .attach(AdHoc::config::<AppConfig>())
        .attach(AdHoc::try_on_ignite("Transaction store", init_store))
        .attach(AdHoc::try_on_ignite("Classifier", init_classifier))
}
