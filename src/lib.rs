#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::{
    config::{AwsFairing, BackendFairing, ConfigFairing, DatabaseFairing},
    logging::LoggerFairing,
};

pub mod api;
pub mod config;
pub mod error;
pub mod friend;
pub mod logging;
pub mod model;
pub mod store;

pub use config::Config;

/// Build the production server: config from the figment, MongoDB and SNS
/// behind the friend service.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AwsFairing)
        .attach(BackendFairing)
        .attach(LoggerFairing)
}

/// Build a server around an existing backend, skipping the database and AWS
/// fairings.
pub fn rocket_for_backend(config: Config, backend: store::Backend) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .manage(config)
        .manage(backend)
        .attach(LoggerFairing)
}
