use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    model::mongodb::ensure_indexes_exist,
    store::{outbound::EmailTopic, Backend},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    web_app_root_url: String,
    server_root_url: String,
    // secrets
    hmac_secret: String,
}

impl Config {
    /// Root of the voter-facing web app, without a trailing slash.
    /// Links in emails point here.
    pub fn web_app_root_url(&self) -> &str {
        self.web_app_root_url.trim_end_matches('/')
    }

    /// Root of this API server, without a trailing slash.
    /// Used for the email open-tracking link.
    pub fn server_root_url(&self) -> &str {
        self.server_root_url.trim_end_matches('/')
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the indexes exist, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "friends".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Connect to the configured database under a fresh test name, with the
/// indexes in place. The caller drops it when done.
#[cfg(test)]
pub async fn test_database() -> Database {
    let config = rocket::Config::figment()
        .extract::<DbConfig>()
        .expect("db_uri must be configured to run database tests");
    let client = MongoClient::with_uri_str(config.db_uri).await.unwrap();
    let db = client.database(&get_database_name());
    ensure_indexes_exist(&db).await.unwrap();
    db
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    email_topic_arn: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places an SNS `Client` and the
/// outbound [`EmailTopic`] into managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS SNS",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let client = SnsClient::new(&aws_config);
        info!("Loaded Amazon SNS config");

        rocket = rocket
            .manage(client)
            .manage(EmailTopic::new(config.email_topic_arn));
        Ok(rocket)
    }
}

/// A fairing that builds the production [`Backend`] from the managed
/// database and SNS client. Must be attached after [`DatabaseFairing`] and
/// [`AwsFairing`].
pub struct BackendFairing;

#[rocket::async_trait]
impl Fairing for BackendFairing {
    fn info(&self) -> Info {
        Info {
            name: "Backend",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let parts = (
            rocket.state::<Database>().cloned(),
            rocket.state::<SnsClient>().cloned(),
            rocket.state::<EmailTopic>().cloned(),
        );
        let backend = match parts {
            (Some(db), Some(sns), Some(topic)) => Backend::mongo(&db, sns, topic),
            _ => {
                error!("Backend needs the database and SNS fairings to be attached first");
                return Err(rocket);
            }
        };
        info!("Assembled MongoDB and SNS backend");

        Ok(rocket.manage(backend))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_urls_have_no_trailing_slash() {
        let config = Config::example();
        assert_eq!(config.web_app_root_url(), "https://wevote.example.org");
        assert_eq!(config.server_root_url(), "https://api.wevote.example.org");
    }
}
