use std::fmt::Display;
use std::str::FromStr;

use mongodb::bson::Bson;
use rand::{distributions::Alphanumeric, Rng};
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LENGTH: usize = 12;

/// An opaque random token embedded in confirmation links.
///
/// Identifies an invitation or an email record when the link is followed; it
/// is not a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretKey {
    key: String,
}

impl SecretKey {
    /// Generate a random key.
    pub fn random() -> Self {
        let key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(LENGTH)
            .map(char::from)
            .collect();
        Self { key }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl Display for SecretKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.key)
    }
}

impl FromStr for SecretKey {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        if let Some(c) = string.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(Self::Err::InvalidChar(c));
        }
        Ok(Self {
            key: string.to_string(),
        })
    }
}

impl TryFrom<String> for SecretKey {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SecretKey> for String {
    fn from(key: SecretKey) -> Self {
        key.key
    }
}

impl From<SecretKey> for Bson {
    fn from(key: SecretKey) -> Self {
        Bson::String(key.key)
    }
}

impl<'a> FromParam<'a> for SecretKey {
    type Error = ParseError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for SecretKey {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(&self.key)
    }
}

impl_from_uri_param_identity!([Path] SecretKey);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("secret key must contain exactly {LENGTH} characters, got {0}")]
    InvalidLength(usize),
    #[error("secret key must contain only letters and digits, found '{0}'")]
    InvalidChar(char),
}
