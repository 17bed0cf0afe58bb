use std::fmt::Display;
use std::str::FromStr;

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::Config;

pub type HmacSha256 = Hmac<Sha256>;

/// Longest address accepted, per RFC 5321.
pub const MAX_LENGTH: usize = 254;
const MAX_LOCAL_LENGTH: usize = 64;
const MAX_LABEL_LENGTH: usize = 63;
/// Non-alphanumeric characters allowed in the local part, besides interior dots.
const LOCAL_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// An email address, trimmed, lower-cased and checked for a plausible format.
///
/// Two addresses are equal iff their normalised forms are equal, so this is
/// the key used by the email directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress {
    normalized: String,
}

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// The opaque key identifying this address in unsubscribe and open-tracking links.
    ///
    /// Derived with an HMAC so the links do not leak the address itself.
    pub fn email_key(&self, config: &Config) -> String {
        let mut hmac = HmacSha256::new_from_slice(config.hmac_secret())
            .expect("HMAC can take key of any size");
        hmac.update(self.normalized.as_bytes());
        HEXLOWER.encode(&hmac.finalize().into_bytes())
    }
}

impl FromStr for EmailAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ParseError::Empty);
        }
        if normalized.len() > MAX_LENGTH {
            return Err(ParseError::TooLong(normalized.len()));
        }

        let (local, domain) = normalized.split_once('@').ok_or(ParseError::MissingAt)?;
        if domain.contains('@') {
            return Err(ParseError::MultipleAt);
        }
        check_local_part(local)?;
        check_domain(domain)?;

        Ok(Self { normalized })
    }
}

fn check_local_part(local: &str) -> Result<(), ParseError> {
    if local.is_empty()
        || local.len() > MAX_LOCAL_LENGTH
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
    {
        return Err(ParseError::InvalidLocalPart);
    }
    match local
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || LOCAL_SPECIALS.contains(*c)))
    {
        Some(c) => Err(ParseError::InvalidChar(c)),
        None => Ok(()),
    }
}

fn check_domain(domain: &str) -> Result<(), ParseError> {
    let labels = domain.split('.').collect::<Vec<_>>();
    if labels.len() < 2 {
        return Err(ParseError::InvalidDomain);
    }
    for label in &labels {
        if label.is_empty()
            || label.len() > MAX_LABEL_LENGTH
            || label.starts_with('-')
            || label.ends_with('-')
        {
            return Err(ParseError::InvalidDomain);
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(ParseError::InvalidChar(c));
        }
    }
    // Valid because there are at least two labels.
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ParseError::InvalidDomain);
    }
    Ok(())
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.normalized
    }
}

impl From<EmailAddress> for Bson {
    fn from(address: EmailAddress) -> Self {
        Bson::String(address.normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("email address is empty")]
    Empty,
    #[error("email address is {0} characters long, the maximum is {MAX_LENGTH}")]
    TooLong(usize),
    #[error("email address has no `@`")]
    MissingAt,
    #[error("email address has more than one `@`")]
    MultipleAt,
    #[error("email address has an invalid local part")]
    InvalidLocalPart,
    #[error("email address has an invalid domain")]
    InvalidDomain,
    #[error("email address contains invalid character '{0}'")]
    InvalidChar(char),
}

/// The addresses found in raw voter input, plus whatever could not be parsed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawEmailList {
    /// Valid addresses, de-duplicated, in the order first seen.
    pub addresses: Vec<EmailAddress>,
    /// Tokens that were not valid addresses.
    pub rejected: Vec<String>,
}

impl RawEmailList {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Break raw voter input into individual addresses.
///
/// Addresses may be separated by commas, semicolons or any whitespace, and may
/// be wrapped in angle brackets or quotes as mail clients tend to paste them.
pub fn split_raw_list(raw: &str) -> RawEmailList {
    let mut list = RawEmailList::default();
    let tokens = raw
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|token| token.trim_matches(|c| matches!(c, '<' | '>' | '"' | '\'')))
        .filter(|token| !token.is_empty());

    for token in tokens {
        match token.parse::<EmailAddress>() {
            Ok(address) => {
                if !list.addresses.contains(&address) {
                    list.addresses.push(address);
                }
            }
            Err(_) => list.rejected.push(token.to_string()),
        }
    }
    list
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl EmailAddress {
        pub fn example(s: &str) -> Self {
            s.parse().unwrap()
        }
    }
}
