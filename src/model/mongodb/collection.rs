use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    email::{EmailRecord, NewEmailRecord},
    friend::CurrentFriend,
    invitation::Invitation,
    scheduled_email::{NewScheduledEmail, ScheduledEmail},
    voter::{NewVoter, Voter, VoterDevice},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Voter collections
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

const VOTER_DEVICES: &str = "voter_devices";
impl MongoCollection for VoterDevice {
    const NAME: &'static str = VOTER_DEVICES;
}

// Email address collections
const EMAIL_ADDRESSES: &str = "email_addresses";
impl MongoCollection for EmailRecord {
    const NAME: &'static str = EMAIL_ADDRESSES;
}
impl MongoCollection for NewEmailRecord {
    const NAME: &'static str = EMAIL_ADDRESSES;
}

// Friend collections
const FRIEND_INVITATIONS: &str = "friend_invitations";
impl MongoCollection for Invitation {
    const NAME: &'static str = FRIEND_INVITATIONS;
}

const CURRENT_FRIENDS: &str = "current_friends";
impl MongoCollection for CurrentFriend {
    const NAME: &'static str = CURRENT_FRIENDS;
}

// Outbound email collections
const SCHEDULED_EMAILS: &str = "scheduled_emails";
impl MongoCollection for ScheduledEmail {
    const NAME: &'static str = SCHEDULED_EMAILS;
}
impl MongoCollection for NewScheduledEmail {
    const NAME: &'static str = SCHEDULED_EMAILS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Voter collections.
    let voter_email_index = IndexModel::builder().keys(doc! {"email": 1}).build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_email_index, None)
        .await?;
    let device_index = IndexModel::builder()
        .keys(doc! {"device_id": 1})
        .options(unique.clone())
        .build();
    Coll::<VoterDevice>::from_db(db)
        .create_index(device_index, None)
        .await?;

    // Email address collection: one record per normalised address.
    let address_index = IndexModel::builder()
        .keys(doc! {"address": 1})
        .options(unique.clone())
        .build();
    let email_key_index = IndexModel::builder()
        .keys(doc! {"secret_key": 1})
        .options(unique.clone())
        .build();
    Coll::<EmailRecord>::from_db(db)
        .create_indexes([address_index, email_key_index], None)
        .await?;

    // Invitation collection: one invitation per sender and recipient.
    let pair_index = IndexModel::builder()
        .keys(doc! {
            "sender_id": 1,
            "recipient.kind": 1,
            "recipient.voter_id": 1,
            "recipient.email_id": 1,
        })
        .options(unique.clone())
        .build();
    let invitation_key_index = IndexModel::builder()
        .keys(doc! {"secret_key": 1})
        .options(unique.clone())
        .build();
    Coll::<Invitation>::from_db(db)
        .create_indexes([pair_index, invitation_key_index], None)
        .await?;

    // Friendship collection.
    let friendship_index = IndexModel::builder()
        .keys(doc! {"voter_one_id": 1, "voter_two_id": 1})
        .options(unique)
        .build();
    Coll::<CurrentFriend>::from_db(db)
        .create_index(friendship_index, None)
        .await?;

    Ok(())
}
