use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    friend::FriendService,
    model::{
        api::{
            AcceptInvitationResponse, FriendListResponse, InvitationEmailRequest,
            InvitationSendResponse, InviteResponseRequest, InviteResponseResult,
        },
        common::{secret::ParseError, SecretKey},
    },
};

pub fn routes() -> Vec<Route> {
    routes![send_invitations, respond, accept_invitation, friend_list]
}

#[post("/friends/invitations/email", data = "<request>", format = "json")]
async fn send_invitations(
    service: FriendService<'_>,
    request: Json<InvitationEmailRequest>,
) -> Json<InvitationSendResponse> {
    Json(service.send_invitations(&request).await)
}

#[post("/friends/invitations/response", data = "<request>", format = "json")]
async fn respond(
    service: FriendService<'_>,
    request: Json<InviteResponseRequest>,
) -> Json<InviteResponseResult> {
    Json(service.respond(&request).await)
}

#[post("/friends/invitations/accept/<secret_key>?<voter_device_id>")]
async fn accept_invitation(
    service: FriendService<'_>,
    secret_key: std::result::Result<SecretKey, ParseError>,
    voter_device_id: Option<String>,
) -> Result<Json<AcceptInvitationResponse>> {
    let secret_key = secret_key.map_err(|e| Error::BadRequest(e.to_string()))?;
    let voter_device_id = voter_device_id.unwrap_or_default();
    Ok(Json(
        service
            .accept_by_secret_key(&voter_device_id, &secret_key)
            .await,
    ))
}

#[get("/friends?<voter_device_id>&<kind_of_list>&<state_code>")]
async fn friend_list(
    service: FriendService<'_>,
    voter_device_id: Option<String>,
    kind_of_list: Option<String>,
    state_code: Option<String>,
) -> Json<FriendListResponse> {
    Json(
        service
            .friend_list(
                voter_device_id.as_deref().unwrap_or_default(),
                kind_of_list.as_deref(),
                state_code.as_deref(),
            )
            .await,
    )
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use mongodb::Database;

    use crate::model::{
        db::{
            voter::examples::{FRIEND_DEVICE, VERIFIED_DEVICE},
            CurrentFriend, InvitationStatus, NewVoter, VoterCore, VoterDevice,
        },
        mongodb::{Coll, Id},
    };
    use crate::store::memory::MemoryStore;

    use super::*;

    #[backend_test(voters)]
    async fn send_over_http(client: Client, store: MemoryStore) {
        let response = client
            .post(uri!(send_invitations))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_device_id": VERIFIED_DEVICE,
                    "email_addresses_raw": "a@x.com, b@x.com, nonsense",
                    "invitation_message": "hi",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["voter_device_id"], VERIFIED_DEVICE);
        assert_eq!(body["rejected_email_addresses"], json!(["nonsense"]));
        assert_eq!(body["recipients"][1]["recipient_voter_email"], "b@x.com");
        assert_eq!(body["recipients"][1]["email_sent"], true);
        assert_eq!(body["status"][0], json!({"code": "EMAIL_ADDRESS_CREATED"}));
        assert_eq!(store.invitations().len(), 2);
    }

    #[backend_test]
    async fn failures_are_still_ok_responses(client: Client) {
        let response = client
            .post(uri!(send_invitations))
            .header(ContentType::JSON)
            .body(json!({ "voter_device_id": "" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], json!([{"code": "VALID_VOTER_DEVICE_ID_MISSING"}]));
    }

    #[backend_test(voters)]
    async fn respond_over_http(client: Client, store: MemoryStore) {
        let me = store.voter_by_device(VERIFIED_DEVICE);
        let friend = store.voter_by_device(FRIEND_DEVICE);
        store.make_friends(me.id, friend.id);

        let response = client
            .post(uri!(respond))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_device_id": VERIFIED_DEVICE,
                    "kind_of_invite_response": "UNFRIEND_CURRENT_FRIEND",
                    "other_voter_we_vote_id": friend.id.to_string(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], true);
        assert!(store.friendships().is_empty());
    }

    #[backend_test(voters)]
    async fn unknown_response_kind_is_rejected(client: Client) {
        let response = client
            .post(uri!(respond))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_device_id": VERIFIED_DEVICE,
                    "kind_of_invite_response": "POKE",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(voters)]
    async fn accept_link_over_http(client: Client, store: MemoryStore) {
        let sender = store.voter_by_device(VERIFIED_DEVICE);
        let record = store.add_email_record("frances@example.org", None, false);
        let invitation = crate::store::InvitationStore::upsert_email_invitation(
            &store, sender.id, &record, "hi", true,
        )
        .await
        .unwrap()
        .invitation;

        let response = client
            .post(format!(
                "/friends/invitations/accept/{}?voter_device_id={FRIEND_DEVICE}",
                invitation.secret_key
            ))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["friend_voter_we_vote_id"], sender.id.to_string());
        assert_eq!(store.invitations()[0].status, InvitationStatus::Accepted);

        let malformed = client
            .post(format!(
                "/friends/invitations/accept/short?voter_device_id={FRIEND_DEVICE}"
            ))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, malformed.status());
    }

    #[backend_test(voters)]
    async fn list_over_http(client: Client, store: MemoryStore) {
        let me = store.voter_by_device(VERIFIED_DEVICE);
        let friend = store.voter_by_device(FRIEND_DEVICE);
        store.make_friends(me.id, friend.id);

        let response = client
            .get(format!(
                "/friends?voter_device_id={VERIFIED_DEVICE}&state_code=NY"
            ))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["kind_of_list"], "CURRENT_FRIENDS");
        assert_eq!(body["state_code"], "NY");
        assert_eq!(body["friend_list_found"], true);
        assert_eq!(body["friend_list"][0]["voter_we_vote_id"], friend.id.to_string());

        let response = client
            .get(format!(
                "/friends?voter_device_id={VERIFIED_DEVICE}&kind_of_list=SUGGESTED_FRIENDS"
            ))
            .dispatch()
            .await;
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(
            body["status"],
            json!([{"code": "KIND_OF_LIST_NOT_IMPLEMENTED_YET", "detail": "SUGGESTED_FRIENDS"}])
        );
    }

    #[backend_test(mongo)]
    async fn list_from_database(client: Client, db: Database) {
        let mut ids = Vec::new();
        for (voter, device) in [
            (VoterCore::example_verified(), VERIFIED_DEVICE),
            (VoterCore::example_friend(), FRIEND_DEVICE),
        ] {
            let id: Id = Coll::<NewVoter>::from_db(&db)
                .insert_one(voter, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
                .into();
            let device = VoterDevice {
                device_id: device.to_string(),
                voter_id: id,
            };
            Coll::<VoterDevice>::from_db(&db)
                .insert_one(device, None)
                .await
                .unwrap();
            ids.push(id);
        }
        Coll::<CurrentFriend>::from_db(&db)
            .insert_one(CurrentFriend::new(ids[1], ids[0]), None)
            .await
            .unwrap();

        let response = client
            .get(format!("/friends?voter_device_id={VERIFIED_DEVICE}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["friend_list"][0]["voter_we_vote_id"], ids[1].to_string());
        assert_eq!(body["friend_list"][0]["voter_display_name"], "Frances Friend");
    }
}
