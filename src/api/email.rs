use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    friend::FriendService,
    model::{
        api::EmailVerifyResponse,
        common::{secret::ParseError, SecretKey},
    },
};

pub fn routes() -> Vec<Route> {
    routes![verify_email]
}

#[post("/emails/verify/<secret_key>")]
async fn verify_email(
    service: FriendService<'_>,
    secret_key: std::result::Result<SecretKey, ParseError>,
) -> Result<Json<EmailVerifyResponse>> {
    let secret_key = secret_key.map_err(|e| Error::BadRequest(e.to_string()))?;
    Ok(Json(service.verify_email(&secret_key).await))
}
