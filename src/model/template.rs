//! Variables handed to the email templates. Rendering happens downstream.

use serde::Serialize;

use crate::{
    config::Config,
    model::{
        common::{EmailAddress, SecretKey},
        db::Voter,
    },
};

/// Variables for the `FRIEND_INVITATION` template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendInvitationVariables {
    pub subject: String,
    pub invitation_message: String,
    pub sender_name: String,
    pub sender_photo: String,
    pub sender_email_address: String,
    pub sender_description: String,
    pub sender_network_details: String,
    pub recipient_name: String,
    pub recipient_voter_email: String,
    pub see_all_friend_requests_url: String,
    pub confirm_friend_request_url: String,
    pub recipient_unsubscribe_url: String,
    pub email_open_url: String,
}

impl FriendInvitationVariables {
    pub fn new(
        config: &Config,
        sender: &Voter,
        sender_address: Option<&EmailAddress>,
        recipient: Option<&Voter>,
        recipient_address: &EmailAddress,
        message: &str,
        secret_key: &SecretKey,
    ) -> Self {
        let sender_name = sender.full_name();
        let subject = if sender_name.is_empty() {
            "Invitation to be friends on We Vote".to_string()
        } else {
            format!("{sender_name} wants to be friends on We Vote")
        };
        let web_app = config.web_app_root_url();
        let email_key = recipient_address.email_key(config);

        Self {
            subject,
            invitation_message: message.to_string(),
            sender_name,
            sender_photo: sender.photo_url.clone(),
            sender_email_address: sender_address.map(ToString::to_string).unwrap_or_default(),
            sender_description: String::new(),
            sender_network_details: String::new(),
            recipient_name: recipient.map(|voter| voter.full_name()).unwrap_or_default(),
            recipient_voter_email: recipient_address.to_string(),
            see_all_friend_requests_url: format!("{web_app}/requests"),
            confirm_friend_request_url: format!("{web_app}/requests/{secret_key}"),
            recipient_unsubscribe_url: format!("{web_app}/unsubscribe?email_key={email_key}"),
            email_open_url: format!(
                "{}/apis/v1/emailOpen?email_key={email_key}",
                config.server_root_url()
            ),
        }
    }
}

/// Variables for the `VERIFY_EMAIL_ADDRESS` template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyEmailVariables {
    pub subject: String,
    pub recipient_voter_email: String,
    pub verify_email_link: String,
    pub recipient_unsubscribe_url: String,
    pub email_open_url: String,
}

impl VerifyEmailVariables {
    pub fn new(config: &Config, address: &EmailAddress, secret_key: &SecretKey) -> Self {
        let web_app = config.web_app_root_url();
        let email_key = address.email_key(config);
        Self {
            subject: "Please verify your email".to_string(),
            recipient_voter_email: address.to_string(),
            verify_email_link: format!("{web_app}/verify_email/{secret_key}"),
            recipient_unsubscribe_url: format!("{web_app}/unsubscribe?email_key={email_key}"),
            email_open_url: format!(
                "{}/apis/v1/emailOpen?email_key={email_key}",
                config.server_root_url()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{db::VoterCore, mongodb::Id};

    use super::*;

    fn voter(core: VoterCore) -> Voter {
        Voter {
            id: Id::new(),
            voter: core,
        }
    }

    #[test]
    fn invitation_links_and_subject() {
        let config = Config::example();
        let sender = voter(VoterCore::example_verified());
        let recipient = EmailAddress::example("a@x.com");
        let key: SecretKey = "abcdef123456".parse().unwrap();
        let vars = FriendInvitationVariables::new(
            &config,
            &sender,
            sender.verified_email(),
            None,
            &recipient,
            "hi",
            &key,
        );

        assert_eq!(vars.subject, "Valerie Verified wants to be friends on We Vote");
        assert_eq!(vars.sender_email_address, "valerie@example.org");
        assert_eq!(vars.recipient_name, "");
        assert_eq!(
            vars.see_all_friend_requests_url,
            "https://wevote.example.org/requests"
        );
        assert_eq!(
            vars.confirm_friend_request_url,
            "https://wevote.example.org/requests/abcdef123456"
        );
        let email_key = recipient.email_key(&config);
        assert_eq!(
            vars.recipient_unsubscribe_url,
            format!("https://wevote.example.org/unsubscribe?email_key={email_key}")
        );
        assert_eq!(
            vars.email_open_url,
            format!("https://api.wevote.example.org/apis/v1/emailOpen?email_key={email_key}")
        );
    }

    #[test]
    fn anonymous_sender_gets_generic_subject() {
        let config = Config::example();
        let sender = voter(VoterCore::default());
        let recipient = voter(VoterCore::example_friend());
        let vars = FriendInvitationVariables::new(
            &config,
            &sender,
            None,
            Some(&recipient),
            &EmailAddress::example("frances@example.org"),
            "",
            &SecretKey::random(),
        );
        assert_eq!(vars.subject, "Invitation to be friends on We Vote");
        assert_eq!(vars.recipient_name, "Frances Friend");
        assert_eq!(vars.sender_email_address, "");
    }
}
