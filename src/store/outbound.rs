use aws_sdk_sns::Client as SnsClient;
use log::{debug, error};
use mongodb::{bson::doc, Database};
use rocket::serde::json::serde_json;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    model::{
        db::{EmailTemplate, NewScheduledEmail, ScheduledEmail, SendStatus},
        mongodb::Coll,
    },
    store::NotificationDispatcher,
};

/// ARN of the SNS topic the mail sender subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTopic(String);

impl EmailTopic {
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn arn(&self) -> &str {
        &self.0
    }
}


/// What gets published for the mail sender to render and deliver.
#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    scheduled_email_id: String,
    template: EmailTemplate,
    sender_address: Option<&'a str>,
    recipient_address: &'a str,
    /// JSON object of template variables.
    variables: &'a str,
}

/// Records outbound email in the `scheduled_emails` collection and publishes
/// it to SNS.
pub struct SnsMailer {
    scheduled: Coll<ScheduledEmail>,
    new_scheduled: Coll<NewScheduledEmail>,
    sns: SnsClient,
    topic: EmailTopic,
}

impl SnsMailer {
    pub fn new(db: &Database, sns: SnsClient, topic: EmailTopic) -> Self {
        Self {
            scheduled: Coll::from_db(db),
            new_scheduled: Coll::from_db(db),
            sns,
            topic,
        }
    }

    async fn publish(&self, email: &ScheduledEmail) -> Result<()> {
        let message = OutboundMessage {
            scheduled_email_id: email.id.to_string(),
            template: email.template,
            sender_address: email.sender_address.as_ref().map(|a| a.as_str()),
            recipient_address: email.recipient_address.as_str(),
            variables: &email.variables,
        };
        self.sns
            .publish()
            .topic_arn(self.topic.arn())
            .subject(email.template.as_str())
            .message(serde_json::to_string(&message)?)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        Ok(())
    }
}

#[rocket::async_trait]
impl NotificationDispatcher for SnsMailer {
    async fn schedule_templated_email(&self, email: NewScheduledEmail) -> Result<ScheduledEmail> {
        let result = self.new_scheduled.insert_one(&email, None).await?;
        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Internal("inserted scheduled email has no ID".to_string()))?;
        debug!(
            "Scheduled {} email {id} to {}",
            email.template.as_str(),
            email.recipient_address
        );
        Ok(ScheduledEmail {
            id: id.into(),
            email,
        })
    }

    async fn send_scheduled(&self, email: &ScheduledEmail) -> Result<SendStatus> {
        let status = match self.publish(email).await {
            Ok(()) => SendStatus::Sent,
            Err(e) => {
                error!("Failed to publish scheduled email {}: {e}", email.id);
                SendStatus::Failed
            }
        };
        self.scheduled
            .update_one(
                email.id.as_doc(),
                doc! { "$set": { "send_status": status } },
                None,
            )
            .await?;
        Ok(status)
    }
}
