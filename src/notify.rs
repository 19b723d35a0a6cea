//! One-shot banners shown on the page rendered after a redirect.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::Error;

const NOTIFICATION_KEY: &str = "notification";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

// a newer notification replaces one that was never shown.
pub async fn notify(session: &Session, kind: NotificationKind, message: &str) -> Result<(), Error> {
    session
        .insert(
            NOTIFICATION_KEY,
            Notification {
                kind,
                message: message.to_string(),
            },
        )
        .await?;
    Ok(())
}

pub async fn take_notification(session: &Session) -> Result<Option<Notification>, Error> {
    Ok(session.remove::<Notification>(NOTIFICATION_KEY).await?)
}
