//! Notification models

use serde::Deserialize;

use super::PayloadError;

/// An out-of-band alert pushed to the user's notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(super::id_string(&value).unwrap_or_default())
}

impl Notification {
    pub fn parse(body: &str) -> Result<Self, PayloadError> {
        let n: Notification = serde_json::from_str(body)?;
        if n.title.trim().is_empty() && n.message.trim().is_empty() {
            return Err(PayloadError::EmptyNotification);
        }
        Ok(n)
    }

    /// Toast text: the message, falling back to the title.
    pub fn toast_text(&self) -> &str {
        if self.message.trim().is_empty() {
            &self.title
        } else {
            &self.message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification() {
        let n = Notification::parse(
            r#"{"type":"REQUEST_ACCEPTED","title":"Accepted","message":"Ann accepted your request","userId":"u1","timestamp":1704451860000}"#,
        )
        .unwrap();
        assert_eq!(n.kind, "REQUEST_ACCEPTED");
        assert_eq!(n.user_id, "u1");
        assert_eq!(n.timestamp, Some(1_704_451_860_000));
        assert_eq!(n.toast_text(), "Ann accepted your request");
    }

    #[test]
    fn test_toast_falls_back_to_title() {
        let n = Notification::parse(r#"{"title":"New request","userId":7}"#).unwrap();
        assert_eq!(n.user_id, "7");
        assert_eq!(n.toast_text(), "New request");
    }

    #[test]
    fn test_malformed_notifications() {
        assert!(matches!(
            Notification::parse(r#"{"type":"PING"}"#),
            Err(PayloadError::EmptyNotification)
        ));
        assert!(matches!(
            Notification::parse("<html>"),
            Err(PayloadError::Json(_))
        ));
    }
}
