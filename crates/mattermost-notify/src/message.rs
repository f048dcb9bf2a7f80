//! Inbound notification requests and outbound post payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::error;

/// A notification request as handed over by the host platform.
///
/// ```
/// use mattermost_notify::NotificationRequest;
///
/// let request: NotificationRequest = serde_json::from_str(
///     r##"{"message": "Door opened", "title": "Alarm", "target": ["#general", "alerts"]}"##,
/// ).unwrap();
/// assert_eq!(request.targets("town-square"), vec!["general", "alerts"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Message body.
    pub message: String,
    /// Optional title, rendered as a bold heading line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// One channel name or a list of names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// Free-form extras (`attachments` or `file`), validated leniently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Target channel(s) of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    One(String),
    Many(Vec<String>),
}

impl NotificationRequest {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = Some(Target::Many(targets.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sanitized target names, falling back to `default_channel`.
    #[must_use]
    pub fn targets(&self, default_channel: &str) -> Vec<String> {
        match &self.target {
            Some(Target::One(name)) => sanitize_channel_names([name.as_str()]),
            Some(Target::Many(names)) => sanitize_channel_names(names.iter().map(String::as_str)),
            None => sanitize_channel_names([default_channel]),
        }
    }

    /// Message body with the title rendered as a heading.
    #[must_use]
    pub fn body(&self) -> String {
        render_message(self.title.as_deref(), &self.message)
    }

    /// Parse `data`, logging and discarding it if it has an unknown shape.
    #[must_use]
    pub fn message_data(&self) -> MessageData {
        match MessageData::parse(self.data.as_ref()) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Invalid message data, sending without extras");
                MessageData::default()
            }
        }
    }
}

/// Strip leading `#` symbols and whitespace, dropping empty names.
pub fn sanitize_channel_names<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| name.trim().trim_start_matches('#').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render the post body: `**title**`, a blank line, then the message.
#[must_use]
pub fn render_message(title: Option<&str>, message: &str) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(title) => format!("**{title}**\n\n{message}"),
        None => message.to_string(),
    }
}

// =============================================================================
// Request data
// =============================================================================

/// Validated extras of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    /// Text message with optional Slack-style attachments
    Text { attachments: Vec<MessageAttachment> },
    /// Message carrying one uploaded file
    File(FileSource),
}

impl Default for MessageData {
    fn default() -> Self {
        Self::Text {
            attachments: vec![],
        }
    }
}

/// Where an uploaded file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Path(PathBuf),
    Url {
        url: String,
        credentials: Option<BasicAuth>,
    },
}

/// HTTP basic auth for fetching a remote file.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawData {
    File(RawFileData),
    Text(RawTextData),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileData {
    file: RawFile,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTextData {
    #[serde(default)]
    attachments: Option<Vec<MessageAttachment>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFile {
    Path(RawLocalFile),
    Url(RawRemoteFile),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLocalFile {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRemoteFile {
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl MessageData {
    /// Validate the raw `data` value of a request.
    ///
    /// # Errors
    /// Returns a description of the problem if `data` matches neither the
    /// file shape nor the text shape.
    pub fn parse(data: Option<&Value>) -> Result<Self, String> {
        let Some(value) = data.filter(|v| !v.is_null()) else {
            return Ok(Self::default());
        };

        let raw: RawData = serde_json::from_value(value.clone()).map_err(|_| {
            "expected {\"file\": {\"path\"} | {\"url\"}} or {\"attachments\": [...]}".to_string()
        })?;

        match raw {
            RawData::Text(text) => Ok(Self::Text {
                attachments: text.attachments.unwrap_or_default(),
            }),
            RawData::File(RawFileData {
                file: RawFile::Path(local),
            }) => Ok(Self::File(FileSource::Path(local.path))),
            RawData::File(RawFileData {
                file: RawFile::Url(remote),
            }) => {
                let credentials = match (remote.username, remote.password) {
                    (Some(username), Some(password)) => Some(BasicAuth { username, password }),
                    (None, None) => None,
                    _ => {
                        return Err("file username and password must be given together".into())
                    }
                };
                Ok(Self::File(FileSource::Url {
                    url: remote.url,
                    credentials,
                }))
            }
        }
    }
}

// =============================================================================
// Mattermost API types
// =============================================================================

/// Slack-compatible message attachment rendered by Mattermost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_icon: Option<String>,
}

/// Author shown on attachments the bridge adds or completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub icon: String,
}

impl MessageAttachment {
    /// Attachment carrying only the author line.
    #[must_use]
    pub fn author_only(author: &Author) -> Self {
        Self {
            author_name: Some(author.name.clone()),
            author_icon: Some(author.icon.clone()),
            ..Self::default()
        }
    }

    /// Fill in author name and icon where the caller left them out.
    #[must_use]
    pub fn with_author_defaults(mut self, author: &Author) -> Self {
        self.author_name.get_or_insert_with(|| author.name.clone());
        self.author_icon.get_or_insert_with(|| author.icon.clone());
        self
    }
}

/// Body of `POST /api/v4/posts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostPayload {
    pub channel_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
    pub props: PostProps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostProps {
    pub from_webhook: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MessageAttachment>,
}

impl PostPayload {
    /// Text post; caller attachments get the default author.
    #[must_use]
    pub fn text(
        channel_id: &str,
        message: &str,
        attachments: &[MessageAttachment],
        author: &Author,
    ) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message: message.to_string(),
            file_ids: vec![],
            props: PostProps {
                from_webhook: "true",
                attachments: attachments
                    .iter()
                    .cloned()
                    .map(|a| a.with_author_defaults(author))
                    .collect(),
            },
        }
    }

    /// Post referencing one uploaded file.
    #[must_use]
    pub fn file(channel_id: &str, message: &str, file_id: String, author: &Author) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message: message.to_string(),
            file_ids: vec![file_id],
            props: PostProps {
                from_webhook: "true",
                attachments: vec![MessageAttachment::author_only(author)],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn author() -> Author {
        Author {
            name: "Home Assistant".to_string(),
            icon: "https://example.com/icon.png".to_string(),
        }
    }

    #[test]
    fn test_render_message() {
        assert_eq!(render_message(None, "Hello"), "Hello");
        assert_eq!(render_message(Some(""), "Hello"), "Hello");
        assert_eq!(
            render_message(Some("Alarm"), "Door opened"),
            "**Alarm**\n\nDoor opened"
        );
    }

    #[test]
    fn test_targets_default_and_sanitize() {
        let request = NotificationRequest::new("hi");
        assert_eq!(request.targets("#town-square"), vec!["town-square"]);

        let request: NotificationRequest =
            serde_json::from_value(json!({"message": "hi", "target": "##alerts "})).unwrap();
        assert_eq!(request.targets("town-square"), vec!["alerts"]);

        let request = NotificationRequest::new("hi").with_targets(["general", "", "#"]);
        assert_eq!(request.targets("town-square"), vec!["general"]);
    }

    #[test]
    fn test_parse_data_shapes() {
        assert_eq!(MessageData::parse(None).unwrap(), MessageData::default());
        assert_eq!(
            MessageData::parse(Some(&json!({}))).unwrap(),
            MessageData::default()
        );

        let data = MessageData::parse(Some(&json!({"file": {"path": "/tmp/a.png"}}))).unwrap();
        assert_eq!(data, MessageData::File(FileSource::Path("/tmp/a.png".into())));

        let data = MessageData::parse(Some(&json!({
            "file": {"url": "https://cam.local/snap.jpg", "username": "u", "password": "p"}
        })))
        .unwrap();
        assert!(matches!(
            data,
            MessageData::File(FileSource::Url { credentials: Some(_), .. })
        ));

        let data = MessageData::parse(Some(&json!({
            "attachments": [{"title": "Status", "color": "#ff0000"}]
        })))
        .unwrap();
        let MessageData::Text { attachments } = data else {
            panic!("expected text data");
        };
        assert_eq!(attachments[0].title.as_deref(), Some("Status"));
    }

    #[test]
    fn test_parse_data_rejects_unknown_shapes() {
        assert!(MessageData::parse(Some(&json!({"bogus": 1}))).is_err());
        assert!(MessageData::parse(Some(&json!({"file": {"path": "/a", "url": "x"}}))).is_err());
        assert!(MessageData::parse(Some(&json!({"file": {"url": "x", "username": "u"}}))).is_err());
        assert!(MessageData::parse(Some(&json!({"attachments": [{"bogus": true}]}))).is_err());
    }

    #[test]
    fn test_invalid_data_falls_back_to_plain_text() {
        let request = NotificationRequest::new("hi").with_data(json!({"bogus": 1}));
        assert_eq!(request.message_data(), MessageData::default());
    }

    #[test]
    fn test_text_payload_fills_author() {
        let attachment = MessageAttachment {
            title: Some("Status".to_string()),
            author_name: Some("Sensor".to_string()),
            ..MessageAttachment::default()
        };
        let payload = PostPayload::text("chan1", "Hello", &[attachment], &author());
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["message"], "Hello");
        assert_eq!(value["props"]["from_webhook"], "true");
        assert_eq!(value["props"]["attachments"][0]["author_name"], "Sensor");
        assert_eq!(
            value["props"]["attachments"][0]["author_icon"],
            "https://example.com/icon.png"
        );
        assert!(value.get("file_ids").is_none());
    }

    #[test]
    fn test_plain_payload_has_exact_message() {
        let payload = PostPayload::text("chan1", &render_message(None, "Hello"), &[], &author());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["message"], json!("Hello"));
        assert_eq!(value["channel_id"], "chan1");
        assert!(value["props"].get("attachments").is_none());
    }

    #[test]
    fn test_file_payload() {
        let payload = PostPayload::file("chan1", "**T**\n\nbody", "file9".to_string(), &author());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["file_ids"], json!(["file9"]));
        assert_eq!(value["message"], "**T**\n\nbody");
        assert_eq!(value["props"]["attachments"][0]["author_name"], "Home Assistant");
    }
}
