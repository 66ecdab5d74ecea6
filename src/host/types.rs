use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Post type used for secret placeholders so compatible clients can render
/// them with a custom component.
pub const SECRET_POST_TYPE: &str = "custom_secret";

/// Props key carrying the owning secret id on a placeholder post.
pub const SECRET_ID_PROP: &str = "secret_id";

/// Props key carrying Slack-style attachments.
pub const ATTACHMENTS_PROP: &str = "attachments";

/// A chat post as exchanged with the host platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub post_type: String,
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl Post {
    /// String-valued prop, if present.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    pub fn set_prop(&mut self, key: &str, value: Value) {
        self.props.insert(key.to_string(), value);
    }

    /// Replace the attachments prop.
    pub fn set_attachments(&mut self, attachments: Vec<SlackAttachment>) {
        self.props.insert(
            ATTACHMENTS_PROP.to_string(),
            serde_json::to_value(attachments).unwrap_or(Value::Null),
        );
    }

    /// Parse the attachments prop. Malformed or absent props yield an empty
    /// list rather than an error.
    pub fn attachments(&self) -> Vec<SlackAttachment> {
        self.props
            .get(ATTACHMENTS_PROP)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Slack-style message attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackAttachment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SlackAttachmentField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PostAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackAttachmentField {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

/// Interactive button attached to a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostAction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub integration: PostActionIntegration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostActionIntegration {
    #[serde(default)]
    pub url: String,
}

/// Response payload for an attachment button press. The host replaces the
/// pressed post with `update` for the acting viewer and shows
/// `ephemeral_text` to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostActionIntegrationResponse {
    #[serde(default)]
    pub update: Post,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ephemeral_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Bot account registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
}

impl Default for ChannelType {
    fn default() -> Self {
        Self::Open
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub channel_type: ChannelType,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    #[serde(default)]
    pub member_count: i64,
}

/// Reply to a slash command invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub text: String,
}

impl CommandResponse {
    /// Reply visible only to the invoking user.
    pub fn ephemeral<S: Into<String>>(text: S) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}

/// Slash command registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_complete: bool,
    #[serde(default)]
    pub auto_complete_desc: String,
    #[serde(default)]
    pub auto_complete_hint: String,
}
