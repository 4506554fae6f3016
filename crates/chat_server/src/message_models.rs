use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::channels::ChatChannel;

/// Chat text on one channel. Moderation commands travel inside it too,
/// as `"/command arg1 arg2"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Channel")]
    pub channel: ChatChannel,
}
impl ChatBroadcast {
    pub fn new(text: impl Into<String>, channel: ChatChannel) -> Self {
        ChatBroadcast {
            text: text.into(),
            channel,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        ChatBroadcast::new(text, ChatChannel::SYSTEM)
    }
}
impl Display for ChatBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.channel, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperBroadcast {
    /// Display name of the receiver.
    #[serde(rename = "PlayerName")]
    pub player_name: String,
    #[serde(rename = "Text")]
    pub text: String,
}
impl Display for WhisperBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[To {}] {}", self.player_name, self.text)
    }
}

/// One line of JSON sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEnvelope {
    Login { identity: String, username: String },
    Chat(ChatBroadcast),
    Whisper(WhisperBroadcast),
    EnterScene { scene: String },
    LeaveScene { scene: String },
}

/// One line of JSON sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    Chat(ChatBroadcast),
    LoginAccepted,
    LoginRejected { reason: String },
}
impl ServerEnvelope {
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMode {
    /// Drop the connection without flushing queued messages.
    Immediate,
    /// Flush queued messages (e.g. a ban notice) first.
    Graceful,
}
