use chat_server::channels::ChatChannel;
use chat_server::message_models::ChatBroadcast;
use chrono::{DateTime, Local};

/// A received chat line as kept in the local history. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    channel: ChatChannel,
    text: String,
    sender_display_name: String,
    timestamp: DateTime<Local>,
}

impl ChatMessage {
    pub fn new(broadcast: ChatBroadcast, timestamp: DateTime<Local>) -> Self {
        let sender_display_name = sender_name(&broadcast.text).to_owned();
        ChatMessage {
            channel: broadcast.channel,
            text: broadcast.text,
            sender_display_name,
            timestamp,
        }
    }

    pub fn received_now(broadcast: ChatBroadcast) -> Self {
        ChatMessage::new(broadcast, Local::now())
    }

    pub fn channel(&self) -> ChatChannel {
        self.channel
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text before the first ':' of the message, without a `From ` prefix.
    /// Empty when the line has no speaker.
    pub fn sender_display_name(&self) -> &str {
        &self.sender_display_name
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// `[HH:MM]` when `show_timestamp`, then the channel prefix, then the text.
    pub fn display_line(&self, show_timestamp: bool) -> String {
        let mut line = String::new();
        if show_timestamp {
            line.push_str(&self.timestamp.format("[%H:%M]").to_string());
        }
        line.push_str(&channel_prefix(self.channel));
        line.push_str(&self.text);
        line
    }
}

fn channel_prefix(channel: ChatChannel) -> String {
    if channel == ChatChannel::WHISPER {
        String::new()
    } else if channel == ChatChannel::SYSTEM {
        "[SYSTEM] ".to_owned()
    } else {
        format!("[{channel}] ")
    }
}

/// `"Carol: hi"` and `"From Carol: hi"` both give `"Carol"`.
pub fn sender_name(text: &str) -> &str {
    let Some((speaker, _)) = text.split_once(':') else {
        return "";
    };
    let speaker = speaker.trim();
    speaker.strip_prefix("From ").unwrap_or(speaker).trim()
}
