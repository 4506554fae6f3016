use std::fmt::Display;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Chat channels. Every value is a distinct power of two so a set of channels
    /// (a tab filter, a mute record) is a plain bitwise OR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChatChannel: u32 {
        /// Connections sharing a scene with the sender.
        const LOCAL = 1;
        /// Every authenticated connection.
        const GLOBAL = 1 << 1;
        const PARTY = 1 << 2;
        const GUILD = 1 << 3;
        const FRIENDS = 1 << 4;
        /// Point-to-point only.
        const WHISPER = 1 << 5;
        /// Notices produced by the server.
        const SYSTEM = 1 << 6;
    }
}

const CHANNEL_NAMES: [(ChatChannel, &str); 7] = [
    (ChatChannel::LOCAL, "Local"),
    (ChatChannel::GLOBAL, "Global"),
    (ChatChannel::PARTY, "Party"),
    (ChatChannel::GUILD, "Guild"),
    (ChatChannel::FRIENDS, "Friends"),
    (ChatChannel::WHISPER, "Whisper"),
    (ChatChannel::SYSTEM, "System"),
];

impl ChatChannel {
    /// Exactly one bit set, and that bit is a declared channel.
    pub fn is_single(self) -> bool {
        let bits = self.bits();
        bits != 0 && bits & (bits - 1) == 0 && ChatChannel::from_bits(bits).is_some()
    }

    /// Name of a single declared channel.
    pub fn name(self) -> Option<&'static str> {
        CHANNEL_NAMES
            .iter()
            .find(|(channel, _)| *channel == self)
            .map(|(_, name)| *name)
    }

    /// Case-insensitive lookup of a single channel by name.
    pub fn by_name(name: &str) -> Option<ChatChannel> {
        CHANNEL_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(channel, _)| *channel)
    }

    /// Channel argument of `/mute` and `/unmute`: a channel name, or
    /// `all`/`everything` for every channel.
    pub fn from_command_arg(arg: &str) -> Option<ChatChannel> {
        if arg.eq_ignore_ascii_case("all") || arg.eq_ignore_ascii_case("everything") {
            Some(ChatChannel::all())
        } else {
            ChatChannel::by_name(arg)
        }
    }
}

impl Display for ChatChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == ChatChannel::all() {
            return write!(f, "all channels");
        }
        if self.is_empty() {
            return write!(f, "no channels");
        }
        let names = CHANNEL_NAMES
            .iter()
            .filter(|(channel, _)| self.contains(*channel))
            .map(|(_, name)| *name)
            .collect::<Vec<&str>>();
        write!(f, "{}", names.join(", "))
    }
}

// On the wire a channel is its integer bitmask. Unknown bits are kept so the
// router can see and reject them.
impl Serialize for ChatChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ChatChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(ChatChannel::from_bits_retain(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_channels_are_single_bits() {
        for (channel, _) in CHANNEL_NAMES {
            assert!(channel.is_single(), "{channel:?}");
        }
        assert!(!ChatChannel::empty().is_single());
        assert!(!ChatChannel::from_bits_retain(1 << 9).is_single(), "undeclared bit");
    }

    #[test]
    fn combined_channels_have_more_bits_and_are_rejected() {
        for (a, _) in CHANNEL_NAMES {
            for (b, _) in CHANNEL_NAMES {
                if a == b {
                    continue;
                }
                let both = a | b;
                assert!(both.bits().count_ones() > a.bits().count_ones());
                assert!(both.bits().count_ones() > b.bits().count_ones());
                assert!(!both.is_single());
            }
        }
    }

    #[test]
    fn names_round_trip_case_insensitively() {
        assert_eq!(ChatChannel::by_name("global"), Some(ChatChannel::GLOBAL));
        assert_eq!(ChatChannel::by_name("WHISPER"), Some(ChatChannel::WHISPER));
        assert_eq!(ChatChannel::by_name("trade"), None);
        assert_eq!(ChatChannel::GUILD.name(), Some("Guild"));
        assert_eq!((ChatChannel::GUILD | ChatChannel::LOCAL).name(), None);
    }

    #[test]
    fn command_arg_accepts_all_sentinel() {
        assert_eq!(
            ChatChannel::from_command_arg("everything"),
            Some(ChatChannel::all())
        );
        assert_eq!(ChatChannel::from_command_arg("All"), Some(ChatChannel::all()));
        assert_eq!(
            ChatChannel::from_command_arg("party"),
            Some(ChatChannel::PARTY)
        );
        assert_eq!(ChatChannel::from_command_arg("nowhere"), None);
    }

    #[test]
    fn display() {
        assert_eq!(ChatChannel::GLOBAL.to_string(), "Global");
        assert_eq!(ChatChannel::all().to_string(), "all channels");
        assert_eq!(
            (ChatChannel::LOCAL | ChatChannel::SYSTEM).to_string(),
            "Local, System"
        );
    }

    #[test]
    fn wire_form_is_the_bitmask() {
        let json = serde_json::to_string(&(ChatChannel::LOCAL | ChatChannel::GLOBAL)).unwrap();
        assert_eq!(json, "3");
        let parsed: ChatChannel = serde_json::from_str("256").unwrap();
        assert_eq!(parsed.bits(), 256);
    }
}
