use crate::{channels::ChatChannel, message_models::ChatBroadcast};

/// Every human-readable notice the server produces. Sent on the System channel.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum SystemNotice<'a> {
    // Chat pipeline
    MutedIn { channel: ChatChannel },
    NotOnline { name: &'a str },
    BlockedByReceiver,
    ChannelUnavailable { channel: ChatChannel },
    Undeliverable,

    // Login
    AlreadyLoggedIn,
    Banned,
    BanLookupFailed,
    InvalidUsername,

    // Command syntax
    Usage { usage: &'a str },
    ChannelUsage { command: &'a str },
    InvalidChannelName,
    NoPermission { action: &'a str },
    CannotTargetSelf { action: &'a str },

    // Ban family
    AlreadyBanned { target: &'a str, until: &'a str },
    UserBanned,
    BanDurationOutOfRange,
    YouAreBanned,
    NotBanned { target: &'a str },
    UserUnbanned,

    // Mute family
    AlreadyMuted { target: &'a str, channel: ChatChannel },
    UserMuted { channel: ChatChannel },
    YouAreMuted { channel: ChatChannel },
    NotMuted { target: &'a str, channel: ChatChannel },
    UserUnmuted { channel: ChatChannel },
    YouAreUnmuted { channel: ChatChannel },

    // Kick
    UserKicked { name: &'a str },
    YouAreKicked,

    // Block list
    AlreadyBlocked { name: &'a str },
    Blocked { name: &'a str },
    NotBlocked { name: &'a str },
    Unblocked { name: &'a str },

    StoreFailure { report: &'a str },
}

impl<'a> SystemNotice<'a> {
    pub fn format(&self) -> String {
        match self {
            SystemNotice::MutedIn { channel } => {
                format!("You are currently muted in channel: {channel}.")
            }
            SystemNotice::NotOnline { name } => format!("{name} is not online."),
            SystemNotice::BlockedByReceiver => "This user has muted you.".to_owned(),
            SystemNotice::ChannelUnavailable { channel } => {
                format!("Channel {channel} is not available.")
            }
            SystemNotice::Undeliverable => "Your message could not be delivered.".to_owned(),

            SystemNotice::AlreadyLoggedIn => "Already logged in.".to_owned(),
            SystemNotice::Banned => "You are banned.".to_owned(),
            SystemNotice::BanLookupFailed => "Error getting ban record.".to_owned(),
            SystemNotice::InvalidUsername => "Invalid username.".to_owned(),

            SystemNotice::Usage { usage } => format!("Invalid syntax. Usage: {usage}"),
            SystemNotice::ChannelUsage { command } => {
                format!("Incorrect syntax. Use: /{command} username channel")
            }
            SystemNotice::InvalidChannelName => "Invalid channel name.".to_owned(),
            SystemNotice::NoPermission { action } => {
                format!("You do not have permission to {action}.")
            }
            SystemNotice::CannotTargetSelf { action } => format!("You cannot {action} yourself!"),

            SystemNotice::AlreadyBanned { target, until } => {
                format!("{target} is already banned until {until}.")
            }
            SystemNotice::UserBanned => "User has been banned.".to_owned(),
            SystemNotice::BanDurationOutOfRange => "Ban duration is out of range.".to_owned(),
            SystemNotice::YouAreBanned => "You have been banned.".to_owned(),
            SystemNotice::NotBanned { target } => format!("{target} is not banned."),
            SystemNotice::UserUnbanned => "User has been unbanned.".to_owned(),

            SystemNotice::AlreadyMuted { target, channel } => {
                format!("{target} is already muted in {channel}.")
            }
            SystemNotice::UserMuted { channel } => format!("User has been muted in {channel}."),
            SystemNotice::YouAreMuted { channel } => format!("You have been muted in {channel}."),
            SystemNotice::NotMuted { target, channel } => {
                format!("{target} is not muted in {channel}.")
            }
            SystemNotice::UserUnmuted { channel } => {
                format!("User has been unmuted in {channel}.")
            }
            SystemNotice::YouAreUnmuted { channel } => {
                format!("You have been unmuted in {channel}.")
            }

            SystemNotice::UserKicked { name } => format!("{name} has been kicked."),
            SystemNotice::YouAreKicked => "You have been kicked.".to_owned(),

            SystemNotice::AlreadyBlocked { name } => format!("{name} is already blocked."),
            SystemNotice::Blocked { name } => format!("You have blocked {name}."),
            SystemNotice::NotBlocked { name } => format!("{name} is not blocked."),
            SystemNotice::Unblocked { name } => format!("You have unblocked {name}."),

            SystemNotice::StoreFailure { report } => {
                format!("Request failed, try again later. ({report})")
            }
        }
    }

    pub fn to_broadcast(&self) -> ChatBroadcast {
        ChatBroadcast::system(self.format())
    }
}
