/// Chat text is clamped to this many characters before sanitizing.
pub const MESSAGE_MAX_CHARS: usize = 100;

pub const COMMAND_CHAR: char = '/';

// Profile store record keys
pub const MUTE_KEY: &str = "Mute";
pub const BAN_KEY: &str = "Ban";
pub const BLOCK_LIST_KEY: &str = "MuteList";
pub const ADMIN_KEY: &str = "Admin";

/// Ten years, the default ban length.
pub const DEFAULT_BAN_DURATION_DAYS: u32 = 3650;
/// A hundred years. Longer bans are refused at config load.
pub const MAX_BAN_DURATION_DAYS: u32 = 36500;

pub const DEFAULT_FILTER_TIMEOUT_MS: u64 = 2000;

pub const OUTBOUND_CHANNEL_SIZE: usize = 32;

/// Longest inbound JSON line accepted before the connection is dropped.
pub const MAX_LINE_BYTES: u64 = 4096;

pub const MAX_USERNAME_LENGTH: usize = 24;
