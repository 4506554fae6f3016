use chat_server::channels::ChatChannel;

/// A named channel mask used to filter what the chat pane shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayTab {
    pub name: String,
    pub channels: ChatChannel,
}

impl DisplayTab {
    pub fn new(name: impl Into<String>, channels: ChatChannel) -> Self {
        DisplayTab {
            name: name.into(),
            channels,
        }
    }

    pub fn shows(&self, channel: ChatChannel) -> bool {
        !channel.is_empty() && self.channels.contains(channel)
    }
}

pub fn default_tabs() -> Vec<DisplayTab> {
    vec![
        DisplayTab::new("All", ChatChannel::all()),
        DisplayTab::new(
            "Global",
            ChatChannel::GLOBAL | ChatChannel::WHISPER | ChatChannel::SYSTEM,
        ),
        DisplayTab::new(
            "Local",
            ChatChannel::LOCAL | ChatChannel::WHISPER | ChatChannel::SYSTEM,
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct TabSet {
    tabs: Vec<DisplayTab>,
    active: usize,
}

impl TabSet {
    /// An empty list falls back to the default tabs.
    pub fn new(tabs: Vec<DisplayTab>) -> Self {
        let tabs = if tabs.is_empty() { default_tabs() } else { tabs };
        TabSet { tabs, active: 0 }
    }

    pub fn active(&self) -> &DisplayTab {
        &self.tabs[self.active]
    }

    /// Case-insensitive. Returns false and keeps the current tab when no tab
    /// has that name.
    pub fn select(&mut self, name: &str) -> bool {
        match self.tabs.iter().position(|t| t.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.active = index;
                true
            }
            None => false,
        }
    }

    pub fn tabs(&self) -> &[DisplayTab] {
        &self.tabs
    }
}

impl Default for TabSet {
    fn default() -> Self {
        TabSet::new(default_tabs())
    }
}
