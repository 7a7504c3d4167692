// Application-facing value types: what callers hand to the client

/// Notification priority, mapped to the protocol's -2..=2 integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

impl Priority {
    /// Wire value for the `Notification-Priority` header.
    pub fn value(self) -> i8 {
        match self {
            Priority::Lowest => -2,
            Priority::Low => -1,
            Priority::Normal => 0,
            Priority::High => 1,
            Priority::Highest => 2,
        }
    }

    /// Inverse of [`Priority::value`]; `None` for out-of-range integers.
    pub fn from_value(value: i8) -> Option<Self> {
        match value {
            -2 => Some(Priority::Lowest),
            -1 => Some(Priority::Low),
            0 => Some(Priority::Normal),
            1 => Some(Priority::High),
            2 => Some(Priority::Highest),
            _ => None,
        }
    }
}

/// An icon reference: either a URL the daemon fetches itself, or raw bytes
/// shipped inline as a binary section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icon {
    /// Remote icon address (http/https/file URL).
    Url(String),
    /// Raw image bytes, transferred as a length-prefixed binary section.
    Data(Vec<u8>),
}

/// A notification type the application registers up front.
///
/// The daemon only renders notifications whose `name` was announced during
/// registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationType {
    /// Logical type name, matched against [`Notification::name`].
    pub name: String,
    /// Human-readable name shown in the daemon's configuration UI.
    pub display_name: Option<String>,
    /// Whether this type is enabled by default.
    pub enabled: bool,
    /// Default icon for this type.
    pub icon: Option<Icon>,
}

impl NotificationType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            enabled: true,
            icon: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }
}

/// Immutable identity of the registering application.
///
/// Owned by the client for its whole lifetime; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// Application name announced to the daemon.
    pub name: String,
    /// Application-level icon.
    pub icon: Option<Icon>,
    /// Notification types this application may send.
    pub notifications: Vec<NotificationType>,
}

impl ApplicationInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: None,
            notifications: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_notification(mut self, notification: NotificationType) -> Self {
        self.notifications.push(notification);
        self
    }
}

/// A single notification submission.
///
/// Treated as an immutable value; the client correlates daemon callbacks
/// with the originating `Notification` and hands it back through the
/// listener, `context` included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Logical type name; must match a registered [`NotificationType`].
    pub name: String,
    /// Application-supplied id, forwarded as `Notification-ID`.
    pub id: Option<String>,
    /// Title line.
    pub title: String,
    /// Body text.
    pub text: Option<String>,
    /// Sticky notifications stay on screen until dismissed.
    pub sticky: Option<bool>,
    pub priority: Option<Priority>,
    pub icon: Option<Icon>,
    /// Lets the daemon replace a previous notification with the same id.
    pub coalescing_id: Option<String>,
    /// URL the daemon opens on click instead of reporting a callback.
    pub callback_target: Option<String>,
    /// Request click/close/timeout callbacks over the socket.
    pub callback_requested: bool,
    /// Opaque caller context, echoed back on callbacks.
    pub context: Option<String>,
}

impl Notification {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            title: title.into(),
            text: None,
            sticky: None,
            priority: None,
            icon: None,
            coalescing_id: None,
            callback_target: None,
            callback_requested: false,
            context: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = Some(sticky);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_coalescing_id(mut self, coalescing_id: impl Into<String>) -> Self {
        self.coalescing_id = Some(coalescing_id.into());
        self
    }

    pub fn with_callback_target(mut self, target: impl Into<String>) -> Self {
        self.callback_target = Some(target.into());
        self
    }

    pub fn with_callback(mut self) -> Self {
        self.callback_requested = true;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_values_roundtrip() {
        for p in [
            Priority::Lowest,
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Highest,
        ] {
            assert_eq!(Priority::from_value(p.value()), Some(p));
        }
        assert_eq!(Priority::from_value(3), None);
        assert_eq!(Priority::from_value(-3), None);
    }

    #[test]
    fn test_notification_builder() {
        let n = Notification::new("download-finished", "Done")
            .with_text("archive.tar.gz")
            .with_sticky(true)
            .with_priority(Priority::High)
            .with_callback()
            .with_context("row-42");

        assert_eq!(n.name, "download-finished");
        assert_eq!(n.title, "Done");
        assert_eq!(n.text.as_deref(), Some("archive.tar.gz"));
        assert_eq!(n.sticky, Some(true));
        assert!(n.callback_requested);
        assert_eq!(n.context.as_deref(), Some("row-42"));
    }

    #[test]
    fn test_application_info_builder() {
        let app = ApplicationInfo::new("MailWatcher")
            .with_icon(Icon::Url("https://example.org/mail.png".into()))
            .with_notification(NotificationType::new("new-mail").with_display_name("New mail"))
            .with_notification(NotificationType::new("sync-error").with_enabled(false));

        assert_eq!(app.notifications.len(), 2);
        assert!(app.notifications[0].enabled);
        assert!(!app.notifications[1].enabled);
    }
}
