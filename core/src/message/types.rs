// Message model: status-line tokens, header names, binary sections

use sha2::{Digest, Sha256};

use crate::types::{ApplicationInfo, Icon, Notification};

/// Protocol identifier on every status line.
pub const PROTOCOL_ID: &str = "GNTP";
/// Protocol version on every status line.
pub const PROTOCOL_VERSION: &str = "1.0";
/// Encryption token for cleartext messages.
pub const NONE_ENCRYPTION: &str = "NONE";
/// Line separator, written explicitly on every line.
pub const SEPARATOR: &str = "\r\n";
/// URL scheme pointing a header at an attached binary section.
pub const RESOURCE_SCHEME: &str = "x-growl-resource://";

/// Header names the client emits or reads.
pub mod headers {
    pub const APPLICATION_NAME: &str = "Application-Name";
    pub const APPLICATION_ICON: &str = "Application-Icon";
    pub const NOTIFICATION_COUNT: &str = "Notifications-Count";
    pub const NOTIFICATION_NAME: &str = "Notification-Name";
    pub const NOTIFICATION_DISPLAY_NAME: &str = "Notification-Display-Name";
    pub const NOTIFICATION_ENABLED: &str = "Notification-Enabled";
    pub const NOTIFICATION_ICON: &str = "Notification-Icon";
    pub const NOTIFICATION_ID: &str = "Notification-ID";
    pub const NOTIFICATION_TITLE: &str = "Notification-Title";
    pub const NOTIFICATION_TEXT: &str = "Notification-Text";
    pub const NOTIFICATION_STICKY: &str = "Notification-Sticky";
    pub const NOTIFICATION_PRIORITY: &str = "Notification-Priority";
    pub const NOTIFICATION_COALESCING_ID: &str = "Notification-Coalescing-ID";
    pub const NOTIFICATION_CALLBACK_TARGET: &str = "Notification-Callback-Target";
    pub const NOTIFICATION_CALLBACK_CONTEXT: &str = "Notification-Callback-Context";
    pub const NOTIFICATION_CALLBACK_CONTEXT_TYPE: &str = "Notification-Callback-Context-Type";
    pub const NOTIFICATION_CALLBACK_RESULT: &str = "Notification-Callback-Result";
    pub const NOTIFICATION_INTERNAL_ID: &str = "Notification-Internal-ID";
    pub const ORIGIN_SOFTWARE_NAME: &str = "Origin-Software-Name";
    pub const ORIGIN_SOFTWARE_VERSION: &str = "Origin-Software-Version";
    pub const RESPONSE_ACTION: &str = "Response-Action";
    pub const ERROR_CODE: &str = "Error-Code";
    pub const ERROR_DESCRIPTION: &str = "Error-Description";
}

/// Request kinds this client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Register,
    Notify,
}

impl MessageType {
    pub fn wire_token(self) -> &'static str {
        match self {
            MessageType::Register => "REGISTER",
            MessageType::Notify => "NOTIFY",
        }
    }
}

/// One `Name: value` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// A named raw byte payload appended after the headers (icon data).
///
/// The id is the lowercase hex SHA-256 of the payload; headers reference
/// it as `x-growl-resource://<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySection {
    pub id: String,
    pub data: Vec<u8>,
}

impl BinarySection {
    pub fn new(data: Vec<u8>) -> Self {
        let id = hex::encode(Sha256::digest(&data));
        Self { id, data }
    }

    /// Header value pointing at this section.
    pub fn resource_pointer(&self) -> String {
        format!("{RESOURCE_SCHEME}{}", self.id)
    }
}

/// An outbound protocol message: kind, ordered headers, binary sections.
///
/// Built from the application-facing value types, then serialized by
/// [`GntpMessage::encode`](crate::message::WireMode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GntpMessage {
    pub message_type: MessageType,
    pub headers: Vec<Header>,
    pub binary_sections: Vec<BinarySection>,
}

impl GntpMessage {
    fn origin_headers(headers: &mut Vec<Header>) {
        headers.push(Header::new(headers::ORIGIN_SOFTWARE_NAME, "gntp-core"));
        headers.push(Header::new(
            headers::ORIGIN_SOFTWARE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ));
    }

    fn icon_value(icon: &Icon, binary_sections: &mut Vec<BinarySection>) -> String {
        match icon {
            Icon::Url(url) => url.clone(),
            Icon::Data(data) => {
                let section = BinarySection::new(data.clone());
                let pointer = section.resource_pointer();
                binary_sections.push(section);
                pointer
            }
        }
    }

    /// Build the REGISTER message announcing the application identity and
    /// its notification types.
    pub fn register(app: &ApplicationInfo) -> Self {
        let mut headers_out = Vec::new();
        let mut binary_sections = Vec::new();

        headers_out.push(Header::new(headers::APPLICATION_NAME, &app.name));
        if let Some(icon) = &app.icon {
            headers_out.push(Header::new(
                headers::APPLICATION_ICON,
                Self::icon_value(icon, &mut binary_sections),
            ));
        }
        Self::origin_headers(&mut headers_out);
        headers_out.push(Header::new(
            headers::NOTIFICATION_COUNT,
            app.notifications.len().to_string(),
        ));

        for kind in &app.notifications {
            headers_out.push(Header::new(headers::NOTIFICATION_NAME, &kind.name));
            if let Some(display_name) = &kind.display_name {
                headers_out.push(Header::new(headers::NOTIFICATION_DISPLAY_NAME, display_name));
            }
            headers_out.push(Header::new(
                headers::NOTIFICATION_ENABLED,
                bool_value(kind.enabled),
            ));
            if let Some(icon) = &kind.icon {
                headers_out.push(Header::new(
                    headers::NOTIFICATION_ICON,
                    Self::icon_value(icon, &mut binary_sections),
                ));
            }
        }

        Self {
            message_type: MessageType::Register,
            headers: headers_out,
            binary_sections,
        }
    }

    /// Build the NOTIFY message for one delivery attempt. `internal_id`
    /// is the client-allocated correlation id echoed back by the daemon.
    pub fn notify(app_name: &str, notification: &Notification, internal_id: u64) -> Self {
        let mut headers_out = Vec::new();
        let mut binary_sections = Vec::new();

        headers_out.push(Header::new(headers::APPLICATION_NAME, app_name));
        headers_out.push(Header::new(headers::NOTIFICATION_NAME, &notification.name));
        if let Some(id) = &notification.id {
            headers_out.push(Header::new(headers::NOTIFICATION_ID, id));
        }
        headers_out.push(Header::new(headers::NOTIFICATION_TITLE, &notification.title));
        if let Some(text) = &notification.text {
            headers_out.push(Header::new(headers::NOTIFICATION_TEXT, text));
        }
        if let Some(sticky) = notification.sticky {
            headers_out.push(Header::new(headers::NOTIFICATION_STICKY, bool_value(sticky)));
        }
        if let Some(priority) = notification.priority {
            headers_out.push(Header::new(
                headers::NOTIFICATION_PRIORITY,
                priority.value().to_string(),
            ));
        }
        if let Some(icon) = &notification.icon {
            headers_out.push(Header::new(
                headers::NOTIFICATION_ICON,
                Self::icon_value(icon, &mut binary_sections),
            ));
        }
        if let Some(coalescing_id) = &notification.coalescing_id {
            headers_out.push(Header::new(
                headers::NOTIFICATION_COALESCING_ID,
                coalescing_id,
            ));
        }

        // A callback target routes clicks to a URL and suppresses socket
        // callbacks; otherwise a requested callback ships the caller
        // context and comes back over the connection.
        if let Some(target) = &notification.callback_target {
            headers_out.push(Header::new(headers::NOTIFICATION_CALLBACK_TARGET, target));
        } else if notification.callback_requested {
            headers_out.push(Header::new(
                headers::NOTIFICATION_CALLBACK_CONTEXT,
                notification.context.as_deref().unwrap_or("<none>"),
            ));
            headers_out.push(Header::new(
                headers::NOTIFICATION_CALLBACK_CONTEXT_TYPE,
                "string",
            ));
        }

        headers_out.push(Header::new(
            headers::NOTIFICATION_INTERNAL_ID,
            internal_id.to_string(),
        ));
        Self::origin_headers(&mut headers_out);

        Self {
            message_type: MessageType::Notify,
            headers: headers_out,
            binary_sections,
        }
    }

    /// Value of the first header with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }
}

fn bool_value(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
