// gntp-core: GNTP notification client
//
// A client for the Growl Notification Transport Protocol: register an
// application with a notification daemon, submit notifications, get
// click/close callbacks back. The engine handles wire framing (cleartext
// and encrypted), the registration handshake with unbounded retry, and
// bounded per-notification delivery retry.
//
//     let app = ApplicationInfo::new("MyApp")
//         .with_notification(NotificationType::new("build-finished"));
//     let client = GntpClient::new(app, ClientConfig::default(), Arc::new(NoopListener))?;
//     client.register().await?;
//     client.notify(Notification::new("build-finished", "Build passed")).await?;

pub mod client;
pub mod crypto;
pub mod message;
pub mod transport;
pub mod types;

pub use client::{
    ClientConfig, ClientError, ConfigError, ConnectionState, ErrorStatus, GntpClient,
    GntpListener, NoopListener,
};
pub use crypto::{Credential, CryptoError, EncryptionAlgorithm, KeyHashAlgorithm};
pub use message::{
    CallbackResult, CodecError, DaemonResponse, GntpMessage, ProtocolError, ResponseKind,
};
pub use transport::{Connection, TcpTransport, Transport, TransportError};
pub use types::{ApplicationInfo, Icon, Notification, NotificationType, Priority};
