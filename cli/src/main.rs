// gntp-send: register an application and push one notification
//
// Cross-platform command-line sender for GNTP daemons (Growl, Growl for
// Windows, gol). Registers on the fly, sends, optionally waits for the
// click/close callback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gntp_core::{
    ApplicationInfo, ClientConfig, Credential, ErrorStatus, GntpClient, GntpListener, Icon,
    Notification, NotificationType, Priority,
};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "gntp-send")]
#[command(about = "Send a notification to a GNTP daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Notification title
    title: String,

    /// Notification body text
    text: Option<String>,

    /// Daemon address
    #[arg(long, default_value = "127.0.0.1:23053")]
    address: String,

    /// Application name to register as
    #[arg(long, default_value = "gntp-send")]
    application: String,

    /// Notification type name
    #[arg(long, default_value = "message")]
    name: String,

    /// Shared secret, when the daemon requires one
    #[arg(long)]
    password: Option<String>,

    /// Encrypt messages (requires --password)
    #[arg(long)]
    encrypt: bool,

    /// Keep the notification on screen until dismissed
    #[arg(long)]
    sticky: bool,

    /// Priority, -2 (lowest) to 2 (highest)
    #[arg(long, value_parser = clap::value_parser!(i8).range(-2..=2))]
    priority: Option<i8>,

    /// Icon URL
    #[arg(long)]
    icon: Option<String>,

    /// Wait for the click/close callback before exiting
    #[arg(long)]
    wait: bool,

    /// Seconds to wait for registration (and for the callback with --wait)
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[derive(Debug)]
enum Outcome {
    Delivered,
    Clicked,
    Closed,
    TimedOut,
    Failed(ErrorStatus),
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<Outcome>,
}

impl GntpListener for ChannelListener {
    fn on_notification_ok(&self, _notification: &Notification) {
        let _ = self.tx.send(Outcome::Delivered);
    }

    fn on_click(&self, _notification: &Notification) {
        let _ = self.tx.send(Outcome::Clicked);
    }

    fn on_close(&self, _notification: &Notification) {
        let _ = self.tx.send(Outcome::Closed);
    }

    fn on_timeout(&self, _notification: &Notification) {
        let _ = self.tx.send(Outcome::TimedOut);
    }

    fn on_error(&self, status: ErrorStatus) {
        let _ = self.tx.send(Outcome::Failed(status));
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout);

    let app = ApplicationInfo::new(&args.application)
        .with_notification(NotificationType::new(&args.name));

    let config = ClientConfig {
        address: args.address.clone(),
        credential: args.password.as_deref().map(Credential::new),
        encrypted: args.encrypt,
        retry_delay: Some(Duration::from_secs(2)),
        notification_retries: 2,
        ..ClientConfig::default()
    };

    let (tx, mut outcomes) = mpsc::unbounded_channel();
    let client = GntpClient::new(app, config, Arc::new(ChannelListener { tx }))
        .context("failed to construct client")?;

    client.register().await?;
    if !client.wait_registration_timeout(timeout).await {
        client.shutdown(Duration::from_secs(1)).await;
        bail!("no registration response from {} within {timeout:?}", args.address);
    }

    let mut notification = Notification::new(&args.name, &args.title);
    if let Some(text) = &args.text {
        notification = notification.with_text(text);
    }
    if args.sticky {
        notification = notification.with_sticky(true);
    }
    if let Some(priority) = args.priority.and_then(Priority::from_value) {
        notification = notification.with_priority(priority);
    }
    if let Some(icon) = &args.icon {
        notification = notification.with_icon(Icon::Url(icon.clone()));
    }
    if args.wait {
        notification = notification.with_callback();
    }

    client.notify(notification).await?;

    // first outcome is the delivery ack; with --wait, keep going until
    // the daemon reports what the user did
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let outcome = tokio::time::timeout_at(deadline, outcomes.recv()).await;
        match outcome {
            Ok(Some(Outcome::Delivered)) if args.wait => continue,
            Ok(Some(Outcome::Delivered)) => {
                println!("delivered");
                break;
            }
            Ok(Some(Outcome::Clicked)) => {
                println!("clicked");
                break;
            }
            Ok(Some(Outcome::Closed)) => {
                println!("closed");
                break;
            }
            Ok(Some(Outcome::TimedOut)) => {
                println!("timed out");
                break;
            }
            Ok(Some(Outcome::Failed(status))) => {
                client.shutdown(Duration::from_secs(1)).await;
                bail!(
                    "daemon rejected the notification (code {:?}): {}",
                    status.code,
                    status.description.unwrap_or_default()
                );
            }
            Ok(None) | Err(_) => {
                eprintln!("no response from daemon within {timeout:?}");
                break;
            }
        }
    }

    client.shutdown(Duration::from_secs(2)).await;
    Ok(())
}
