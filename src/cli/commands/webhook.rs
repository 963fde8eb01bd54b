use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;

use super::AppContext;
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::{DeliveryOptions, WebhookDispatcher};

#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    #[command(about = "Register a webhook endpoint")]
    Add {
        name: String,
        url: String,
        #[arg(
            long,
            short = 'e',
            value_delimiter = ',',
            default_value = "*",
            help = "Event types to deliver, comma separated (* for all)"
        )]
        events: Vec<String>,
        #[arg(long, help = "Shared secret for HMAC-SHA256 signatures")]
        secret: Option<String>,
    },
    #[command(about = "List registered webhooks")]
    List,
    #[command(about = "Remove a webhook and its secret")]
    Remove {
        #[arg(help = "Webhook id or name")]
        webhook: String,
    },
    #[command(about = "Send a test event")]
    Test {
        #[arg(help = "Webhook id or name")]
        webhook: String,
    },
    #[command(about = "Deliver an event to every subscribed webhook")]
    Broadcast {
        #[arg(help = "Event type, e.g. document.created")]
        event: String,
        #[arg(long, short = 'd', help = "Event data as JSON")]
        data: Option<String>,
    },
}

pub async fn handle_webhook(cmd: WebhookCommand, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);
    let dispatcher = WebhookDispatcher::new(
        ctx.webhooks(),
        Some(ctx.keystore.clone()),
        DeliveryOptions::from_config(&ctx.config.webhook),
    )?;

    match cmd {
        WebhookCommand::Add {
            name,
            url,
            events,
            secret,
        } => {
            let hook = dispatcher
                .register(&name, &url, events, secret.as_deref())
                .await?;
            print!("{}", formatter.format_webhooks(&[hook]));
        }
        WebhookCommand::List => {
            print!("{}", formatter.format_webhooks(&dispatcher.list().await?));
        }
        WebhookCommand::Remove { webhook } => {
            let hook = dispatcher.unregister(&webhook).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Removed webhook '{}'", hook.name))
            );
        }
        WebhookCommand::Test { webhook } => {
            let hook = dispatcher.find(&webhook).await?;
            let result = dispatcher.test_webhook(&hook.id).await?;
            print!(
                "{}",
                formatter.format_deliveries(&[(hook.id, result)].into_iter().collect())
            );
        }
        WebhookCommand::Broadcast { event, data } => {
            let data = match data {
                Some(raw) => serde_json::from_str(&raw).context("invalid --data JSON")?,
                None => Value::Object(Default::default()),
            };
            let results = dispatcher.broadcast_webhook(&event, data).await?;
            print!("{}", formatter.format_deliveries(&results));
        }
    }
    Ok(())
}
