//! Console channel: requests from stdin, replies to stdout

use super::{
    ChannelFactory, ChannelProvider, InboundMessage, MessageHandler, OutboundMessage,
    ProviderConfig, ProviderError, ProviderFamily, ProviderInfo, ProviderLifecycle,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const PROVIDER_NAME: &str = "console";

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSettings {
    /// User name attached to inbound messages
    #[serde(default = "default_user")]
    pub user: String,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "console".to_string())
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { user: default_user() }
    }
}

type HandlerSlot = Arc<RwLock<Option<MessageHandler>>>;

/// Line-oriented channel on the process's standard streams
pub struct ConsoleChannel {
    settings: ConsoleSettings,
    handler: HandlerSlot,
    reader: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ConsoleChannel {
    pub fn new(settings: ConsoleSettings) -> Self {
        Self {
            settings,
            handler: Arc::new(RwLock::new(None)),
            reader: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let settings = if config.is_null() {
            ConsoleSettings::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| ProviderError::NotConfigured(format!("invalid console settings: {}", e)))?
        };
        Ok(Self::new(settings))
    }

    pub fn factory() -> ChannelFactory {
        Arc::new(|config| {
            let channel: Arc<dyn ChannelProvider> = Arc::new(ConsoleChannel::from_config(config)?);
            Ok(channel)
        })
    }

    pub fn info() -> ProviderInfo {
        ProviderInfo {
            name: PROVIDER_NAME.to_string(),
            family: ProviderFamily::Channel,
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["text".to_string()],
        }
    }

    /// Feed one input line to the installed handler
    pub async fn deliver_line(&self, line: &str) -> bool {
        dispatch_line(&self.handler, &self.settings.user, line).await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Returns whether a handler received the line
async fn dispatch_line(handler: &HandlerSlot, user: &str, line: &str) -> bool {
    let content = line.trim();
    if content.is_empty() {
        return false;
    }

    let handler = handler
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let Some(handler) = handler else {
        debug!("No handler installed, dropping console input");
        return false;
    };

    handler(InboundMessage {
        channel: PROVIDER_NAME.to_string(),
        user: user.to_string(),
        content: content.to_string(),
        thread_id: None,
    })
    .await;
    true
}

#[async_trait]
impl ProviderLifecycle for ConsoleChannel {
    async fn health_check(&self) -> bool {
        true
    }

    async fn destroy(&self) -> Result<(), ProviderError> {
        self.stop().await
    }
}

#[async_trait]
impl ChannelProvider for ConsoleChannel {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn start(&self) -> Result<(), ProviderError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let handler = Arc::clone(&self.handler);
        let user = self.settings.user.clone();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                dispatch_line(&handler, &user, &line).await;
            }
            debug!("Console input closed");
        });

        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!(user = %self.settings.user, "Console channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if let Some(task) = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Console channel stopped");
        }
        Ok(())
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<(), ProviderError> {
        let mut stdout = tokio::io::stdout();
        let text = format!("{}\n", message.content);
        stdout
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ProviderError::Channel(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| ProviderError::Channel(e.to_string()))
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn channel() -> ConsoleChannel {
        ConsoleChannel::new(ConsoleSettings {
            user: "tester".to_string(),
        })
    }

    #[tokio::test]
    async fn test_lines_reach_handler() {
        let channel = channel();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        channel.on_message(Arc::new(move |message: InboundMessage| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(message);
            }
            .boxed()
        }));

        assert!(channel.deliver_line("  clone the repo  ").await);
        assert!(!channel.deliver_line("   ").await);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "clone the repo");
        assert_eq!(received[0].user, "tester");
        assert_eq!(received[0].channel, "console");
    }

    #[tokio::test]
    async fn test_without_handler_input_is_dropped() {
        assert!(!channel().deliver_line("hello").await);
    }

    #[tokio::test]
    async fn test_send_and_lifecycle() {
        let channel = channel();
        assert!(channel.health_check().await);
        channel
            .send_message(OutboundMessage {
                channel: "console".to_string(),
                content: "done".to_string(),
                thread_id: None,
            })
            .await
            .unwrap();

        channel.stop().await.unwrap();
        assert!(!channel.is_running());
    }
}
