//! Connected client: signaling channel plus a running coordinator.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::call::{CallCommand, CallNotice, CallSessionCoordinator};
use crate::channel::SignalingChannel;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::gesture::GestureClient;
use crate::media::MediaSource;
use crate::peer::PeerConnector;
use crate::protocol::{OnlineUser, Profile};

/// Handle to a coordinator running in its own task.
///
/// Commands are queued to the coordinator; notices come back through
/// [`CallClient::next_notice`].
pub struct CallClient {
    commands: mpsc::UnboundedSender<CallCommand>,
    notices: mpsc::UnboundedReceiver<CallNotice>,
    task: JoinHandle<()>,
    gesture: Option<GestureClient>,
    _channel: SignalingChannel,
}

impl CallClient {
    /// Connect to `config.relay_url`, announce `me` and start the coordinator.
    pub async fn connect(
        config: ClientConfig,
        me: Profile,
        media_source: Arc<dyn MediaSource>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self> {
        let (channel, inbound) = SignalingChannel::connect(&config.relay_url).await?;
        let gesture = config.gesture_client();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let coordinator = CallSessionCoordinator::new(
            me,
            config,
            channel.sender(),
            notice_tx,
            media_source,
            connector,
        );
        let task = tokio::spawn(coordinator.run(command_rx, inbound));

        Ok(Self {
            commands: command_tx,
            notices: notice_rx,
            task,
            gesture,
            _channel: channel,
        })
    }

    fn command(&self, command: CallCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ChannelClosed)
    }

    pub fn call(&self, target: OnlineUser) -> Result<()> {
        self.command(CallCommand::Call(target))
    }

    pub fn accept(&self) -> Result<()> {
        self.command(CallCommand::Accept)
    }

    pub fn decline(&self) -> Result<()> {
        self.command(CallCommand::Decline)
    }

    pub fn hangup(&self) -> Result<()> {
        self.command(CallCommand::Hangup)
    }

    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.command(CallCommand::SendMessage(text.into()))
    }

    /// Gesture recognition for this client, when `gesture_url` is set.
    pub fn gesture(&self) -> Option<&GestureClient> {
        self.gesture.as_ref()
    }

    /// Next notice from the coordinator; `None` once it has stopped.
    pub async fn next_notice(&mut self) -> Option<CallNotice> {
        self.notices.recv().await
    }

    /// Hang up any call and wait for the coordinator to stop.
    pub async fn shutdown(self) {
        let _ = self.commands.send(CallCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("Coordinator task failed: {}", e);
        }
    }
}
