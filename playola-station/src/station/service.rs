//! Station event loop
//!
//! One task, three inputs: commands from handles, results of background
//! work, and the earliest pending timer. Handling one never overlaps
//! another, so the player needs no locking of its own.

use std::future::Future;

use playola_common::events::{EventBus, StationEvent};
use playola_common::model::{Playlist, User};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::messages::{StationCommand, StationMessage};
use super::player::StationPlayer;
use super::{StationDeps, StationStatus};
use crate::config::StationSettings;
use crate::error::{Error, Result};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Cloneable front door to a running [`StationService`]
#[derive(Clone, Debug)]
pub struct StationHandle {
    tx: mpsc::Sender<StationCommand>,
    events: EventBus,
}

impl StationHandle {
    async fn request<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> StationCommand) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    /// Switch to `user`'s station; returns once loading has begun
    pub async fn load_user(&self, user: User) -> Result<()> {
        self.request(|reply| StationCommand::LoadUser {
            user: Box::new(user),
            reply,
        })
        .await?
    }

    pub async fn load_user_by_id(&self, user_id: impl Into<String>) -> Result<()> {
        let user_id = user_id.into();
        self.request(|reply| StationCommand::LoadUserById { user_id, reply })
            .await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| StationCommand::Stop { reply }).await?
    }

    /// Move a spin; resolves with the settled playlist
    pub async fn move_spin(&self, spin_id: impl Into<String>, to: i64) -> Result<Playlist> {
        let spin_id = spin_id.into();
        self.request(|reply| StationCommand::MoveSpin { spin_id, to, reply })
            .await?
    }

    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| StationCommand::Refresh { reply }).await?
    }

    pub async fn status(&self) -> Result<StationStatus> {
        self.request(|reply| StationCommand::Status { reply }).await
    }

    /// Ask the loop to stop playback and exit
    pub async fn shutdown(&self) {
        let _ = self.tx.send(StationCommand::Shutdown).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

pub struct StationService {
    player: StationPlayer,
    commands: mpsc::Receiver<StationCommand>,
    inbox: mpsc::UnboundedReceiver<StationMessage>,
}

impl StationService {
    pub fn new(deps: StationDeps, settings: &StationSettings) -> (Self, StationHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let handle = StationHandle {
            tx,
            events: deps.events.clone(),
        };
        let player = StationPlayer::new(deps, settings, inbox_tx);
        (
            Self {
                player,
                commands,
                inbox,
            },
            handle,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until [`StationHandle::shutdown`] or every handle is dropped
    pub async fn run(mut self) {
        info!("Station service started");
        loop {
            let deadline = self.player.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(StationCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = self.inbox.recv() => self.player.handle_message(message),
                () = sleep_until_opt(deadline) => self.player.fire_due(Instant::now()),
            }
        }
        self.player.stop();
        info!("Station service stopped");
    }

    fn handle_command(&mut self, command: StationCommand) {
        debug!("Station command: {:?}", command);
        match command {
            StationCommand::LoadUser { user, reply } => {
                self.player.load_user_and_play(*user);
                let _ = reply.send(Ok(()));
            }
            StationCommand::LoadUserById { user_id, reply } => self.player.request_load_by_id(user_id, reply),
            StationCommand::Stop { reply } => {
                self.player.stop();
                let _ = reply.send(Ok(()));
            }
            StationCommand::MoveSpin { spin_id, to, reply } => self.player.request_move(spin_id, to, reply),
            StationCommand::Refresh { reply } => self.player.request_refresh(reply),
            StationCommand::Status { reply } => {
                let _ = reply.send(self.player.status());
            }
            StationCommand::Shutdown => {}
        }
    }
}

fn sleep_until_opt(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
