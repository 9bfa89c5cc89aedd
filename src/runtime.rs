//! Worker runtime: delivers host events to the agent one at a time.
//!
//! The runtime owns the registration state (installing, waiting, active) and
//! runs the agent inside a single task fed by a channel. Each handler is
//! awaited before the next event is taken, which keeps the agent alive for as
//! long as its host operations need.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{FetchOutcome, OfflineAgent, ResponseSource};
use crate::event::{Event, EventResult};
use crate::http::{Request, Response};
use crate::native::WorkerRegistration;

/// Registration state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed and waiting for the previous generation to let go
  Installed,
  Activating,
  Activated,
}

enum Command {
  Dispatch(Event),
  /// Pick up a generation installed by an earlier session
  Resume,
}

struct Envelope {
  command: Command,
  reply: oneshot::Sender<Result<EventResult>>,
}

/// Handle to a running worker.
pub struct WorkerRuntime {
  tx: mpsc::UnboundedSender<Envelope>,
  state: watch::Receiver<WorkerState>,
  agent: OfflineAgent,
  task: JoinHandle<()>,
}

impl WorkerRuntime {
  /// Start the worker loop for `agent`.
  pub fn spawn(agent: OfflineAgent, registration: Arc<WorkerRegistration>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(WorkerState::Parsed);

    let worker = Worker {
      agent: agent.clone(),
      registration,
      state: state_tx,
      had_active: false,
    };
    let task = tokio::spawn(worker.run(rx));

    Self {
      tx,
      state,
      agent,
      task,
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.borrow()
  }

  /// Resume the current generation if an earlier session installed it,
  /// otherwise install it now.
  pub async fn register(&self) -> Result<()> {
    let name = &self.agent.settings().cache_name;
    if self.agent.host().caches.has(name)? {
      info!(cache = %name, "resuming installed generation");
      self.send(Command::Resume).await?;
      Ok(())
    } else {
      self.update().await
    }
  }

  /// Run an install; activation follows when skip-waiting was requested or
  /// nothing else is active.
  pub async fn update(&self) -> Result<()> {
    self.dispatch(Event::Install).await?;
    Ok(())
  }

  pub async fn dispatch(&self, event: Event) -> Result<EventResult> {
    self.send(Command::Dispatch(event)).await
  }

  /// Route a request as a controlled view would.
  pub async fn fetch(&self, request: Request) -> Result<(Response, ResponseSource)> {
    match self.dispatch(Event::Fetch(request)).await? {
      EventResult::Response { response, source } => Ok((response, source)),
      other => Err(eyre!("Unexpected fetch result: {:?}", other)),
    }
  }

  /// Stop accepting events and wait for background cache writes.
  pub async fn shutdown(self) -> Result<()> {
    drop(self.tx);
    self
      .task
      .await
      .map_err(|e| eyre!("Worker task failed: {}", e))
  }

  async fn send(&self, command: Command) -> Result<EventResult> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Envelope { command, reply })
      .map_err(|_| eyre!("Worker has stopped"))?;
    rx.await.map_err(|_| eyre!("Worker dropped the event"))?
  }
}

struct Worker {
  agent: OfflineAgent,
  registration: Arc<WorkerRegistration>,
  state: watch::Sender<WorkerState>,
  /// Whether a generation was active before the current install
  had_active: bool,
}

impl Worker {
  async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
      let result = match envelope.command {
        Command::Dispatch(event) => {
          let name = event.name();
          let result = self.handle(event).await;
          if let Err(e) = &result {
            warn!(event = name, error = %e, "event handler failed");
          }
          result
        }
        Command::Resume => {
          self.had_active = true;
          self.set_state(WorkerState::Activated);
          Ok(EventResult::Done)
        }
      };

      // Ignore send errors - caller may have given up waiting
      let _ = envelope.reply.send(result);
    }

    self.agent.flush_background().await;
    debug!("worker stopped");
  }

  fn current(&self) -> WorkerState {
    *self.state.borrow()
  }

  fn set_state(&self, state: WorkerState) {
    debug!(?state, "worker state");
    self.state.send_replace(state);
  }

  async fn handle(&mut self, event: Event) -> Result<EventResult> {
    let result = match event {
      Event::Install => self.install().await,
      Event::Fetch(request) => self.fetch(request).await,
      Event::Message(data) => {
        self.agent.on_message(&data);
        Ok(EventResult::Done)
      }
      Event::Sync { tag } => {
        self.agent.on_sync(&tag);
        Ok(EventResult::Done)
      }
      Event::Push { data } => self
        .agent
        .on_push(data.as_deref())
        .await
        .map(EventResult::Notification),
      Event::NotificationClick {
        notification,
        action,
      } => self
        .agent
        .on_notification_click(&notification, &action)
        .await
        .map(|_| EventResult::Done),
    };

    self.promote_waiting().await?;
    result
  }

  async fn install(&mut self) -> Result<EventResult> {
    self.had_active = self.current() == WorkerState::Activated;
    self.set_state(WorkerState::Installing);

    match self.agent.on_install().await {
      Ok(()) => {
        self.set_state(WorkerState::Installed);
        Ok(EventResult::Done)
      }
      Err(e) => {
        self.set_state(WorkerState::Parsed);
        Err(e)
      }
    }
  }

  async fn activate(&mut self) -> Result<()> {
    if self.current() != WorkerState::Installed {
      return Err(eyre!(
        "Cannot activate a worker in state {:?}",
        self.current()
      ));
    }

    self.set_state(WorkerState::Activating);
    let result = self.agent.on_activate().await;
    // A failed cleanup does not keep the generation from taking over
    self.set_state(WorkerState::Activated);
    self.had_active = true;
    result
  }

  /// Activate a waiting worker once it may take over.
  async fn promote_waiting(&mut self) -> Result<()> {
    if self.current() != WorkerState::Installed {
      return Ok(());
    }

    if self.registration.take_skip_waiting() || !self.had_active {
      self.activate().await
    } else {
      Ok(())
    }
  }

  async fn fetch(&self, request: Request) -> Result<EventResult> {
    if self.current() != WorkerState::Activated {
      // Not controlling any view yet
      return self.passthrough(request).await;
    }

    match self.agent.on_fetch(&request).await {
      FetchOutcome::Respond { response, source } => Ok(EventResult::Response { response, source }),
      FetchOutcome::Passthrough => self.passthrough(request).await,
    }
  }

  async fn passthrough(&self, request: Request) -> Result<EventResult> {
    let response = self.agent.host().network.fetch(&request).await?;
    Ok(EventResult::Response {
      response,
      source: ResponseSource::Passthrough,
    })
  }
}
