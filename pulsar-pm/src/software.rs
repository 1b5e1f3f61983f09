//! Authoring-software bridge
//!
//! Task requests built by the resolvers are handed to a [`TaskBridge`]. The
//! [`SoftwareHub`] bridge forwards them to a connected software instance, or
//! launches a new instance of the configured executable. Dispatch is
//! fire-and-forget for the caller: the outcome arrives later on the
//! [`TaskHandle`] and as a `TaskFinished` event. No retry, timeout or
//! cancellation happens here.

use pulsar_common::config::Settings;
use pulsar_common::events::{EventBus, PulsarEvent, SoftwareInfo};
use pulsar_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Software id meaning "launch a new instance"
pub const NEW_INSTANCE: &str = "new";

/// Where a task runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTarget {
    /// Already-running instance with this id
    Existing(String),
    /// Fresh instance of the requested software type
    New,
}

impl TaskTarget {
    pub fn from_software_id(software_id: &str) -> Self {
        if software_id == NEW_INSTANCE {
            TaskTarget::New
        } else {
            TaskTarget::Existing(software_id.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskTarget::Existing(id) => id,
            TaskTarget::New => NEW_INSTANCE,
        }
    }
}

/// Task to run against a resolved file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: Uuid,
    pub target: TaskTarget,
    pub software_type: String,
    pub command: String,
    pub args: Value,
    pub file: PathBuf,
}

/// Result reported for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Pending task returned by [`TaskBridge::submit`]
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: Uuid,
    outcome: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Handle plus the sender that resolves it, for bridge implementations
    pub fn detached(task_id: Uuid) -> (Self, oneshot::Sender<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                task_id,
                outcome: rx,
            },
            tx,
        )
    }

    /// Wait for the bridge to report the outcome
    pub async fn outcome(self) -> TaskOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| TaskOutcome::failed("Task was dropped before completion"))
    }
}

/// Accepts task requests for execution in authoring software
pub trait TaskBridge: Send + Sync {
    /// Hand `request` over; fails only if it cannot be routed at all
    fn submit(&self, request: TaskRequest) -> Result<TaskHandle>;
}

struct Instance {
    info: SoftwareInfo,
    tasks: mpsc::UnboundedSender<TaskRequest>,
}

/// Task forwarded to a connected instance, awaiting its report
struct PendingTask {
    instance: String,
    reply: oneshot::Sender<TaskOutcome>,
}

/// Registry of connected software instances plus launcher for new ones
pub struct SoftwareHub {
    instances: Mutex<HashMap<String, Instance>>,
    pending: Mutex<HashMap<Uuid, PendingTask>>,
    executables: HashMap<String, PathBuf>,
    bus: EventBus,
}

impl SoftwareHub {
    pub fn new(executables: HashMap<String, PathBuf>, bus: EventBus) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            executables,
            bus,
        }
    }

    /// Build from the `softwares` settings map (software type -> executable)
    pub fn from_settings(settings: &Settings, bus: EventBus) -> Self {
        let executables = settings
            .get("softwares")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(software, path)| match path.as_str() {
                        Some(path) => Some((software.clone(), PathBuf::from(path))),
                        None => {
                            warn!("Ignoring non-string executable for software '{}'", software);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::new(executables, bus)
    }

    /// Register a connected instance; tasks for it arrive on the receiver
    pub fn register(
        &self,
        software: &str,
        scene: Option<String>,
    ) -> (String, mpsc::UnboundedReceiver<TaskRequest>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let info = SoftwareInfo {
            id: id.clone(),
            software: software.to_string(),
            scene,
            saved: None,
        };

        self.lock_instances().insert(id.clone(), Instance { info, tasks: tx });
        info!("Software instance {} ({}) connected", id, software);
        self.publish_softwares();
        (id, rx)
    }

    /// Forget a disconnected instance
    ///
    /// Tasks still pending on it fail with a disconnect outcome.
    pub fn unregister(&self, id: &str) -> Result<()> {
        if self.lock_instances().remove(id).is_none() {
            return Err(Error::NotFound(format!("Software instance '{}'", id)));
        }
        info!("Software instance {} disconnected", id);

        let orphaned: Vec<(Uuid, PendingTask)> = {
            let mut pending = self.lock_pending();
            let ids: Vec<Uuid> = pending
                .iter()
                .filter(|(_, task)| task.instance == id)
                .map(|(task_id, _)| *task_id)
                .collect();
            ids.into_iter()
                .filter_map(|task_id| pending.remove(&task_id).map(|task| (task_id, task)))
                .collect()
        };
        for (task_id, task) in orphaned {
            let outcome = TaskOutcome::failed("Software instance disconnected");
            finish(&self.bus, task_id, outcome.clone());
            let _ = task.reply.send(outcome);
        }

        self.publish_softwares();
        Ok(())
    }

    /// Update the scene/saved state an instance reports
    pub fn update(&self, id: &str, scene: Option<String>, saved: Option<bool>) -> Result<SoftwareInfo> {
        let info = {
            let mut instances = self.lock_instances();
            let instance = instances
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("Software instance '{}'", id)))?;
            if scene.is_some() {
                instance.info.scene = scene;
            }
            if saved.is_some() {
                instance.info.saved = saved;
            }
            instance.info.clone()
        };
        self.publish_softwares();
        Ok(info)
    }

    /// Connected instances sorted by id
    pub fn list(&self) -> Vec<SoftwareInfo> {
        let mut list: Vec<SoftwareInfo> =
            self.lock_instances().values().map(|i| i.info.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Resolve a task forwarded to the connected instance `instance`
    ///
    /// Only the instance a task was forwarded to may settle it.
    pub fn report(&self, instance: &str, task_id: Uuid, outcome: TaskOutcome) -> Result<()> {
        let task = {
            let mut pending = self.lock_pending();
            match pending.get(&task_id) {
                Some(task) if task.instance == instance => pending.remove(&task_id),
                _ => None,
            }
        }
        .ok_or_else(|| {
            Error::NotFound(format!("Pending task {} on instance '{}'", task_id, instance))
        })?;
        finish(&self.bus, task_id, outcome.clone());
        // the submitter may have stopped waiting
        let _ = task.reply.send(outcome);
        Ok(())
    }

    fn forward(&self, id: &str, request: TaskRequest) -> Result<TaskHandle> {
        let task_id = request.id;

        let instances = self.lock_instances();
        let instance = instances
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Software instance '{}'", id)))?;
        if instance.info.software != request.software_type {
            return Err(Error::InvalidInput(format!(
                "Instance '{}' runs {}, not {}",
                id, instance.info.software, request.software_type
            )));
        }

        let (handle, tx) = TaskHandle::detached(task_id);
        self.lock_pending().insert(
            task_id,
            PendingTask {
                instance: id.to_string(),
                reply: tx,
            },
        );
        if instance.tasks.send(request).is_err() {
            self.lock_pending().remove(&task_id);
            return Err(Error::NotFound(format!("Software instance '{}' is gone", id)));
        }
        debug!("Task {} forwarded to instance {}", task_id, id);
        Ok(handle)
    }

    fn launch(&self, request: TaskRequest) -> Result<TaskHandle> {
        let executable = self
            .executables
            .get(&request.software_type)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No executable configured for software '{}'",
                    request.software_type
                ))
            })?;

        let task_id = request.id;
        let (handle, tx) = TaskHandle::detached(task_id);
        let bus = self.bus.clone();

        tokio::spawn(async move {
            info!("Launching {} for task {}", executable.display(), task_id);
            let result = Command::new(&executable)
                .arg(&request.file)
                .env("PULSAR_TASK_ID", task_id.to_string())
                .env("PULSAR_TASK_COMMAND", &request.command)
                .env("PULSAR_TASK_ARGS", request.args.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await;

            let outcome = match result {
                Ok(output) if output.status.success() => TaskOutcome::ok(),
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    TaskOutcome::failed(format!(
                        "{} exited with {}: {}",
                        executable.display(),
                        output.status,
                        stderr.trim()
                    ))
                }
                Err(e) => {
                    error!("Failed to launch {}: {}", executable.display(), e);
                    TaskOutcome::failed(format!("Failed to launch {}: {}", executable.display(), e))
                }
            };
            finish(&bus, task_id, outcome.clone());
            let _ = tx.send(outcome);
        });

        Ok(handle)
    }

    fn publish_softwares(&self) {
        self.bus.emit_lossy(PulsarEvent::SoftwaresChanged {
            softwares: self.list(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instance>> {
        self.instances.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingTask>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskBridge for SoftwareHub {
    fn submit(&self, request: TaskRequest) -> Result<TaskHandle> {
        let event = PulsarEvent::TaskDispatched {
            task_id: request.id,
            target: request.target.as_str().to_string(),
            software_type: request.software_type.clone(),
            command: request.command.clone(),
            file: request.file.display().to_string(),
            timestamp: chrono::Utc::now(),
        };

        let handle = match request.target.clone() {
            TaskTarget::Existing(id) => self.forward(&id, request)?,
            TaskTarget::New => self.launch(request)?,
        };
        self.bus.emit_lossy(event);
        Ok(handle)
    }
}

fn finish(bus: &EventBus, task_id: Uuid, outcome: TaskOutcome) {
    if outcome.success {
        info!("Task {} succeeded", task_id);
    } else {
        warn!("Task {} failed: {:?}", task_id, outcome.message);
    }
    bus.emit_lossy(PulsarEvent::TaskFinished {
        task_id,
        success: outcome.success,
        message: outcome.message,
        timestamp: chrono::Utc::now(),
    });
}
