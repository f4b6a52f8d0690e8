use crate::{Callback, Error, ServiceEndpoints};
use std::{fmt, str::FromStr, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

const STAGE_BUFFER: usize = 2;

/// How a [`Pipe`] hands one snapshot to its stages.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Buffers the snapshot, then runs each stage to completion in turn.
    Sequence,

    /// Runs every stage concurrently and closes all inputs together.
    Parallel,

    /// Runs every stage concurrently, but closes a stage's input only after
    /// the previous stage has finished.
    #[default]
    ParallelSendSequenceClose,
}

/// Fans one snapshot out to several stages.
pub struct Pipe {
    strategy: Strategy,
    stages: Vec<Arc<dyn Callback>>,
}

// === impl Pipe ===

impl Pipe {
    pub fn new(strategy: Strategy, stages: impl IntoIterator<Item = Arc<dyn Callback>>) -> Self {
        Self {
            strategy,
            stages: stages.into_iter().collect(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn spawn_stages(&self) -> (Vec<mpsc::Sender<ServiceEndpoints>>, Vec<JoinHandle<()>>) {
        self.stages
            .iter()
            .map(|stage| {
                let (tx, rx) = mpsc::channel(STAGE_BUFFER);
                let stage = stage.clone();
                let task = tokio::spawn(async move { stage.callback(rx).await });
                (tx, task)
            })
            .unzip()
    }

    async fn fan_out(
        rx: &mut mpsc::Receiver<ServiceEndpoints>,
        txs: &[mpsc::Sender<ServiceEndpoints>],
    ) {
        while let Some(seps) = rx.recv().await {
            for tx in txs {
                if tx.send(seps.clone()).await.is_err() {
                    debug!("Stage stopped reading the snapshot");
                }
            }
        }
    }

    async fn join(task: JoinHandle<()>) {
        if let Err(error) = task.await {
            error!(%error, "Stage failed");
        }
    }
}

#[async_trait::async_trait]
impl Callback for Pipe {
    async fn callback(&self, mut rx: mpsc::Receiver<ServiceEndpoints>) {
        match self.strategy {
            Strategy::Sequence => {
                let mut snapshot = Vec::new();
                while let Some(seps) = rx.recv().await {
                    snapshot.push(seps);
                }

                for stage in &self.stages {
                    let (tx, stage_rx) = mpsc::channel(snapshot.len().max(1));
                    for seps in &snapshot {
                        // Cannot fail: the channel holds the whole snapshot.
                        let _ = tx.try_send(seps.clone());
                    }
                    drop(tx);
                    stage.callback(stage_rx).await;
                }
            }

            Strategy::Parallel => {
                let (txs, tasks) = self.spawn_stages();
                Self::fan_out(&mut rx, &txs).await;
                drop(txs);
                for task in tasks {
                    Self::join(task).await;
                }
            }

            Strategy::ParallelSendSequenceClose => {
                let (txs, tasks) = self.spawn_stages();
                Self::fan_out(&mut rx, &txs).await;
                for (tx, task) in txs.into_iter().zip(tasks) {
                    drop(tx);
                    Self::join(task).await;
                }
            }
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("strategy", &self.strategy)
            .field("stages", &self.stages.len())
            .finish()
    }
}

// === impl Strategy ===

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence" => Ok(Self::Sequence),
            "parallel" => Ok(Self::Parallel),
            "parallel-send-sequence-close" => Ok(Self::ParallelSendSequenceClose),
            s => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequence => "sequence",
            Self::Parallel => "parallel",
            Self::ParallelSendSequenceClose => "parallel-send-sequence-close",
        })
    }
}
