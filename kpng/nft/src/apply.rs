use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    process::Command,
};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{bin} exited with {status}: {stderr}")]
    Exit {
        bin: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to write script: {0}")]
    Write(#[source] std::io::Error),
}

/// Loads an nft script into the kernel.
#[async_trait::async_trait]
pub trait Apply: Send + Sync {
    async fn apply(&self, script: &str) -> Result<(), Error>;
}

/// Runs `nft -f -` with the script on its standard input.
#[derive(Clone, Debug)]
pub struct Nft {
    bin: PathBuf,
}

/// Prints scripts instead of applying them.
#[derive(Clone, Debug, Default)]
pub struct DryRun;

// === impl Nft ===

impl Nft {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Runs nft with the given arguments and returns its standard output.
    pub async fn output(&self, args: &[&str], stdin: Option<&str>) -> Result<String, Error> {
        let bin = self.bin.display().to_string();
        let spawn_error = |source| Error::Spawn {
            bin: bin.clone(),
            source,
        };

        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(spawn_error)?;
            // Closing stdin lets nft start processing.
            drop(pipe);
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(Error::Exit {
                bin,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for Nft {
    fn default() -> Self {
        Self::new("nft")
    }
}

#[async_trait::async_trait]
impl Apply for Nft {
    async fn apply(&self, script: &str) -> Result<(), Error> {
        let out = self.output(&["-f", "-"], Some(script)).await?;
        if !out.is_empty() {
            debug!(output = %out.trim_end(), "nft");
        }
        Ok(())
    }
}

// === impl DryRun ===

impl DryRun {
    async fn print<W: AsyncWrite + Unpin>(out: &mut W, script: &str) -> Result<(), Error> {
        out.write_all(script.as_bytes())
            .await
            .map_err(Error::Write)?;
        out.flush().await.map_err(Error::Write)
    }
}

#[async_trait::async_trait]
impl Apply for DryRun {
    async fn apply(&self, script: &str) -> Result<(), Error> {
        info!("Not running nft (dry run mode)");
        Self::print(&mut tokio::io::stdout(), script).await
    }
}
