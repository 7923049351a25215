//! Handle on a child process whose output goes to a log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::Result;
use crate::task::Task;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running external program.
///
/// The child is killed and reaped when the handle is dropped, so a
/// failure or cancellation never leaves a process behind.
#[derive(Debug)]
pub struct EngineProcess {
    child: Option<Child>,
    status: Option<ExitStatus>,
}

impl EngineProcess {
    /// Spawn `command` with both stdout and stderr appended to `log`.
    pub fn start(mut command: Command, log: &Path) -> Result<Self> {
        let stdout = OpenOptions::new().create(true).append(true).open(log)?;
        let stderr = stdout.try_clone()?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        debug!("spawning {:?}", command);
        let child = command.spawn()?;
        Ok(Self {
            child: Some(child),
            status: None,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    /// Wait for the program to finish.
    ///
    /// Returns `None` if the task is cancelled while waiting, after the
    /// program has been terminated.
    pub fn wait_for_exit(&mut self, task: &dyn Task) -> Result<Option<ExitStatus>> {
        loop {
            if task.is_cancelled() {
                self.terminate();
                return Ok(None);
            }
            let status = match self.child.as_mut() {
                Some(child) => child.try_wait()?,
                None => return Ok(self.status),
            };
            if let Some(status) = status {
                self.child = None;
                self.status = Some(status);
                return Ok(Some(status));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kill the program if it is still running and reap it.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                debug!("killing process {}", child.id());
                if let Err(why) = child.kill() {
                    warn!("could not kill process {}: {}", child.id(), why);
                }
            }
            match child.wait() {
                Ok(status) => self.status = Some(status),
                Err(why) => warn!("could not reap process {}: {}", child.id(), why),
            }
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}
