use crate::limits::ResourceLimits;
use anyhow::Context;
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::{setsid, Pid},
};
use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on captured stdout; the rest is drained and dropped.
pub(crate) const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

pub(crate) struct Launch<'a> {
    pub(crate) program: &'a Path,
    pub(crate) args: &'a [String],
    pub(crate) work_path: &'a Path,
    pub(crate) envs: Vec<(&'static str, String)>,
    pub(crate) limits: ResourceLimits,
}

/// Suite process, leader of its own process group.
pub(crate) struct SuiteProcess {
    child: tokio::process::Child,
    group: Option<Pid>,
    program: PathBuf,
}

impl SuiteProcess {
    pub(crate) async fn spawn(launch: Launch<'_>) -> anyhow::Result<Self> {
        let mut attempt = 1;
        loop {
            let mut cmd = tokio::process::Command::new(launch.program);
            cmd.args(launch.args);
            cmd.kill_on_drop(true);
            cmd.stdin(std::process::Stdio::piped());
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::inherit());
            cmd.current_dir(launch.work_path);
            for (key, value) in &launch.envs {
                cmd.env(key, value);
            }
            let limits = launch.limits;
            // SAFETY: closure only performs async-signal-safe syscalls.
            unsafe {
                cmd.pre_exec(move || {
                    setsid()?;
                    limits.apply()?;
                    Ok(())
                });
            }
            match cmd.spawn() {
                Ok(child) => {
                    let group = child.id().map(|pid| Pid::from_raw(pid as i32));
                    return Ok(SuiteProcess {
                        child,
                        group,
                        program: launch.program.to_path_buf(),
                    });
                }
                // Some other thread may still hold a write descriptor
                // to a freshly written executable.
                Err(err)
                    if err.raw_os_error() == Some(Errno::ETXTBSY as i32)
                        && attempt < SPAWN_ATTEMPTS =>
                {
                    tracing::debug!(attempt, "executable is busy, retrying spawn");
                    attempt += 1;
                    tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "failed to spawn suite process {} (in {})",
                            launch.program.display(),
                            launch.work_path.display()
                        )
                    });
                }
            }
        }
    }

    /// Sends the request line, collects stdout and waits for exit.
    ///
    /// Once the suite exits its group is killed, so descendants left behind
    /// can not hold stdout open.
    pub(crate) async fn exchange(&mut self, request: &str) -> anyhow::Result<(ExitStatus, String)> {
        let SuiteProcess {
            child,
            group,
            program,
        } = self;
        let mut stdin = child.stdin.take().context("suite stdin is not captured")?;
        let mut stdout = child
            .stdout
            .take()
            .context("suite stdout is not captured")?;

        let write = async move {
            stdin.write_all(request.as_bytes()).await?;
            stdin.flush().await
            // stdin dropped here, child sees EOF
        };
        let read = async {
            let mut buf = Vec::new();
            (&mut stdout)
                .take(MAX_OUTPUT_BYTES)
                .read_to_end(&mut buf)
                .await?;
            let dropped = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await?;
            if dropped > 0 {
                tracing::warn!(dropped, "suite output exceeds limit, tail discarded");
            }
            Ok::<_, std::io::Error>(buf)
        };
        let wait = async {
            let status = child.wait().await;
            if let Some(group) = group.take() {
                kill_group(group);
            }
            status
        };
        let (written, output, status) = tokio::join!(write, read, wait);
        if let Err(err) = written {
            // suite is free to exit without reading its request
            tracing::debug!(error = %err, "failed to deliver suite request");
        }
        let status =
            status.with_context(|| format!("failed to wait for {}", program.display()))?;
        let output = output.context("failed to read suite output")?;
        Ok((status, String::from_utf8_lossy(&output).into_owned()))
    }

    /// Kills the whole process group, including detached descendants.
    pub(crate) async fn kill(&mut self) {
        if let Some(group) = self.group.take() {
            kill_group(group);
        }
        if let Err(err) = self.child.kill().await {
            tracing::debug!(error = %err, "suite process already reaped");
        }
    }
}

fn kill_group(group: Pid) {
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => tracing::warn!(%errno, "failed to kill suite process group"),
    }
}
