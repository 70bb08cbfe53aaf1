//! Bounded, time-limited execution of analyzer processes.
//!
//! Both pipes are drained on their own threads while the child runs, so a
//! chatty analyzer cannot deadlock on a full pipe. Only the first
//! `output_limit_bytes` of each stream are kept; the rest is read and dropped.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How an analyzer process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated by a signal it did not handle.
    Signaled,
    /// Killed after exceeding its time limit.
    TimedOut,
}

impl Exit {
    pub fn code(self) -> Option<i32> {
        match self {
            Exit::Code(code) => Some(code),
            Exit::Signaled | Exit::TimedOut => None,
        }
    }
}

/// Lossily decoded output of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `cmd` with stdin closed, killing it once `timeout` elapses.
///
/// `Err` means the process could not be run or reaped at all; every outcome
/// of a process that did start is described by [`Exit`].
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_bounded(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = cmd.spawn().context("spawn analyzer")?;
    let stdout = capture(child.stdout.take(), output_limit_bytes, "stdout")?;
    let stderr = capture(child.stderr.take(), output_limit_bytes, "stderr")?;

    let exit = match child.wait_timeout(timeout).context("wait for analyzer")? {
        Some(status) => status.code().map_or(Exit::Signaled, Exit::Code),
        None => {
            warn!("analyzer timed out, killing");
            child.kill().context("kill analyzer")?;
            child.wait().context("reap analyzer")?;
            Exit::TimedOut
        }
    };

    let output = ProcessOutput {
        exit,
        stdout: collect(stdout, "stdout")?,
        stderr: collect(stderr, "stderr")?,
        elapsed: started.elapsed(),
    };
    debug!(exit = ?output.exit, elapsed_ms = output.elapsed.as_millis(), "analyzer finished");
    Ok(output)
}

fn capture<R: Read + Send + 'static>(
    pipe: Option<R>,
    limit: usize,
    name: &'static str,
) -> Result<JoinHandle<io::Result<String>>> {
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || read_bounded(pipe, limit)))
}

fn collect(handle: JoinHandle<io::Result<String>>, name: &str) -> Result<String> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader panicked"))?
        .with_context(|| format!("read analyzer {name}"))
}

/// Keep the first `limit` bytes of `reader`, drain the rest.
fn read_bounded<R: Read>(reader: R, limit: usize) -> io::Result<String> {
    let mut kept = Vec::new();
    let mut head = reader.take(limit as u64);
    head.read_to_end(&mut kept)?;
    let dropped = io::copy(&mut head.into_inner(), &mut io::sink())?;
    if dropped > 0 {
        warn!(kept = kept.len(), dropped, "analyzer output truncated");
    }
    Ok(String::from_utf8_lossy(&kept).into_owned())
}
