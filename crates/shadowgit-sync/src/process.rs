use std::io::Read;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("process timed out after {}ms", timeout.as_millis())]
    TimedOut { timeout: Duration },

    #[error("process stopped on request")]
    Stopped,

    #[error("failed to poll process status: {0}")]
    Poll(#[from] std::io::Error),
}

/// Cooperative cancellation: once `flag` is set the child gets `grace`
/// to finish before it is killed.
#[derive(Clone, Copy)]
pub struct StopSignal<'a> {
    pub flag: &'a AtomicBool,
    pub grace: Duration,
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    reader.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).to_string())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Wait for `child` for at most `timeout`, polling every 10ms.
///
/// Output pipes are drained on helper threads so a chatty child cannot block
/// on a full pipe. On timeout the child is killed and the readers are left
/// detached, since a grandchild may still hold the pipe open.
pub fn wait_with_deadline(
    mut child: Child,
    timeout: Duration,
    stop: Option<StopSignal<'_>>,
) -> Result<ProcessOutput, WaitError> {
    let start = Instant::now();
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let mut stop_requested_at: Option<Instant> = None;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(ProcessOutput {
                    status,
                    stdout: collect(stdout),
                    stderr: collect(stderr),
                    elapsed: start.elapsed(),
                });
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill(&mut child);
                    return Err(WaitError::TimedOut { timeout });
                }
                if let Some(signal) = stop
                    && signal.flag.load(Ordering::SeqCst)
                {
                    let requested = *stop_requested_at.get_or_insert_with(Instant::now);
                    if requested.elapsed() >= signal.grace {
                        kill(&mut child);
                        return Err(WaitError::Stopped);
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                kill(&mut child);
                return Err(WaitError::Poll(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[test]
    fn captures_output_of_fast_process() {
        let out = wait_with_deadline(sh("echo hello; echo oops >&2"), Duration::from_secs(5), None)
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn kills_process_that_outlives_timeout() {
        let start = Instant::now();
        let err = wait_with_deadline(sh("sleep 10"), Duration::from_millis(200), None).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn stop_signal_kills_after_grace() {
        let flag = AtomicBool::new(true);
        let start = Instant::now();
        let err = wait_with_deadline(
            sh("sleep 10"),
            Duration::from_secs(30),
            Some(StopSignal {
                flag: &flag,
                grace: Duration::from_millis(100),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, WaitError::Stopped));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
