//! Child process execution for the external tools.
//!
//! Output streams are redirected into files rather than pipes so the parent
//! can block (or poll for a timeout) without draining anything. stdout goes
//! either to a capture file or straight to a caller-provided destination;
//! stderr always goes to its own capture file and is never mixed in.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::error::ProcessError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the child's stdout goes
pub enum Sink
{
    /// Capture into memory (via a temp file)
    Capture,
    /// Write straight into this file
    File(File),
}

/// Finished child process
#[derive(Debug)]
pub struct Output
{
    pub status: ExitStatus,
    /// Empty when stdout went to a `Sink::File`
    pub stdout: String,
    pub stderr: String,
}

/// Run `cmd` to completion. `program` is only used in errors and logs.
pub fn run(
    cmd: &mut Command,
    program: &str,
    stdout: Sink,
    timeout: Option<Duration>,
) -> Result<Output, ProcessError>
{
    let capture_err = |source| ProcessError::Capture { program: program.to_string(), source };

    let stderr_file = tempfile::tempfile().map_err(capture_err)?;
    let (stdout_capture, stdout_stdio) = match stdout
    {
        Sink::Capture =>
        {
            let f = tempfile::tempfile().map_err(capture_err)?;
            let child_end = f
                .try_clone()
                .map_err(capture_err)?;
            (Some(f), Stdio::from(child_end))
        }
        Sink::File(f) => (None, Stdio::from(f)),
    };

    cmd.stdin(Stdio::null())
        .stdout(stdout_stdio)
        .stderr(Stdio::from(
            stderr_file
                .try_clone()
                .map_err(capture_err)?,
        ));

    debug!(program, cwd = ?cmd.get_current_dir(), args = ?cmd.get_args().collect::<Vec<_>>(), "spawning");

    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program: program.to_string(), source })?;

    let status = wait(&mut child, program, timeout)?;
    debug!(program, %status, "finished");

    let stdout = match stdout_capture
    {
        Some(f) => read_back(f).map_err(capture_err)?,
        None => String::new(),
    };
    let stderr = read_back(stderr_file).map_err(capture_err)?;

    Ok(Output { status, stdout, stderr })
}

fn wait(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ProcessError>
{
    let wait_err = |source| ProcessError::Wait { program: program.to_string(), source };

    let Some(limit) = timeout
    else
    {
        return child
            .wait()
            .map_err(wait_err);
    };

    let started = Instant::now();
    loop
    {
        if let Some(status) = child
            .try_wait()
            .map_err(wait_err)?
        {
            return Ok(status);
        }

        if started.elapsed() >= limit
        {
            warn!(program, limit_secs = limit.as_secs(), "timed out, killing");
            // Already-exited races are fine here
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::TimedOut { program: program.to_string(), limit });
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_back(mut f: File) -> std::io::Result<String>
{
    f.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(all(test, unix))]
mod tests
{
    use super::*;

    fn sh(script: &str) -> Command
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script);
        cmd
    }

    #[test]
    fn captures_streams_separately()
    {
        let out = run(&mut sh("echo out; echo err >&2; exit 4"), "sh", Sink::Capture, None).unwrap();

        assert_eq!(out.status.code(), Some(4));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn file_sink_receives_stdout_only()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir
            .path()
            .join("out.json");
        let file = File::create(&path).unwrap();

        let out = run(
            &mut sh("printf '{}'; echo 'warning: noisy' >&2"),
            "sh",
            Sink::File(file),
            None,
        )
        .unwrap();

        assert!(out.status.success());
        assert!(out.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert_eq!(out.stderr, "warning: noisy\n");
    }

    #[test]
    fn timeout_kills_the_child()
    {
        let started = Instant::now();
        let err = run(
            &mut sh("sleep 30"),
            "sleeper",
            Sink::Capture,
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn spawn_failure_is_reported()
    {
        let err = run(
            &mut Command::new("/nonexistent/definitely/missing"),
            "missing",
            Sink::Capture,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
