use std::{
    io::Read,
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};

use crate::{
    error::{WikigraphError, WikigraphResult},
    params::RenderCommand,
};

/// Seam for invoking the external layout engine. Production code uses
/// [`SystemRunner`]; tests inject a counting fake.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion. Returns the combined stdout+stderr
    /// text on success; a non-zero exit carries the same combined text as
    /// the diagnostic so syntax errors reach the user.
    fn run(&self, command: &RenderCommand, timeout: Duration) -> WikigraphResult<String>;
}

/// Blocking subprocess runner with an explicit timeout. The original design
/// waited unboundedly on the renderer; here a hung binary is killed once
/// the deadline passes and reported as [`WikigraphError::RendererTimeout`].
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &RenderCommand, timeout: Duration) -> WikigraphResult<String> {
        tracing::debug!(command = %command, "invoking renderer");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                WikigraphError::renderer(format!(
                    "failed to spawn '{}': {e}",
                    command.program.display()
                ))
            })?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, timeout)?;

        let mut combined = join_reader(stdout);
        let err_text = join_reader(stderr);
        if !err_text.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&err_text);
        }

        if status.success() {
            Ok(combined)
        } else {
            tracing::debug!(status = %status, "renderer exited with failure");
            Err(WikigraphError::RendererInvocationFailed(combined))
        }
    }
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> WikigraphResult<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(WikigraphError::RendererTimeout(timeout.as_secs()));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(WikigraphError::renderer(format!(
                    "failed waiting for renderer: {e}"
                )));
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> Option<std::thread::JoinHandle<Vec<u8>>> {
    source.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}
