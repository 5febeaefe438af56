use crate::prelude::*;
use std::process::{Output, Stdio};

/// Runs the program to completion, capturing its stdout and stderr.
///
/// The child process is killed if the returned future is dropped, so wrapping
/// this in [`tokio::time::timeout`] does terminate the process.
pub(crate) async fn run(program: &str, args: &[&str]) -> std::io::Result<Output> {
    debug!(program, ?args, "Running program");

    tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}
