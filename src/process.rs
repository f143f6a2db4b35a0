use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{info, warn};

/// Output of a short-lived command run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Spawning external programs.
pub trait ProcessRunner {
    /// Run `program` to completion and collect its output.
    fn capture(&self, program: &Path, args: &[&str]) -> io::Result<Captured>;

    /// Run `program` in `cwd`, forwarding every stdout/stderr line to the
    /// log, and return its exit code (`None` when killed by a signal).
    fn stream(&self, program: &Path, args: &[&str], cwd: &Path) -> io::Result<Option<i32>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn capture(&self, program: &Path, args: &[&str]) -> io::Result<Captured> {
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(Captured {
            status: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    fn stream(&self, program: &Path, args: &[&str], cwd: &Path) -> io::Result<Option<i32>> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|s| {
            if let Some(out) = stdout {
                s.spawn(|| {
                    forward_lines(out, |line| {
                        info!(target: "orion::provision", program = %name, "{line}")
                    })
                });
            }
            if let Some(err) = stderr {
                s.spawn(|| {
                    forward_lines(err, |line| {
                        warn!(target: "orion::provision", program = %name, "{line}")
                    })
                });
            }
        });

        Ok(child.wait()?.code())
    }
}

fn forward_lines(src: impl Read, emit: impl Fn(&str)) {
    for line in BufReader::new(src).lines().map_while(Result::ok) {
        emit(line.trim_end());
    }
}
