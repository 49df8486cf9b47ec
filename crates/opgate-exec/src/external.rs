use std::io::Read;
use std::io::Write;
use std::process::Command;
use std::process::Stdio;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use opgate_core::runner::ClassifierError;
use opgate_core::runner::ClassifierOutput;
use opgate_core::runner::SkillClassifier;
use opgate_core::runner::SkillInput;
use opgate_core::skill_registry::SkillSpec;

use crate::contracts::ClassifierRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a configured program once per classification: a
/// [`ClassifierRequest`] goes in on stdin, a `ClassifierOutput` comes back
/// on stdout. A non-zero exit is reported with the program's stderr, and a
/// program still running after the timeout is killed.
#[derive(Debug, Clone)]
pub struct ExternalClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalClassifier {
    /// `argv[0]` is the program. Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn read_all(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    // A pipe that errors mid-read still yields what was read so far.
    let _ = pipe.read_to_end(&mut buf);
    buf
}

impl SkillClassifier for ExternalClassifier {
    fn name(&self) -> &'static str {
        "external"
    }

    fn classify(
        &self,
        skill: &SkillSpec,
        input: &SkillInput,
    ) -> Result<ClassifierOutput, ClassifierError> {
        let request = serde_json::to_vec(&ClassifierRequest::new(skill, input))
            .map_err(|err| ClassifierError(format!("encode classifier request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ClassifierError(format!("failed to start {}: {err}", self.program)))?;

        // Stdin is written on its own thread while stdout and stderr drain.
        if let Some(mut stdin) = child.stdin.take() {
            let program = self.program.clone();
            thread::spawn(move || {
                // A classifier that exits without reading stdin is judged by
                // its exit status, not by the broken pipe.
                if let Err(err) = stdin.write_all(&request) {
                    tracing::debug!(%program, error = %err, "classifier closed stdin early");
                }
            });
        }
        let stderr = child.stderr.take().map(|pipe| thread::spawn(move || read_all(pipe)));
        let (tx, rx) = mpsc::channel();
        if let Some(pipe) = child.stdout.take() {
            thread::spawn(move || {
                let _ = tx.send(read_all(pipe));
            });
        }

        let stdout = match rx.recv_timeout(self.timeout) {
            Ok(stdout) => stdout,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "external classifier timed out"
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClassifierError(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                )));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Vec::new(),
        };
        let status = child
            .wait()
            .map_err(|err| ClassifierError(format!("failed to wait for {}: {err}", self.program)))?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            tracing::warn!(
                program = %self.program,
                status = %status,
                "external classifier failed"
            );
            return Err(ClassifierError(if stderr.is_empty() {
                format!("{} exited with status {}", self.program, status)
            } else {
                stderr
            }));
        }

        serde_json::from_slice::<ClassifierOutput>(&stdout)
            .map_err(|err| ClassifierError(format!("classifier returned invalid output: {err}")))
    }
}
