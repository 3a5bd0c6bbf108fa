//! Attached container runs under an exit-code restart policy.
//!
//! States: `Starting -> Running -> Exited -> {Restarting, Stopped}`; an
//! interrupt while running goes straight to `Stopped`.

use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::engine::ContainerEngine;
use crate::errors::{DevrouteError, Result};
use crate::run_spec::ContainerRunSpec;
use crate::signals;

/// Exit status reported for a run ended by Ctrl+C.
pub const INTERRUPT_EXIT_CODE: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    Exited(i32),
    Interrupted,
}

/// Launches and waits for one attached container process at a time.
pub trait ProcessRunner {
    fn start(&mut self, spec: &ContainerRunSpec) -> Result<()>;
    /// Block until the process exits or the user interrupts it.
    fn wait(&mut self) -> Result<ProcessEvent>;
    fn stop(&mut self, name: &str) -> Result<()>;
    fn remove(&mut self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Exited(i32),
    Restarting,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Last exit code observed; `None` when interrupted before any exit.
    pub code: Option<i32>,
    pub interrupted: bool,
    pub restarts: u32,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            return INTERRUPT_EXIT_CODE;
        }
        self.code.map(|c| (c & 0xff) as u8).unwrap_or(1)
    }
}

pub struct ProcessSupervisor<R> {
    runner: R,
    history: Vec<SupervisorState>,
}

impl<R: ProcessRunner> ProcessSupervisor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            history: Vec::new(),
        }
    }

    /// States visited by the last `run`, in order.
    pub fn history(&self) -> &[SupervisorState] {
        &self.history
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Run `spec` until it stops; blocks across restart cycles.
    pub fn run(&mut self, spec: &ContainerRunSpec) -> Result<RunOutcome> {
        self.history.clear();
        let mut outcome = RunOutcome {
            code: None,
            interrupted: false,
            restarts: 0,
        };
        let mut state = SupervisorState::Starting;

        loop {
            tracing::debug!("supervisor {}: {:?}", spec.name, state);
            self.history.push(state);
            state = match state {
                SupervisorState::Starting => {
                    self.runner.start(spec)?;
                    SupervisorState::Running
                }
                SupervisorState::Running => match self.runner.wait()? {
                    ProcessEvent::Interrupted => {
                        eprintln!(
                            "\nStopping {} (Ctrl+C)",
                            crate::paint(crate::color_enabled_stderr(), crate::CYAN, &spec.name)
                        );
                        if let Err(e) = self.runner.stop(&spec.name) {
                            tracing::warn!("failed to stop {}: {e}", spec.name);
                        }
                        outcome.interrupted = true;
                        SupervisorState::Stopped
                    }
                    ProcessEvent::Exited(code) => SupervisorState::Exited(code),
                },
                SupervisorState::Exited(code) => {
                    outcome.code = Some(code);
                    if spec.restart.should_restart(code) {
                        SupervisorState::Restarting
                    } else {
                        SupervisorState::Stopped
                    }
                }
                SupervisorState::Restarting => {
                    outcome.restarts += 1;
                    eprintln!(
                        "restarting {}",
                        crate::paint(crate::color_enabled_stderr(), crate::CYAN, &spec.name)
                    );
                    if let Err(e) = self.runner.remove(&spec.name) {
                        tracing::warn!("failed to remove {}: {e}", spec.name);
                    }
                    SupervisorState::Starting
                }
                SupervisorState::Stopped => return Ok(outcome),
            };
        }
    }
}

/// Runs `<engine> run ...` attached to the caller's terminal.
pub struct EngineRunner<'a> {
    engine: &'a dyn ContainerEngine,
    child: Option<Child>,
    poll: Duration,
    grace: Duration,
}

impl<'a> EngineRunner<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        signals::install_interrupt_handler();
        EngineRunner {
            engine,
            child: None,
            poll: Duration::from_millis(100),
            grace: Duration::from_secs(5),
        }
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

impl ProcessRunner for EngineRunner<'_> {
    fn start(&mut self, spec: &ContainerRunSpec) -> Result<()> {
        signals::clear_interrupt();
        let program = self.engine.program();
        tracing::debug!("{}", spec.preview(&program.to_string_lossy()));
        let child = Command::new(program)
            .args(spec.run_args())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DevrouteError::EngineUnavailable {
                        message: format!("{} was not found", program.display()),
                        not_found: true,
                    }
                } else {
                    DevrouteError::Engine(format!("failed to start {}: {e}", spec.name))
                }
            })?;
        self.child = Some(child);
        Ok(())
    }

    fn wait(&mut self) -> Result<ProcessEvent> {
        let Some(child) = self.child.as_mut() else {
            return Err(DevrouteError::Engine("no process to wait for".into()));
        };
        loop {
            if let Some(status) = child.wait_timeout(self.poll)? {
                self.child = None;
                if signals::interrupted() {
                    return Ok(ProcessEvent::Interrupted);
                }
                return Ok(ProcessEvent::Exited(exit_code(status)));
            }
            if signals::interrupted() {
                // Give the engine a moment to shut the container down itself.
                if child.wait_timeout(self.grace)?.is_some() {
                    self.child = None;
                }
                return Ok(ProcessEvent::Interrupted);
            }
        }
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        let res = self.engine.stop(name);
        self.reap();
        res
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.reap();
        self.engine.remove(name)
    }
}
