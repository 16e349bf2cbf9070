//! Mission scheduler: owns a linked program and drives its director hooks.

use mscript_ast::ast::Program;
use tracing::{debug, warn};

use crate::eval::{Env, Interpreter, RuntimeError};
use crate::host::{HostRegistry, TraceEmitter};

/// Module holding the scheduler hooks.
pub const DIRECTOR: &str = "director";

const INIT_HOOK: &str = "initgame";
const TICK_HOOK: &str = "gameloop";
const END_HOOK: &str = "endgame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    Loaded,
    Running,
    Finished,
    Failed,
}

impl MissionState {
    pub fn name(self) -> &'static str {
        match self {
            MissionState::Loaded => "loaded",
            MissionState::Running => "running",
            MissionState::Finished => "finished",
            MissionState::Failed => "failed",
        }
    }
}

/// A loaded mission. Exclusively owned; move it to another thread to run
/// it there.
pub struct Mission {
    program: Program,
    host: HostRegistry,
    env: Env,
    tracer: TraceEmitter,
    state: MissionState,
    ticks: u64,
}

impl std::fmt::Debug for Mission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mission")
            .field("name", &self.program.name)
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl Mission {
    /// Load `program` and initialize module globals in declaration order.
    pub fn load(program: Program, host: HostRegistry) -> Result<Self, RuntimeError> {
        Self::load_traced(program, host, TraceEmitter::disabled())
    }

    /// Like [`Mission::load`], recording every host call on `tracer`.
    pub fn load_traced(
        program: Program,
        host: HostRegistry,
        mut tracer: TraceEmitter,
    ) -> Result<Self, RuntimeError> {
        let mut env = Env::new();
        let init = Interpreter::new(&host, &mut tracer)
            .with_program(&program)
            .init_globals(&mut env);
        if let Err(e) = init {
            warn!(mission = ?program.name, error = %e, "mission failed to load");
            finalize(&mut tracer, MissionState::Failed);
            return Err(e);
        }
        debug!(mission = ?program.name, modules = program.modules.len(), "mission loaded");
        Ok(Self {
            program,
            host,
            env,
            tracer,
            state: MissionState::Loaded,
            ticks: 0,
        })
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Number of completed `tick` calls.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run `director.initgame` (if present) and enter the running state.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        self.expect_state("start", MissionState::Loaded)?;
        self.run_hook(INIT_HOOK)?;
        self.state = MissionState::Running;
        Ok(())
    }

    /// Run `director.gameloop` once.
    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        self.expect_state("tick", MissionState::Running)?;
        self.run_hook(TICK_HOOK)?;
        self.ticks += 1;
        Ok(())
    }

    /// Run `director.endgame` (if present) and close the trace.
    pub fn finish(&mut self) -> Result<(), RuntimeError> {
        self.expect_state("finish", MissionState::Running)?;
        self.run_hook(END_HOOK)?;
        self.state = MissionState::Finished;
        finalize(&mut self.tracer, MissionState::Finished);
        debug!(mission = ?self.program.name, ticks = self.ticks, "mission finished");
        Ok(())
    }

    fn expect_state(&self, op: &'static str, expected: MissionState) -> Result<(), RuntimeError> {
        match self.state {
            MissionState::Failed => Err(RuntimeError::MissionHalted),
            s if s == expected => Ok(()),
            s => Err(RuntimeError::InvalidState { op, state: s.name() }),
        }
    }

    fn run_hook(&mut self, hook: &str) -> Result<(), RuntimeError> {
        let has_hook = self
            .program
            .module(DIRECTOR)
            .and_then(|m| m.script(hook))
            .is_some();
        if !has_hook {
            debug!(hook, "no director hook, skipping");
            return Ok(());
        }

        let result = Interpreter::new(&self.host, &mut self.tracer)
            .with_program(&self.program)
            .call_script(&mut self.env, DIRECTOR, hook, Vec::new());
        match result {
            // hook results are discarded
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(mission = ?self.program.name, hook, error = %e, "mission halted");
                self.state = MissionState::Failed;
                finalize(&mut self.tracer, MissionState::Failed);
                Err(e)
            }
        }
    }
}

fn finalize(tracer: &mut TraceEmitter, state: MissionState) {
    if let Err(e) = tracer.finalize(state.name()) {
        warn!(error = %e, "could not close call trace");
    }
}
