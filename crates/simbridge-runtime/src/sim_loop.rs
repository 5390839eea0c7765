//! [`SimulationLoop`] – the fixed-rate driver.
//!
//! Each tick:
//!
//! 1. **Read** – take one snapshot of [`ActionState`]; the whole tick uses it.
//! 2. **Step** – advance the engine with that action.
//! 3. **Render** – grab the camera frame.  This happens every tick, including
//!    the tick whose step finished the episode, so the frame shows the state
//!    the step left behind.
//! 4. **Reset** – only when the step reported `done`.  The next tick steps the
//!    fresh episode.
//! 5. **Emit** – hand the frame to the [`FrameEmitter`].
//! 6. **Sleep** – wait for the next tick boundary ([`Rate`]).
//!
//! Any engine failure, encoding failure or fatal transport failure ends the
//! loop with that error.  Shutdown is cooperative: [`StopHandle::stop`] flips
//! a flag the loop checks once per tick boundary, so an in-flight tick always
//! runs to completion.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use simbridge_hal::SimulationEngine;
use simbridge_types::{ActionVector, BridgeError};
use tracing::{debug, debug_span, error, info};

use crate::action_state::ActionState;
use crate::emitter::FrameEmitter;
use crate::rate::Rate;

// ─────────────────────────────────────────────────────────────────────────────
// Stop flag
// ─────────────────────────────────────────────────────────────────────────────

/// Shared cooperative stop flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to exit at its next tick boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimulationLoop
// ─────────────────────────────────────────────────────────────────────────────

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Zero-based tick number.
    pub tick: u64,
    /// The action snapshot the engine was stepped with.
    pub action: ActionVector,
    pub reward: f64,
    /// The step ended the episode and the engine was reset.
    pub reset: bool,
    /// Subscribers the frame was delivered to.
    pub receivers: usize,
}

/// Owns the engine and drives it at a fixed rate.
pub struct SimulationLoop<E: SimulationEngine> {
    engine: E,
    state: ActionState,
    emitter: FrameEmitter,
    rate: Rate,
    stop: StopHandle,
    ticks: u64,
    episodes_completed: u64,
}

impl<E: SimulationEngine> SimulationLoop<E> {
    pub fn new(
        engine: E,
        state: ActionState,
        emitter: FrameEmitter,
        rate: Rate,
        stop: StopHandle,
    ) -> Self {
        Self {
            engine,
            state,
            emitter,
            rate,
            stop,
            ticks: 0,
            episodes_completed: 0,
        }
    }

    /// A handle that stops this loop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one tick without sleeping.
    ///
    /// # Errors
    ///
    /// Propagates engine, encoding and fatal transport errors unchanged.
    pub fn tick(&mut self) -> Result<TickReport, BridgeError> {
        let tick = self.ticks;
        let span = debug_span!("tick", tick);
        let _enter = span.enter();

        let action = self.state.read();
        let outcome = self.engine.step(action)?;
        let frame = self.engine.render()?;

        if outcome.done {
            info!(
                tick,
                step = outcome.info.step,
                episode = outcome.info.episode,
                reward = outcome.reward,
                "episode finished; resetting engine"
            );
            self.engine.reset()?;
            self.episodes_completed += 1;
        }

        let receivers = self.emitter.emit(frame)?;
        self.ticks += 1;
        debug!(
            left = action.left,
            right = action.right,
            reward = outcome.reward,
            receivers,
            "tick complete"
        );

        Ok(TickReport {
            tick,
            action,
            reward: outcome.reward,
            reset: outcome.done,
            receivers,
        })
    }

    /// Tick at the configured rate until stopped or a tick fails.
    ///
    /// Returns the number of completed ticks.
    ///
    /// # Errors
    ///
    /// The first error any tick produces.
    pub fn run(&mut self) -> Result<u64, BridgeError> {
        info!(
            period_ms = self.rate.period().as_secs_f64() * 1e3,
            topic = self.emitter.topic(),
            "simulation loop started"
        );
        self.rate.reset();
        while !self.stop.is_stopped() {
            if let Err(e) = self.tick() {
                error!(tick = self.ticks, error = %e, "simulation loop aborted");
                return Err(e);
            }
            self.rate.sleep();
        }
        info!(
            ticks = self.ticks,
            episodes = self.episodes_completed,
            "simulation loop stopped"
        );
        Ok(self.ticks)
    }
}

impl<E: SimulationEngine> std::fmt::Debug for SimulationLoop<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("emitter", &self.emitter)
            .field("rate", &self.rate)
            .field("ticks", &self.ticks)
            .field("episodes_completed", &self.episodes_completed)
            .finish_non_exhaustive()
    }
}
