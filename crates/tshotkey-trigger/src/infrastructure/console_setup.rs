//! Interactive setup ritual on the console.
//!
//! Binding a hotkey in the control application works by letting the
//! application "listen" for the next button press.  The ritual gives the
//! human time to start listening before the press is sent:
//!
//! ```text
//! prepare()                 banner, wait for ENTER (application open?)
//! announce_auth_request()   "accept the authorization request"
//! perform("toggle.mute")    instructions, wait for ENTER,
//!                           10... 9... ... 1..., "triggering: toggle.mute"
//! ```
//!
//! Every step blocks the calling thread on purpose.

use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::thread;
use std::time::Duration;

use tshotkey_core::domain::session::{SetupError, SetupInteraction};
use tshotkey_core::protocol::messages::CLIENT_NAME;

/// Console-driven [`SetupInteraction`] over any reader and writer.
pub struct ConsoleSetup<R, W> {
    input: R,
    output: W,
    countdown_secs: u64,
    tick: Duration,
}

impl ConsoleSetup<StdinLock<'static>, Stdout> {
    /// A ritual on the process's stdin and stdout.
    pub fn stdio(countdown: Duration) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), countdown)
    }
}

impl<R: BufRead, W: Write> ConsoleSetup<R, W> {
    /// A ritual reading from `input` and printing to `output`, counting down
    /// `countdown` in one-second steps.
    pub fn new(input: R, output: W, countdown: Duration) -> Self {
        Self {
            input,
            output,
            countdown_secs: countdown.as_secs(),
            tick: Duration::from_secs(1),
        }
    }

    /// Overrides the length of one countdown step.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Consumes the ritual, returning the writer.
    pub fn into_output(self) -> W {
        self.output
    }

    fn wait_for_enter(&mut self) -> Result<(), SetupError> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(SetupError::Aborted("input closed".to_string()));
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> SetupInteraction for ConsoleSetup<R, W> {
    fn prepare(&mut self) -> Result<(), SetupError> {
        writeln!(self.output, "=== tshotkeytrigger setup ===")?;
        writeln!(
            self.output,
            "Make sure the control application is running, then press ENTER to connect."
        )?;
        self.wait_for_enter()
    }

    fn announce_auth_request(&mut self) {
        // Best effort: a broken stdout must not fail the run here.
        let _ = writeln!(
            self.output,
            "If the application asks, accept the authorization request from \"{CLIENT_NAME}\"."
        );
        let _ = self.output.flush();
    }

    fn perform(&mut self, button_id: &str) -> Result<(), SetupError> {
        writeln!(self.output, "Authorized.")?;
        writeln!(
            self.output,
            "In the application, start assigning a hotkey and let it wait for input."
        )?;
        writeln!(
            self.output,
            "Press ENTER to start a {}-second countdown; '{button_id}' is pressed when it ends.",
            self.countdown_secs
        )?;
        self.wait_for_enter()?;

        for remaining in (1..=self.countdown_secs).rev() {
            writeln!(self.output, "{remaining}...")?;
            self.output.flush()?;
            thread::sleep(self.tick);
        }
        writeln!(self.output, "triggering: {button_id}")?;
        self.output.flush()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
