//! Shared run state
//!
//! A [`GlobalContext`] is built once per invocation and passed by reference
//! into every action, command, var and skip evaluation. It owns the output
//! sink and the settings of the process boundary (interpreter and stdin).
//! Processes run in the invoking process's working directory.

use colored::Colorize;
use std::io::{self, Write};
use std::process::{Command as StdCommand, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::time::Duration;

/// Kind of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Finish,
    Output,
}

/// A progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Qualified action name for start/finish, written text for output
    pub message: String,
    /// Time the action took; zero for anything but finish
    pub duration: Duration,
}

impl Event {
    pub fn start(action: &str) -> Self {
        Event {
            kind: EventKind::Start,
            message: action.to_string(),
            duration: Duration::ZERO,
        }
    }

    pub fn finish(action: &str, duration: Duration) -> Self {
        Event {
            kind: EventKind::Finish,
            message: action.to_string(),
            duration,
        }
    }

    pub fn output(text: impl Into<String>) -> Self {
        Event {
            kind: EventKind::Output,
            message: text.into(),
            duration: Duration::ZERO,
        }
    }
}

/// Where events and process output go
#[derive(Debug)]
pub enum Sink {
    /// Processes inherit the terminal; start/finish banners go to stderr
    Passthrough,
    /// Everything, process output included, is sent over a rendezvous channel
    Channel(SyncSender<Event>),
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// What child processes read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Inherit,
    Null,
}

/// Process-wide state of one run
#[derive(Debug)]
pub struct GlobalContext {
    sink: Sink,
    stdin: StdinMode,
    /// Interpreter and its leading arguments, e.g. `["sh", "-c"]`
    interpreter: Vec<String>,
    verbosity: Verbosity,
}

impl GlobalContext {
    /// Create a context that writes straight to the terminal
    pub fn new() -> Self {
        GlobalContext {
            sink: Sink::Passthrough,
            stdin: StdinMode::Inherit,
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            verbosity: Verbosity::Normal,
        }
    }

    /// Create a channel-backed context and the receiving end of its bus
    ///
    /// The channel has no buffer: every emit blocks until the consumer
    /// receives it, so a consumer must be draining before anything runs.
    pub fn channel() -> (Self, Receiver<Event>) {
        let (sender, receiver) = mpsc::sync_channel(0);
        let ctx = GlobalContext {
            sink: Sink::Channel(sender),
            ..GlobalContext::new()
        };
        (ctx, receiver)
    }

    /// Set what child processes read from
    pub fn with_stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_channel(&self) -> bool {
        matches!(self.sink, Sink::Channel(_))
    }

    /// Stdin configuration for a child process
    pub fn stdin(&self) -> Stdio {
        match self.stdin {
            StdinMode::Inherit => Stdio::inherit(),
            StdinMode::Null => Stdio::null(),
        }
    }

    /// Build an interpreter invocation for `script`
    ///
    /// Returns `None` when the interpreter is empty.
    pub fn shell_command(&self, script: &str) -> Option<StdCommand> {
        let (program, leading) = self.interpreter.split_first()?;
        let mut command = StdCommand::new(program);
        command.args(leading).arg(script);
        Some(command)
    }

    /// Send an event to the sink
    ///
    /// In channel mode this blocks until the consumer takes the event. A
    /// consumer that has gone away is not an error for the run itself.
    pub fn emit(&self, event: Event) {
        match &self.sink {
            Sink::Channel(sender) => {
                if sender.send(event).is_err() {
                    log::debug!("event consumer has hung up");
                }
            }
            Sink::Passthrough => self.print_event(&event),
        }
    }

    fn print_event(&self, event: &Event) {
        match event.kind {
            EventKind::Output if self.verbosity == Verbosity::Silent => {}
            EventKind::Output => {
                let mut stdout = io::stdout().lock();
                if let Err(e) = stdout
                    .write_all(event.message.as_bytes())
                    .and_then(|_| stdout.flush())
                {
                    log::warn!("failed to write output: {}", e);
                }
            }
            _ if self.verbosity < Verbosity::Normal => {}
            EventKind::Start => {
                eprintln!("{} {}", "▶".cyan().bold(), event.message.bold());
            }
            EventKind::Finish => {
                eprintln!(
                    "{} {} {}",
                    "✓".green().bold(),
                    event.message,
                    format!("{:.1}s", event.duration.as_secs_f64()).dimmed()
                );
            }
        }
    }

    /// Close the bus so the consumer loop can finish
    pub fn done(self) {
        drop(self);
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing to the context packages the bytes as an output event
impl Write for &GlobalContext {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(Event::output(String::from_utf8_lossy(buf).into_owned()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
