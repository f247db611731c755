//! Live progress display
//!
//! The [`Reporter`] consumes the event bus of a channel-backed
//! [`GlobalContext`](crate::runner::GlobalContext) on its own thread and
//! renders the action tree as it runs, nesting output under the action that
//! produced it.

use crate::runner::{Event, EventKind};
use colored::Colorize;
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

/// Renders events as an indented tree
pub struct Reporter<W: Write> {
    out: W,
    depth: usize,
    /// Output not yet terminated by a newline
    pending: String,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Reporter {
            out,
            depth: 0,
            pending: String::new(),
        }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }

    /// Render one event
    pub fn handle(&mut self, event: &Event) -> io::Result<()> {
        match event.kind {
            EventKind::Start => {
                self.flush_pending()?;
                let indent = self.indent();
                writeln!(
                    self.out,
                    "{}{} {}",
                    indent,
                    "▶".cyan().bold(),
                    event.message.bold()
                )?;
                self.depth += 1;
            }
            EventKind::Output => {
                self.pending.push_str(&event.message);
                let indent = self.indent();
                while let Some(newline) = self.pending.find('\n') {
                    let line: String = self.pending.drain(..=newline).collect();
                    write!(self.out, "{}{}", indent, line)?;
                }
            }
            EventKind::Finish => {
                self.flush_pending()?;
                self.depth = self.depth.saturating_sub(1);
                let indent = self.indent();
                writeln!(
                    self.out,
                    "{}{} {} {}",
                    indent,
                    "✓".green().bold(),
                    event.message,
                    format!("{:.1}s", event.duration.as_secs_f64()).dimmed()
                )?;
            }
        }
        self.out.flush()
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            let indent = self.indent();
            writeln!(self.out, "{}{}", indent, line)?;
        }
        Ok(())
    }

    /// Drain `events` until every sender is gone
    ///
    /// Write failures are logged and the loop keeps receiving, so the
    /// producing thread is never left blocked on a dead display.
    pub fn run(mut self, events: Receiver<Event>) -> W {
        for event in events {
            if let Err(e) = self.handle(&event) {
                log::warn!("failed to render event: {}", e);
            }
        }
        if let Err(e) = self.flush_pending().and_then(|_| self.out.flush()) {
            log::warn!("failed to render event: {}", e);
        }
        self.out
    }
}

/// Start a reporter writing to stdout on a second thread
pub fn spawn_reporter(events: Receiver<Event>) -> JoinHandle<()> {
    thread::spawn(move || {
        Reporter::new(io::stdout()).run(events);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::GlobalContext;
    use std::time::Duration;

    fn render(events: &[Event]) -> String {
        colored::control::set_override(false);
        let mut reporter = Reporter::new(Vec::new());
        for event in events {
            reporter.handle(event).unwrap();
        }
        reporter.flush_pending().unwrap();
        String::from_utf8(reporter.out).unwrap()
    }

    #[test]
    fn test_nested_rendering() {
        let output = render(&[
            Event::start("build"),
            Event::start("lib.fmt"),
            Event::output("formatted\n"),
            Event::finish("lib.fmt", Duration::from_millis(200)),
            Event::output("built\n"),
            Event::finish("build", Duration::from_millis(1500)),
        ]);

        assert_eq!(
            output,
            "▶ build\n  ▶ lib.fmt\n    formatted\n  ✓ lib.fmt 0.2s\n  built\n✓ build 1.5s\n"
        );
    }

    #[test]
    fn test_partial_lines_joined() {
        let output = render(&[
            Event::start("a"),
            Event::output("hel"),
            Event::output("lo\nwor"),
            Event::finish("a", Duration::ZERO),
        ]);

        assert_eq!(output, "▶ a\n  hello\n  wor\n✓ a 0.0s\n");
    }

    #[test]
    fn test_reporter_thread_drains_channel() {
        colored::control::set_override(false);
        let (ctx, events) = GlobalContext::channel();
        let handle = thread::spawn(move || Reporter::new(Vec::new()).run(events));

        ctx.emit(Event::start("a"));
        ctx.emit(Event::output("x\n"));
        ctx.emit(Event::finish("a", Duration::ZERO));
        ctx.done();

        let out = String::from_utf8(handle.join().unwrap()).unwrap();
        assert_eq!(out, "▶ a\n  x\n✓ a 0.0s\n");
    }
}
