//! Periodic terminal printer
//!
//! Prints status updates as they arrive on the update channel, tracking the
//! number of lines of the previous frame and clearing them before drawing
//! the next one.

use std::io::Write;

use tokio::sync::mpsc::Receiver;

use crate::eval::poller::StatusUpdate;
use crate::print::TablePrinter;
use crate::status::ObjectStatus;

pub struct PeriodicPrinter<W: Write> {
    printer: TablePrinter,
    out: W,
    previous_lines: usize,
}

impl<W: Write> PeriodicPrinter<W> {
    pub fn new(printer: TablePrinter, out: W) -> Self {
        PeriodicPrinter {
            printer,
            out,
            previous_lines: 0,
        }
    }

    /// Consume updates until the channel closes. The callback runs after
    /// each frame; the statuses of the final update are returned.
    pub async fn run(
        mut self,
        mut updates: Receiver<StatusUpdate>,
        mut on_update: impl FnMut(&[ObjectStatus]),
    ) -> Vec<ObjectStatus> {
        let mut last = Vec::new();

        while let Some(update) = updates.recv().await {
            self.reset_screen();

            let mut frame = String::new();
            if let Some(err) = &update.error {
                frame.push_str(&self.printer.render_error(err));
            }
            frame.push_str(&self.printer.render(&update.statuses));

            let _ = self.out.write_all(frame.as_bytes());
            let _ = self.out.flush();
            self.previous_lines = frame.matches('\n').count();

            on_update(&update.statuses);
            last = update.statuses;
        }

        last
    }

    fn reset_screen(&mut self) {
        for _ in 0..self.previous_lines {
            // Move up one line and erase it.
            let _ = write!(self.out, "\x1b[1A\x1b[2K\r");
        }
        let _ = self.out.flush();
    }
}
