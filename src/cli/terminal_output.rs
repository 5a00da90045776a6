//! Live terminal display of a pipeline run
//!
//! [`TerminalReporter`] is registered as an engine event handler. It prints
//! a `[N/M] Stage` header per stage, a spinner while build and deploy
//! actions run, and one line per notable event.

use crate::cli::output::{create_spinner, format_execution_event};
use crate::execution::ExecutionEvent;
use console::style;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Prints engine events as they arrive
pub struct TerminalReporter {
    stage_number: AtomicUsize,
    total_stages: usize,
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    pub fn new(total_stages: usize) -> Self {
        Self {
            stage_number: AtomicUsize::new(0),
            total_stages,
            spinner: Mutex::new(None),
        }
    }

    /// Handle one engine event
    pub fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StageStarted { stage, .. } => {
                self.finish_spinner();
                let number = self.stage_number.fetch_add(1, Ordering::SeqCst) + 1;
                self.print_separator();
                self.print_stage_header(number, stage);
            }
            ExecutionEvent::ActionStarted {
                stage, action, kind, ..
            } if *kind == "build" || *kind == "deploy" => {
                self.println(format_execution_event(event));
                self.start_spinner(format!("{}/{}", stage, action));
            }
            ExecutionEvent::ApprovalRequested { .. }
            | ExecutionEvent::StageSucceeded { .. }
            | ExecutionEvent::StageFailed { .. }
            | ExecutionEvent::RunFinished { .. } => {
                self.finish_spinner();
                self.println(format_execution_event(event));
            }
            _ => self.println(format_execution_event(event)),
        }
    }

    /// Stages started so far
    pub fn stages_seen(&self) -> usize {
        self.stage_number.load(Ordering::SeqCst)
    }

    fn print_stage_header(&self, number: usize, stage: &str) {
        println!(
            "[{} / {}] {}",
            style(number).cyan(),
            style(self.total_stages).dim(),
            style(stage).bold()
        );
    }

    /// A horizontal rule spanning the terminal width
    fn print_separator(&self) {
        let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    /// Print without tearing an active spinner
    fn println(&self, line: String) {
        match self.spinner.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(spinner) => spinner.println(line),
                None => println!("{}", line),
            },
            Err(_) => println!("{}", line),
        }
    }

    fn start_spinner(&self, message: String) {
        if let Ok(mut guard) = self.spinner.lock() {
            if let Some(previous) = guard.take() {
                previous.finish_and_clear();
            }
            *guard = Some(create_spinner(message));
        }
    }

    fn finish_spinner(&self) {
        if let Ok(mut guard) = self.spinner.lock() {
            if let Some(spinner) = guard.take() {
                spinner.finish_and_clear();
            }
        }
    }
}
