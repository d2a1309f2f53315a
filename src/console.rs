//! Operator-facing progress output and interactive burst selection

use std::io::{self, BufRead, Write};

use crate::session::{BurstChooser, SessionObserver};

/// How many leading durations to show in previews
pub const PREVIEW_LEN: usize = 8;

fn preview(durations: &[u32]) -> &[u32] {
    &durations[..durations.len().min(PREVIEW_LEN)]
}

/// Prints per-burst progress lines
pub struct ConsoleObserver<W> {
    out: W,
}

impl ConsoleObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SessionObserver for ConsoleObserver<W> {
    fn burst_started(&mut self, index: usize, total: usize) {
        let _ = writeln!(self.out, "Capture #{}/{} ...", index + 1, total);
        let _ = self.out.flush();
    }

    fn burst_captured(&mut self, _index: usize, durations: &[u32]) {
        let _ = writeln!(
            self.out,
            "Captured {} durations (first: {:?})",
            durations.len(),
            preview(durations)
        );
    }

    fn burst_empty(&mut self, _index: usize) {
        let _ = writeln!(self.out, "No signal captured (timeout).");
    }
}

/// Interpret an operator's answer; blank, garbage and out-of-range all mean 0
pub fn parse_choice(answer: &str, count: usize) -> usize {
    match answer.trim().parse::<usize>() {
        Ok(index) if index < count => index,
        _ => 0,
    }
}

/// Asks the operator which burst to keep
pub struct PromptChooser<R, W> {
    input: R,
    out: W,
}

impl PromptChooser<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self {
            input: io::stdin().lock(),
            out: io::stdout(),
        }
    }
}

impl<R: BufRead, W: Write> PromptChooser<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn prompt(&mut self, candidates: &[Vec<u32>]) -> io::Result<usize> {
        writeln!(
            self.out,
            "{} bursts captured. Choose one to save (0-{}):",
            candidates.len(),
            candidates.len() - 1
        )?;
        for (index, durations) in candidates.iter().enumerate() {
            writeln!(
                self.out,
                "[{}] durations={} first{}={:?}",
                index,
                durations.len(),
                PREVIEW_LEN,
                preview(durations)
            )?;
        }
        write!(self.out, "Choose index (default 0): ")?;
        self.out.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(parse_choice(&answer, candidates.len()))
    }
}

impl<R: BufRead, W: Write> BurstChooser for PromptChooser<R, W> {
    fn choose(&mut self, candidates: &[Vec<u32>]) -> usize {
        self.prompt(candidates).unwrap_or_else(|e| {
            tracing::debug!("Burst prompt failed ({}), using 0", e);
            0
        })
    }
}
