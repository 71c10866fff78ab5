use crate::aggregator::{AggregationUpdate, Aggregator, GenerationResult};
use std::io::{self, Write};
use std::time::Duration;
use tokio_stream::StreamExt;

const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Print text to `out` as it grows.
    Text,
    /// Progress bar on `status`; text printed once at the end.
    Progress,
}

/// Terminal display of one generation session.
pub struct Renderer<O: Write, E: Write> {
    mode: RenderMode,
    out: O,
    status: E,
    printed: usize,
    last_percent: Option<u32>,
}

impl<O: Write, E: Write> Renderer<O, E> {
    pub fn new(mode: RenderMode, out: O, status: E) -> Self {
        Self {
            mode,
            out,
            status,
            printed: 0,
            last_percent: None,
        }
    }

    /// Render every update and hand back the terminal result.
    pub async fn drive(&mut self, mut agg: Aggregator) -> io::Result<Option<GenerationResult>> {
        while let Some(update) = agg.next().await {
            match update {
                AggregationUpdate::Progress {
                    text,
                    progress,
                    elapsed,
                } => self.progress(&text, progress, elapsed)?,
                AggregationUpdate::Done { result, elapsed } => {
                    self.done(&result, elapsed)?;
                    return Ok(Some(result));
                }
            }
        }
        Ok(None)
    }

    pub fn progress(&mut self, text: &str, progress: f64, elapsed: Duration) -> io::Result<()> {
        match self.mode {
            RenderMode::Text => self.print_new_text(text),
            RenderMode::Progress => {
                let percent = (progress * 100.0).floor() as u32;
                if self.last_percent == Some(percent) {
                    return Ok(());
                }
                self.last_percent = Some(percent);
                write!(
                    self.status,
                    "\r{} {percent:>3}% generating... {:.1}s",
                    bar(progress),
                    elapsed.as_secs_f64()
                )?;
                self.status.flush()
            }
        }
    }

    pub fn done(&mut self, result: &GenerationResult, elapsed: Duration) -> io::Result<()> {
        if self.mode == RenderMode::Progress {
            if result.is_success() {
                writeln!(self.status, "\r{} 100% done          ", bar(1.0))?;
            } else if self.last_percent.is_some() {
                writeln!(self.status)?;
            }
        }

        self.print_new_text(result.text())?;
        if !result.text().is_empty() && !result.text().ends_with('\n') {
            writeln!(self.out)?;
        }
        self.out.flush()?;

        let secs = elapsed.as_secs_f64();
        match result {
            GenerationResult::Success { metadata, .. } => writeln!(
                self.status,
                "done in {secs:.1}s | {} input / {} output tokens | est. cost ${:.4}",
                thousands(metadata.input_tokens),
                thousands(metadata.output_tokens),
                metadata.estimated_cost,
            )?,
            GenerationResult::Error {
                message,
                partial_text,
            } => writeln!(
                self.status,
                "generation failed after {secs:.1}s: {message} ({} chars of partial text kept)",
                partial_text.chars().count(),
            )?,
        }
        self.status.flush()
    }

    /// `text` only ever grows, so print the suffix past what is on screen.
    fn print_new_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(new) = text.get(self.printed..) {
            if !new.is_empty() {
                self.out.write_all(new.as_bytes())?;
                self.out.flush()?;
            }
            self.printed = text.len();
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.status)
    }
}

fn bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 1.0)) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
