use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

/// Stderr progress reporting for the CLI tools.
///
/// Pretty output needs a terminal on stderr. In `Auto` mode it is also
/// dropped when stdout is piped, so redirected runs stay log-friendly.
#[derive(Clone, Copy, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, stderr_is_tty: bool, stdout_is_tty: bool) -> Self {
        let pretty = stderr_is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => stdout_is_tty,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Open-ended step; finishes with its elapsed time when dropped.
    pub fn stage(&self, name: &str) -> Stage {
        let bar = if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        Stage::new(name, bar, None)
    }

    /// Step over a known number of items.
    pub fn counted(&self, name: &str, total: u64) -> Stage {
        let bar = if self.pretty {
            let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(name.to_string());
            Some(bar)
        } else {
            eprintln!("==> {} ({} items)", name, total);
            None
        };
        Stage::new(name, bar, Some(total))
    }
}

pub struct Stage {
    name: String,
    start: Instant,
    bar: Option<ProgressBar>,
    done: u64,
    total: Option<u64>,
}

impl Stage {
    fn new(name: &str, bar: Option<ProgressBar>, total: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            bar,
            done: 0,
            total,
        }
    }

    pub fn tick(&mut self) {
        self.done += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        let elapsed = format_elapsed(self.start.elapsed());
        let message = match self.total {
            Some(total) => format!("✔ {} {}/{} ({})", self.name, self.done, total, elapsed),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
