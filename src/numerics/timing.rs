//! Wall-clock accounting of assembly and linear solves per equation,
//! compiled in with the `timing` feature and free otherwise.

#[cfg(feature = "timing")]
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Default, Clone, Debug)]
pub struct PhaseTimes {
    pub assembly: Vec<Duration>,
    pub solve: Vec<Duration>,
}

impl PhaseTimes {
    fn total(&self) -> Duration {
        self.assembly.iter().chain(&self.solve).sum()
    }
}

#[derive(Default, Clone, Debug)]
pub struct TimingStats {
    /// Keyed by equation name.
    pub equations: BTreeMap<String, PhaseTimes>,
    pub total_time: Duration,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl TimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounted(&self) -> Duration {
        self.equations.values().map(PhaseTimes::total).sum()
    }

    pub fn print_summary(&self) {
        if self.equations.is_empty() {
            return;
        }

        println!("\n{}", "=".repeat(60));
        println!("{:^60}", "SWEEP TIMING SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Total run time:                {:.3}s", self.total_time.as_secs_f64());
        println!("{}", "-".repeat(60));
        println!(
            "{:<12} | {:>6} | {:>12} | {:>12} | {:>9}",
            "Equation", "Calls", "Assembly ms", "Solve ms", "Avg ms"
        );
        println!("{}", "-".repeat(60));
        for (name, times) in &self.equations {
            let calls = times.assembly.len().max(times.solve.len()).max(1);
            println!(
                "{:<12} | {:>6} | {:>12.3} | {:>12.3} | {:>9.3}",
                name,
                calls,
                millis(times.assembly.iter().sum()),
                millis(times.solve.iter().sum()),
                millis(times.total()) / calls as f64
            );
        }
        println!("{}", "=".repeat(60));
        println!(
            "Overhead/Other:                {:>9.3}ms\n",
            millis(self.total_time.saturating_sub(self.accounted()))
        );
    }
}

#[cfg(feature = "timing")]
thread_local! {
    static TIMING_STATS: RefCell<TimingStats> = RefCell::new(TimingStats::new());
}

#[cfg(feature = "timing")]
fn record<F, R>(equation: &str, f: F, phase: fn(&mut PhaseTimes) -> &mut Vec<Duration>) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| {
        let mut stats = stats.borrow_mut();
        let times = stats.equations.entry(equation.to_string()).or_default();
        phase(times).push(elapsed);
    });
    result
}

#[cfg(feature = "timing")]
pub fn reset_timing() {
    TIMING_STATS.with(|stats| *stats.borrow_mut() = TimingStats::new());
}

#[cfg(not(feature = "timing"))]
pub fn reset_timing() {}

#[cfg(feature = "timing")]
pub fn record_assembly<F, R>(equation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    record(equation, f, |t| &mut t.assembly)
}

#[cfg(not(feature = "timing"))]
pub fn record_assembly<F, R>(_equation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_linear_solve<F, R>(equation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    record(equation, f, |t| &mut t.solve)
}

#[cfg(not(feature = "timing"))]
pub fn record_linear_solve<F, R>(_equation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.total_time = total_time;
        s.clone()
    })
}

#[cfg(not(feature = "timing"))]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TimingStats {
        total_time,
        ..TimingStats::new()
    }
}

/// Print the per-equation table; a no-op without the `timing` feature.
pub fn finalize_and_print(total_time: Duration) {
    finalize_timing(total_time).print_summary();
}
