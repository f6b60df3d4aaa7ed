//! Per-tick timing instrumentation.
//!
//! Each engine tick is split into detect (pull the latest landmark frame),
//! process (normalize → stabilize → gesture → consumer) and publish
//! (snapshot + event broadcast).  Rolling windows of each phase feed the
//! `engine-timing` IPC query.

use std::collections::VecDeque;

/// Rolling tick timing statistics over a window of samples.
#[derive(Debug)]
pub struct FrameTiming {
    detect_times: VecDeque<f64>,
    process_times: VecDeque<f64>,
    publish_times: VecDeque<f64>,
    total_times: VecDeque<f64>,
    /// Wall-clock gap between consecutive tick starts.
    intervals: VecDeque<f64>,
    window_size: usize,
    last_tick_start_ms: Option<f64>,
    pub total_ticks: u64,
    /// Ticks whose work exceeded the frame budget.
    pub over_budget: u64,
    /// Frame budget in milliseconds (16.7 at 60 fps).
    pub budget_ms: f64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::for_fps(crate::config::DEFAULT_FPS)
    }
}

impl FrameTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            detect_times: VecDeque::with_capacity(window_size),
            process_times: VecDeque::with_capacity(window_size),
            publish_times: VecDeque::with_capacity(window_size),
            total_times: VecDeque::with_capacity(window_size),
            intervals: VecDeque::with_capacity(window_size),
            window_size,
            last_tick_start_ms: None,
            total_ticks: 0,
            over_budget: 0,
            budget_ms,
        }
    }

    /// Ten seconds of samples with the budget of one frame interval.
    pub fn for_fps(fps: u32) -> Self {
        let fps = fps.max(1);
        Self::new(fps as usize * 10, 1000.0 / fps as f64)
    }

    /// Record one tick.  `start_ms` is the tick's start on a monotonic clock.
    pub fn record_tick(&mut self, start_ms: f64, detect_ms: f64, process_ms: f64, publish_ms: f64) {
        let total = detect_ms + process_ms + publish_ms;
        let window = self.window_size;
        push_sample(&mut self.detect_times, detect_ms, window);
        push_sample(&mut self.process_times, process_ms, window);
        push_sample(&mut self.publish_times, publish_ms, window);
        push_sample(&mut self.total_times, total, window);
        if let Some(prev) = self.last_tick_start_ms.replace(start_ms) {
            let gap = start_ms - prev;
            if gap > 0.0 {
                push_sample(&mut self.intervals, gap, window);
            }
        }

        self.total_ticks += 1;
        if total > self.budget_ms {
            self.over_budget += 1;
        }
    }

    pub fn samples(&self) -> usize {
        self.total_times.len()
    }

    pub fn stats(&self) -> FrameTimingStats {
        let detect = sorted(&self.detect_times);
        let process = sorted(&self.process_times);
        let publish = sorted(&self.publish_times);
        let total = sorted(&self.total_times);
        let intervals = sorted(&self.intervals);
        let interval_p50 = percentile(&intervals, 50.0);

        FrameTimingStats {
            detect_p50: percentile(&detect, 50.0),
            detect_p99: percentile(&detect, 99.0),
            process_p50: percentile(&process, 50.0),
            process_p99: percentile(&process, 99.0),
            publish_p50: percentile(&publish, 50.0),
            publish_p99: percentile(&publish, 99.0),
            total_p50: percentile(&total, 50.0),
            total_p95: percentile(&total, 95.0),
            total_p99: percentile(&total, 99.0),
            fps: if interval_p50 > 0.0 {
                1000.0 / interval_p50
            } else {
                0.0
            },
            over_budget_pct: if self.total_ticks > 0 {
                (self.over_budget as f64 / self.total_ticks as f64) * 100.0
            } else {
                0.0
            },
            total_ticks: self.total_ticks,
            over_budget: self.over_budget,
        }
    }

    /// Format stats as an s-expression for IPC.
    pub fn stats_sexp(&self) -> String {
        let s = self.stats();
        format!(
            "(:detect-p50 {:.2} :process-p50 {:.2} :publish-p50 {:.2} :total-p50 {:.2} :total-p99 {:.2} :budget-ms {:.1} :over-budget-pct {:.1} :fps {:.0} :ticks {} :over-budget {})",
            s.detect_p50,
            s.process_p50,
            s.publish_p50,
            s.total_p50,
            s.total_p99,
            self.budget_ms,
            s.over_budget_pct,
            s.fps,
            s.total_ticks,
            s.over_budget,
        )
    }
}

fn push_sample(samples: &mut VecDeque<f64>, value: f64, window_size: usize) {
    if !value.is_finite() {
        return;
    }
    samples.push_back(value);
    while samples.len() > window_size {
        samples.pop_front();
    }
}

fn sorted(samples: &VecDeque<f64>) -> Vec<f64> {
    let mut v: Vec<f64> = samples.iter().copied().collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Nearest-rank percentile of a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Computed tick timing statistics.
#[derive(Debug, Clone)]
pub struct FrameTimingStats {
    pub detect_p50: f64,
    pub detect_p99: f64,
    pub process_p50: f64,
    pub process_p99: f64,
    pub publish_p50: f64,
    pub publish_p99: f64,
    pub total_p50: f64,
    pub total_p95: f64,
    pub total_p99: f64,
    pub fps: f64,
    pub over_budget_pct: f64,
    pub total_ticks: u64,
    pub over_budget: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let ft = FrameTiming::for_fps(60);
        let stats = ft.stats();
        assert_eq!(stats.total_ticks, 0);
        assert_eq!(stats.fps, 0.0);
        assert!((ft.budget_ms - 16.67).abs() < 0.01);
    }

    #[test]
    fn test_record_tick() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_tick(0.0, 1.0, 3.0, 0.5);
        assert_eq!(ft.total_ticks, 1);
        assert_eq!(ft.over_budget, 0);
        assert!((ft.stats().total_p50 - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_over_budget_detection() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_tick(0.0, 5.0, 10.0, 2.0);
        assert_eq!(ft.over_budget, 1);
        ft.record_tick(16.7, 1.0, 1.0, 1.0);
        assert_eq!(ft.over_budget, 1);
        assert_eq!(ft.total_ticks, 2);
    }

    #[test]
    fn test_fps_from_intervals() {
        let mut ft = FrameTiming::new(100, 16.7);
        for i in 0..10 {
            ft.record_tick(i as f64 * 20.0, 0.1, 0.1, 0.1);
        }
        assert!((ft.stats().fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_trim_and_nan() {
        let mut ft = FrameTiming::new(5, 16.7);
        for i in 0..10 {
            ft.record_tick(i as f64, i as f64, 1.0, 0.5);
        }
        assert_eq!(ft.samples(), 5);
        assert_eq!(ft.total_ticks, 10);
        ft.record_tick(20.0, f64::NAN, 1.0, 1.0);
        assert_eq!(ft.samples(), 5);
    }

    #[test]
    fn test_stats_sexp_format() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_tick(0.0, 2.0, 3.0, 0.5);
        let sexp = ft.stats_sexp();
        assert!(sexp.starts_with("(:detect-p50"));
        assert!(sexp.contains(":ticks 1"));
        assert!(lexpr::from_str(&sexp).is_ok());
    }
}
