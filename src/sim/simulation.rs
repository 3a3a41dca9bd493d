use crate::error::MigrationError;
use crate::mass_balance::{MassBalanceLedger, MassBalanceSink};
use crate::sim::layer::ReservoirLayer;
use crate::sim_op::{SimOp, SimOpHandle};
use colored::Colorize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct OpTiming {
    pub op_name: String,
    pub init_time: Duration,
    pub total_update_time: Duration,
    pub update_call_count: u32,
    pub after_time: Duration,
}

impl OpTiming {
    pub fn new(op_name: String) -> Self {
        Self {
            op_name,
            init_time: Duration::ZERO,
            total_update_time: Duration::ZERO,
            update_call_count: 0,
            after_time: Duration::ZERO,
        }
    }

    pub fn avg_update_time(&self) -> Duration {
        if self.update_call_count > 0 {
            self.total_update_time / self.update_call_count
        } else {
            Duration::ZERO
        }
    }

    pub fn total_time(&self) -> Duration {
        self.init_time + self.total_update_time + self.after_time
    }
}

/// Result of running the stages on one reservoir for one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub reservoir: String,
    pub start_age_ma: f64,
    pub end_age_ma: f64,
    pub ok: bool,
    /// Stage that failed, if any.
    pub failed_op: Option<String>,
    /// Wall time spent on the interval's stages.
    pub elapsed: Duration,
}

/// Runs the migration stages over a stack of reservoirs, one snapshot
/// interval per step.
pub struct Simulation {
    pub name: String,
    /// Deepest first.
    pub layers: Vec<ReservoirLayer>,
    /// Snapshot ages in Ma, oldest first.
    pub ages: Vec<f64>,
    pub ops: Vec<Box<dyn SimOp>>,
    pub sink: Box<dyn MassBalanceSink>,
    pub step: i32,
    /// Layer the ops work on during a step.
    pub layer: usize,
    pub debug: bool,
    pub op_timings: Vec<OpTiming>,
    pub outcomes: Vec<StageOutcome>,
    failure: Option<(String, MigrationError)>,
}

pub struct SimProps {
    pub name: &'static str,
    pub layers: Vec<ReservoirLayer>,
    pub ages: Vec<f64>,
    pub ops: Vec<SimOpHandle>,
    /// Receives every mass-balance record; a ledger when `None`.
    pub sink: Option<Box<dyn MassBalanceSink>>,
    pub debug: bool,
}

impl Simulation {
    pub fn new(props: SimProps) -> Simulation {
        let ops = props.ops.into_iter().map(|handle| handle.op).collect();
        let mut sim = Simulation {
            name: props.name.to_string(),
            layers: props.layers,
            ages: props.ages,
            ops,
            sink: props.sink.unwrap_or_else(|| Box::new(MassBalanceLedger::new())),
            step: -1,
            layer: 0,
            debug: props.debug,
            op_timings: Vec::new(),
            outcomes: Vec::new(),
            failure: None,
        };

        for op in &sim.ops {
            sim.op_timings.push(OpTiming::new(op.name().to_string()));
        }

        sim
    }

    /// Number of snapshot intervals.
    pub fn sim_steps(&self) -> i32 {
        self.ages.len().saturating_sub(1) as i32
    }

    /// Ages (Ma) bounding the current step.
    pub fn interval(&self) -> (f64, f64) {
        let step = self.step.max(1) as usize;
        (self.ages[step - 1], self.ages[step])
    }

    pub fn current_layer(&self) -> &ReservoirLayer {
        &self.layers[self.layer]
    }

    /// Layer below the current one, the source of leaked charge.
    pub fn layer_below(&self) -> Option<&ReservoirLayer> {
        self.layer.checked_sub(1).and_then(|below| self.layers.get(below))
    }

    /// Marks the current layer's interval as failed. The remaining ops
    /// skip it until the next step.
    pub fn fail(&mut self, op_name: &str, error: MigrationError) {
        log::error!(
            "{} on {} at {:?} Ma failed: {}",
            op_name,
            self.current_layer().name(),
            self.interval(),
            error
        );
        self.failure = Some((op_name.to_string(), error));
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.ok)
    }

    pub fn run(&mut self) {
        if self.step > -1 {
            panic!("Simulation.run can only execute once");
        }
        if self.ages.windows(2).any(|pair| pair[1] >= pair[0]) {
            panic!("snapshot ages must run from oldest to youngest: {:?}", self.ages);
        }
        self.step = 0;
        self.simulate_init();
        while self.step < self.sim_steps() {
            self.step += 1;
            self.simulate_step();
        }
        self.simulate_end();
        if self.debug {
            self.print_timing_report();
        }
    }

    fn simulate_init(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);

        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            op.init_sim(self);
            let elapsed = start.elapsed();
            self.op_timings[i].init_time = elapsed;
        }
        self.ops = ops;
    }

    fn simulate_end(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);

        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            op.after_sim(self);
            let elapsed = start.elapsed();
            self.op_timings[i].after_time = elapsed;
        }
        self.ops = ops;
    }

    /// Every op on every layer, deepest layer first, so leakage from below
    /// is complete before the layer above collects it.
    fn simulate_step(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);
        let (start_ma, end_ma) = self.interval();

        for layer in 0..self.layers.len() {
            self.layer = layer;
            self.failure = None;
            let interval_start = Instant::now();
            if let Err(error) = self.layers[layer].begin_interval(start_ma, end_ma) {
                self.fail("BeginInterval", error);
            }

            for (i, op) in ops.iter_mut().enumerate() {
                if self.failure.is_some() {
                    break;
                }
                let start = Instant::now();
                op.update_sim(self);
                let elapsed = start.elapsed();
                self.op_timings[i].total_update_time += elapsed;
                self.op_timings[i].update_call_count += 1;
            }

            let failed_op = self.failure.take().map(|(name, _)| name);
            self.outcomes.push(StageOutcome {
                reservoir: self.layers[layer].name().to_string(),
                start_age_ma: start_ma,
                end_age_ma: end_ma,
                ok: failed_op.is_none(),
                failed_op,
                elapsed: interval_start.elapsed(),
            });
        }
        self.ops = ops;
    }

    pub fn print_timing_report(&self) {
        let steps = self.sim_steps().max(1);
        println!("\n{}", "📊 === SIMULATION TIMING REPORT ===".bold());
        println!("🔄 Snapshot intervals: {}", steps);
        println!("🪨 Reservoirs: {}", self.layers.len());
        println!();

        let mut total_time = Duration::ZERO;
        for timing in &self.op_timings {
            total_time += timing.total_time();
        }

        println!("{}", "📈 PER-OPERATION BREAKDOWN:".bold());
        for timing in &self.op_timings {
            let total_op_time = timing.total_time();
            let percentage = if total_time.as_micros() > 0 {
                (total_op_time.as_micros() as f64 / total_time.as_micros() as f64) * 100.0
            } else {
                0.0
            };

            println!(
                "  🔧 {:<25} | Total: {:>8.2}ms | Avg/step: {:>8.2}ms | Init: {:>6.2}ms | After: {:>6.2}ms | Share: {:>5.1}%",
                timing.op_name.cyan(),
                total_op_time.as_secs_f64() * 1000.0,
                timing.avg_update_time().as_secs_f64() * 1000.0,
                timing.init_time.as_secs_f64() * 1000.0,
                timing.after_time.as_secs_f64() * 1000.0,
                percentage
            );
        }

        println!();
        println!("{}", "🪨 PER-RESERVOIR INTERVALS:".bold());
        for outcome in &self.outcomes {
            let status = if outcome.ok {
                "ok".green()
            } else {
                format!("failed in {}", outcome.failed_op.as_deref().unwrap_or("?")).red()
            };
            println!(
                "  {:<20} | {:>8.2} -> {:>8.2} Ma | {:>8.2}ms | {}",
                outcome.reservoir,
                outcome.start_age_ma,
                outcome.end_age_ma,
                outcome.elapsed.as_secs_f64() * 1000.0,
                status
            );
        }

        println!();
        println!(
            "⏱️  TOTAL SIMULATION TIME: {:.2}ms ({:.2}s)",
            total_time.as_secs_f64() * 1000.0,
            total_time.as_secs_f64()
        );
        if let Some(slowest) = self.outcomes.iter().max_by_key(|outcome| outcome.elapsed) {
            println!(
                "🐢 Slowest interval: {} {:.2} -> {:.2} Ma in {:.2}ms",
                slowest.reservoir,
                slowest.start_age_ma,
                slowest.end_age_ma,
                slowest.elapsed.as_secs_f64() * 1000.0
            );
        }
        println!("{}", "📊 === END TIMING REPORT ===\n".bold());
    }
}
