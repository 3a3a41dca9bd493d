/// Reporting operation
/// Records trap counts and stored charge of every reservoir after each
/// interval and prints a summary table at the end of the run.
use crate::component::PhaseId;
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};
use colored::Colorize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub reservoir: String,
    pub age_ma: f64,
    pub trap_count: usize,
    pub stored_gas: f64,
    pub stored_oil: f64,
    pub blocked: f64,
}

#[derive(Default)]
pub struct ReportingOp {
    rows: Vec<ReportRow>,
    print: bool,
}

impl ReportingOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints the table when the run ends.
    pub fn printing() -> Self {
        Self {
            rows: Vec::new(),
            print: true,
        }
    }

    pub fn handle(self) -> SimOpHandle {
        SimOpHandle::new(Box::new(self))
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }
}

impl SimOp for ReportingOp {
    fn name(&self) -> &str {
        "Reporting"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        let layer = &sim.layers[sim.layer];
        let stored = layer.stored_by_phase();
        let row = ReportRow {
            reservoir: layer.name().to_string(),
            age_ma: sim.interval().1,
            trap_count: layer.trap_count(),
            stored_gas: stored[PhaseId::Gas.index()],
            stored_oil: stored[PhaseId::Oil.index()],
            blocked: layer.total_blocked().weight(),
        };
        log::info!(
            "{} at {} Ma: {} traps, {:.4e} kg gas, {:.4e} kg oil",
            row.reservoir,
            row.age_ma,
            row.trap_count,
            row.stored_gas,
            row.stored_oil
        );
        self.rows.push(row);
    }

    fn after_sim(&mut self, sim: &mut Simulation) {
        if !self.print {
            return;
        }
        println!("\n{}", format!("🛢️  === {} STORAGE REPORT ===", sim.name).bold());
        for row in &self.rows {
            println!(
                "  {:<20} | {:>8.2} Ma | traps: {:>4} | gas: {:>12.4e} kg | oil: {:>12.4e} kg | blocked: {:>12.4e} kg",
                row.reservoir.cyan(),
                row.age_ma,
                row.trap_count,
                row.stored_gas,
                row.stored_oil,
                row.blocked
            );
        }
        if !sim.all_succeeded() {
            println!("{}", "  some reservoir intervals failed, see the log".red());
        }
        println!();
    }
}
