use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use superfill::numerics::timing;
use superfill::processing::snapshot::CsvSnapshotWriter;
use superfill::processing::summary::RunSummary;
use superfill::{ElectrofillSystem, SimulationParams};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let params = match std::env::args().nth(1) {
        Some(path) => SimulationParams::from_json_file(&path).expect("Failed to load parameters"),
        None => {
            println!("No parameter file given, using defaults");
            SimulationParams::default()
        }
    };
    let output = PathBuf::from(std::env::args().nth(2).unwrap_or_else(|| "output/main".into()));
    fs::create_dir_all(&output).expect("Failed to create output directory");

    let mut system = ElectrofillSystem::new(params).expect("Failed to set up the simulation");
    let mut summary = RunSummary::from_system(&system);
    let mut writer =
        CsvSnapshotWriter::new(output.join("snapshots")).expect("Failed to create snapshot directory");

    timing::reset_timing();
    let started = Instant::now();
    let outcome = system.run(&mut writer);
    timing::finalize_and_print(started.elapsed());

    match &outcome {
        Ok(report) => {
            summary.add_report(report);
            let history = fs::File::create(output.join("history.json")).expect("Failed to create history file");
            serde_json::to_writer_pretty(history, &report.history).expect("Failed to write step history");
            let state = fs::File::create(output.join("final_state.json")).expect("Failed to create state file");
            serde_json::to_writer_pretty(state, &system.state()).expect("Failed to write final state");
        }
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            summary.add_error(e);
        }
    }

    let summary_path = output.join("simulation_summary.txt");
    summary.write_to_file(&summary_path).expect("Failed to write summary");
    summary.print_to_console();
    println!("Summary saved to {}", summary_path.display());

    if outcome.is_err() {
        std::process::exit(1);
    }
}
