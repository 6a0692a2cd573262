use crate::models::electrofill::system::ElectrofillSystem;
use crate::numerics::transient::{RunReport, Termination};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct RunSummary {
    // Mesh info
    pub geometry: &'static str,
    pub nx: usize,
    pub ny: usize,
    pub num_cells: usize,
    pub num_faces: usize,
    pub x_extent: (f64, f64),
    pub y_extent: (f64, f64),
    pub min_cell_spacing: f64,
    pub max_cell_spacing: f64,
    pub nominal_dx: f64,

    // Parameters
    pub applied_potential: f64,
    pub target_current: Option<f64>,
    pub bulk_cupric: f64,
    pub bulk_suppressor: f64,
    pub feature_depth: f64,
    pub cfl: f64,
    pub sweeps: usize,
    pub reinitialization_interval: usize,

    // Outcome
    pub termination: Option<Termination>,
    pub steps: usize,
    pub elapsed: f64,
    pub final_dt: f64,
    pub rejections: usize,
    pub final_current: Option<f64>,
    pub max_residual: Option<f64>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_system(system: &ElectrofillSystem) -> Self {
        let mesh = &system.mesh;
        let params = &system.params;
        let (width, height) = mesh.extent();
        let origin = mesh.origin;
        Self {
            geometry: system.geometry.name(),
            nx: mesh.nx,
            ny: mesh.ny,
            num_cells: mesh.num_cells(),
            num_faces: mesh.faces.len(),
            x_extent: (origin.x, origin.x + width),
            y_extent: (origin.y, origin.y + height),
            min_cell_spacing: mesh.min_spacing(),
            max_cell_spacing: mesh.max_spacing(),
            nominal_dx: mesh.nominal_dx,
            applied_potential: params.applied_potential,
            target_current: params.current,
            bulk_cupric: params.bulk_cupric,
            bulk_suppressor: params.bulk_suppressor,
            feature_depth: params.feature_depth,
            cfl: params.cfl,
            sweeps: params.sweeps,
            reinitialization_interval: params.reinitialization_interval(),
            termination: None,
            steps: 0,
            elapsed: 0.0,
            final_dt: params.dt,
            rejections: 0,
            final_current: None,
            max_residual: None,
            error: None,
        }
    }

    pub fn add_report(&mut self, report: &RunReport) {
        self.termination = Some(report.termination);
        self.steps = report.steps;
        self.elapsed = report.elapsed;
        self.final_dt = report.dt;
        self.rejections = report.rejections();
        if let Some(last) = report.history.iter().rev().find(|r| r.accepted) {
            self.final_current = Some(last.total_current);
            self.max_residual = Some(last.residuals.iter().cloned().fold(0.0, f64::max));
        }
    }

    pub fn add_error(&mut self, error: &dyn std::error::Error) {
        self.error = Some(error.to_string());
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "SUPERFILL SIMULATION SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;

        writeln!(file, "MESH STATISTICS")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Geometry:            {}", self.geometry)?;
        writeln!(file, "Cells:               {} x {} = {}", self.nx, self.ny, self.num_cells)?;
        writeln!(file, "Faces:               {}", self.num_faces)?;
        writeln!(
            file,
            "x extent:            {:.6e} to {:.6e} m",
            self.x_extent.0, self.x_extent.1
        )?;
        writeln!(
            file,
            "y extent:            {:.6e} to {:.6e} m",
            self.y_extent.0, self.y_extent.1
        )?;
        writeln!(file, "Nominal spacing:     {:.6e} m", self.nominal_dx)?;
        writeln!(file, "Min cell spacing:    {:.6e} m", self.min_cell_spacing)?;
        writeln!(file, "Max cell spacing:    {:.6e} m", self.max_cell_spacing)?;
        writeln!(file)?;

        writeln!(file, "PARAMETERS")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Feature depth:       {:.6e} m", self.feature_depth)?;
        writeln!(file, "Applied potential:   {:.4} V", self.applied_potential)?;
        if let Some(target) = self.target_current {
            writeln!(file, "Target current:      {:.4e} A", target)?;
        }
        writeln!(file, "Bulk cupric:         {:.4e} mol/m³", self.bulk_cupric)?;
        writeln!(file, "Bulk suppressor:     {:.4e} mol/m³", self.bulk_suppressor)?;
        writeln!(file, "CFL:                 {}", self.cfl)?;
        writeln!(file, "Sweeps per step:     {}", self.sweeps)?;
        writeln!(file, "Reinit every:        {} steps", self.reinitialization_interval)?;
        writeln!(file)?;

        writeln!(file, "OUTCOME")?;
        writeln!(file, "{}", "-".repeat(60))?;
        match (&self.termination, &self.error) {
            (_, Some(err)) => writeln!(file, "Failed:              {}", err)?,
            (Some(t), None) => writeln!(file, "Stopped by:          {:?}", t)?,
            (None, None) => writeln!(file, "Not run")?,
        }
        writeln!(file, "Accepted steps:      {}", self.steps)?;
        writeln!(file, "Elapsed time:        {:.6e} s", self.elapsed)?;
        writeln!(file, "Last dt:             {:.6e} s", self.final_dt)?;
        writeln!(file, "Rejected steps:      {}", self.rejections)?;
        if let Some(current) = self.final_current {
            writeln!(file, "Final current:       {:.6e}", current)?;
        }
        if let Some(res) = self.max_residual {
            writeln!(file, "Final max residual:  {:.6e}", res)?;
        }
        writeln!(file)?;

        writeln!(file, "{}", "=".repeat(60))?;
        file.flush()
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SIMULATION SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "Mesh:          {} ({} x {} cells, dx = {:.3e} m)",
            self.geometry, self.nx, self.ny, self.nominal_dx
        );
        match (&self.termination, &self.error) {
            (_, Some(err)) => println!("Failed:        {}", err),
            (Some(t), None) => println!("Stopped by:    {:?}", t),
            (None, None) => {}
        }
        println!(
            "Steps:         {} accepted, {} rejected, t = {:.4e} s",
            self.steps, self.rejections, self.elapsed
        );
        if let Some(current) = self.final_current {
            println!("Current:       {:.4e}", current);
        }
        println!("{}\n", "=".repeat(60));
    }
}
