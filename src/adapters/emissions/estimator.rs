use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::application::ports::{EmissionsSession, EmissionsTrackerPort};
use crate::domain::errors::DomainResult;

const CSV_HEADER: &str = "timestamp,project_name,duration_s,energy_kwh,emissions_kg\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionsConfig {
    pub project_name: String,
    /// Average draw of the training machine.
    pub power_watts: f64,
    /// Grid carbon intensity, kg CO2eq per kWh.
    pub carbon_intensity_kg_per_kwh: f64,
    /// Where `emissions.csv` is appended; relative to the base directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for EmissionsConfig {
    fn default() -> Self {
        Self {
            project_name: "EcoVision_FineTuning".into(),
            power_watts: 65.0,
            carbon_intensity_kg_per_kwh: 0.475,
            output_dir: Some(PathBuf::from("emissions")),
        }
    }
}

/// Energy = wall-clock duration x average power; emissions = energy x grid intensity.
pub fn estimate(duration: Duration, power_watts: f64, intensity: f64) -> (f64, f64) {
    let hours = duration.as_secs_f64() / 3600.0;
    let energy_kwh = hours * power_watts / 1000.0;
    (energy_kwh, energy_kwh * intensity)
}

pub struct PowerEstimateTracker {
    power_watts: f64,
    intensity: f64,
    output_dir: Option<PathBuf>,
}

impl PowerEstimateTracker {
    pub fn new(power_watts: f64, intensity: f64, output_dir: Option<PathBuf>) -> Self {
        Self {
            power_watts: power_watts.max(0.0),
            intensity: intensity.max(0.0),
            output_dir,
        }
    }
}

impl EmissionsTrackerPort for PowerEstimateTracker {
    fn start(&self, project_name: &str) -> DomainResult<Box<dyn EmissionsSession>> {
        info!(project = project_name, power_watts = self.power_watts, "emissions tracking started");
        Ok(Box::new(PowerEstimateSession {
            project_name: project_name.to_string(),
            started: Instant::now(),
            started_at: Utc::now(),
            power_watts: self.power_watts,
            intensity: self.intensity,
            output_dir: self.output_dir.clone(),
        }))
    }
}

struct PowerEstimateSession {
    project_name: String,
    started: Instant,
    started_at: DateTime<Utc>,
    power_watts: f64,
    intensity: f64,
    output_dir: Option<PathBuf>,
}

impl EmissionsSession for PowerEstimateSession {
    fn stop(self: Box<Self>) -> DomainResult<f64> {
        let duration = self.started.elapsed();
        let (energy_kwh, emissions_kg) = estimate(duration, self.power_watts, self.intensity);
        info!(
            project = %self.project_name,
            duration_s = duration.as_secs_f64(),
            energy_kwh,
            emissions_kg,
            "emissions tracking stopped"
        );

        if let Some(dir) = &self.output_dir {
            let row = format!(
                "{},{},{:.3},{:.9},{:.9}",
                self.started_at.to_rfc3339(),
                self.project_name,
                duration.as_secs_f64(),
                energy_kwh,
                emissions_kg
            );
            // The estimate stands even when the report cannot be written.
            if let Err(e) = append_row(dir, &row) {
                warn!(dir = %dir.display(), error = %e, "could not append emissions.csv");
            }
        }
        Ok(emissions_kg)
    }
}

fn append_row(dir: &Path, row: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("emissions.csv");
    let is_new = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if is_new {
        file.write_all(CSV_HEADER.as_bytes())?;
    }
    writeln!(file, "{row}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hour_at_one_kilowatt() {
        let (kwh, kg) = estimate(Duration::from_secs(3600), 1000.0, 0.5);
        assert!((kwh - 1.0).abs() < 1e-12);
        assert!((kg - 0.5).abs() < 1e-12);
    }

    #[test]
    fn session_appends_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PowerEstimateTracker::new(65.0, 0.475, Some(dir.path().to_path_buf()));

        for _ in 0..2 {
            let kg = tracker.start("EcoVision_FineTuning").unwrap().stop().unwrap();
            assert!(kg >= 0.0);
        }

        let csv = std::fs::read_to_string(dir.path().join("emissions.csv")).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.trim_end());
        assert!(lines[1].contains(",EcoVision_FineTuning,"));
    }

    #[test]
    fn negative_inputs_never_yield_negative_emissions() {
        let tracker = PowerEstimateTracker::new(-10.0, -1.0, None);
        let kg = tracker.start("p").unwrap().stop().unwrap();
        assert_eq!(kg, 0.0);
    }

    #[test]
    fn unwritable_report_still_returns_estimate() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A regular file where the output directory should be.
        let tracker = PowerEstimateTracker::new(65.0, 0.475, Some(file.path().to_path_buf()));
        let kg = tracker.start("EcoVision_FineTuning").unwrap().stop().unwrap();
        assert!(kg >= 0.0);
        assert!(file.path().is_file());
    }
}
