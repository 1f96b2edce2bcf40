//! Saving and loading schedules, so a later run can warm-start from them.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::assembler::Schedule;
use crate::error::PlannerError;

pub fn save_schedule(schedule: &Schedule, path: impl AsRef<Path>) -> Result<(), PlannerError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, schedule)?;
    writer.flush()?;
    info!(path = %path.display(), routes = schedule.routes.len(), "saved schedule");
    Ok(())
}

pub fn load_schedule(path: impl AsRef<Path>) -> Result<Schedule, PlannerError> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let schedule: Schedule = serde_json::from_reader(reader)?;
    info!(path = %path.display(), routes = schedule.routes.len(), "loaded schedule");
    Ok(schedule)
}
