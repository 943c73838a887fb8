use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::data::{Affectation, CohortId, SolverInput, SolverOutput};
use crate::error::{RunError, StoreError};
use crate::solver::{self, SolveOptions};

/// Where cohort snapshots come from and where solutions go.
pub trait CohortStore {
    fn load_cohort_snapshot(&self, cohort: CohortId) -> Result<SolverInput, StoreError>;

    /// Stores the whole solution in one write.
    fn persist(&mut self, cohort: CohortId, affectations: &[Affectation]) -> Result<(), StoreError>;
}

/// Loads a cohort, solves it and persists the result. Nothing is written
/// when the solve fails.
pub fn run_cohort<S: CohortStore + ?Sized>(
    store: &mut S,
    cohort: CohortId,
    options: &SolveOptions,
) -> Result<SolverOutput, RunError> {
    let input = store.load_cohort_snapshot(cohort)?;
    let output = solver::solve(&input, options).inspect_err(|e| {
        error!("Solve of cohort {} failed, nothing persisted: {}", cohort, e);
    })?;
    store.persist(cohort, &output.affectations)?;
    info!(
        "Persisted {} affectations for cohort {} ({} errors).",
        output.affectations.len(),
        cohort,
        output.errors_count
    );
    Ok(output)
}

/// Snapshots as `<dir>/<cohort>.json`, solutions as
/// `<dir>/<cohort>.affectations.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, cohort: CohortId) -> PathBuf {
        self.root.join(format!("{cohort}.json"))
    }

    pub fn solution_path(&self, cohort: CohortId) -> PathBuf {
        self.root.join(format!("{cohort}.affectations.json"))
    }

    pub fn load_solution(&self, cohort: CohortId) -> Result<Vec<Affectation>, StoreError> {
        let bytes = fs::read(self.solution_path(cohort))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl CohortStore for JsonDirStore {
    fn load_cohort_snapshot(&self, cohort: CohortId) -> Result<SolverInput, StoreError> {
        let path = self.snapshot_path(cohort);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::UnknownCohort(cohort)),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn persist(&mut self, cohort: CohortId, affectations: &[Affectation]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let target = self.solution_path(cohort);
        let temp = self.root.join(format!(".{cohort}.affectations.json.tmp"));
        {
            let mut file = fs::File::create(&temp)?;
            serde_json::to_writer_pretty(&mut file, affectations)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: HashMap<CohortId, SolverInput>,
    solutions: HashMap<CohortId, Vec<Affectation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input: SolverInput) {
        self.snapshots.insert(input.cohort.id, input);
    }

    pub fn solution(&self, cohort: CohortId) -> Option<&[Affectation]> {
        self.solutions.get(&cohort).map(Vec::as_slice)
    }
}

impl CohortStore for MemoryStore {
    fn load_cohort_snapshot(&self, cohort: CohortId) -> Result<SolverInput, StoreError> {
        self.snapshots
            .get(&cohort)
            .cloned()
            .ok_or(StoreError::UnknownCohort(cohort))
    }

    fn persist(&mut self, cohort: CohortId, affectations: &[Affectation]) -> Result<(), StoreError> {
        self.solutions.insert(cohort, affectations.to_vec());
        Ok(())
    }
}
