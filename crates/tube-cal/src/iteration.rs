//! One calibration iteration, end to end.
//!
//! intake -> frame read -> geometry -> ROI extraction -> feedback step ->
//! persisted control vector, logs and report.

use std::path::PathBuf;

use crate::config::CalibrationConfig;
use crate::control::{
    today, ControlError, ControlStore, CsvControlFile, CsvLog, FeedbackController, SessionLayout,
    SessionState,
};
use crate::core::{
    extract_intensity, read_raw_frame, DetectorSpec, FrameView, RawFrame, TubeGeometry, TubeLayout,
};
use crate::error::CalibrationError;
use crate::intake::{archive_batch, collect_batch, ClassificationRule};
use crate::report::{IterationReport, TubeReading};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Optional observer of intermediate results (plots, overlays, dumps).
pub trait DiagnosticSink {
    fn on_tube(
        &mut self,
        _iteration: u32,
        _frame: &FrameView<'_>,
        _reading: &TubeReading,
    ) {
    }

    fn on_iteration(&mut self, _report: &IterationReport) {}
}

/// Sink that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiagnostics;

impl DiagnosticSink for NoDiagnostics {}

/// Read one data frame and measure the ROI of `tube`.
pub fn measure_frame(
    path: PathBuf,
    tube: usize,
    geometry: &TubeGeometry,
    detector: &DetectorSpec,
    half_window: i64,
) -> Result<(RawFrame, TubeReading), CalibrationError> {
    let frame = read_raw_frame(&path, detector.rows, detector.cols).map_err(|source| {
        CalibrationError::Frame {
            path: path.clone(),
            source,
        }
    })?;
    let (row_center, col_center) = geometry.center(tube).ok_or(ControlError::LengthMismatch {
        what: "tube geometry",
        expected: tube + 1,
        got: geometry.row_centers.len(),
    })?;
    let m = extract_intensity(
        &frame.view(),
        row_center,
        col_center,
        half_window,
        detector.rows,
        detector.active_col_limit,
    );
    let reading = TubeReading {
        tube,
        frame: path,
        intensity: m.intensity,
        roi: m.bounds,
        valid_samples: m.valid_samples,
    };
    Ok((frame, reading))
}

/// Measure one data frame per tube, `frames[i]` belonging to tube `i`.
pub fn measure_frames(
    frames: &[PathBuf],
    geometry: &TubeGeometry,
    detector: &DetectorSpec,
    half_window: i64,
    iteration: u32,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<TubeReading>, CalibrationError> {
    let mut readings = Vec::with_capacity(frames.len());
    for (tube, path) in frames.iter().enumerate() {
        let (frame, reading) = measure_frame(path.clone(), tube, geometry, detector, half_window)?;
        log::debug!(
            "tube {tube}: {} -> {}",
            reading.frame.display(),
            reading.intensity
        );
        if reading.intensity == 0 {
            log::warn!("tube {tube}: no valid samples in ROI {:?}", reading.roi);
        }
        sink.on_tube(iteration, &frame.view(), &reading);
        readings.push(reading);
    }
    Ok(readings)
}

/// Explicit context for a calibration run.
///
/// Everything persistent goes through the [`ControlStore`] and the session
/// state file; the only in-memory cache is the geometry of the last carriage
/// position.
pub struct CalibrationSession<S: ControlStore = CsvControlFile> {
    config: CalibrationConfig,
    layout: SessionLayout,
    tubes: TubeLayout,
    rule: ClassificationRule,
    controller: FeedbackController,
    store: S,
    geometry: Option<(f64, TubeGeometry)>,
}

impl CalibrationSession<CsvControlFile> {
    /// Session backed by the control file inside the session root.
    pub fn open(config: CalibrationConfig) -> Result<Self, CalibrationError> {
        let store = CsvControlFile::new(config.layout().control_file());
        Self::with_store(config, store)
    }
}

impl<S: ControlStore> CalibrationSession<S> {
    pub fn with_store(config: CalibrationConfig, store: S) -> Result<Self, CalibrationError> {
        config.validate()?;
        let rule = config.classification_rule()?;
        let controller = config.controller()?;
        Ok(Self {
            layout: config.layout(),
            tubes: config.tube_layout(),
            rule,
            controller,
            store,
            geometry: None,
            config,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persisted state, or a fresh one before the first iteration.
    pub fn state(&self) -> Result<SessionState, CalibrationError> {
        Ok(SessionState::load_or_default(self.layout.state_file())?)
    }

    pub fn is_converged(&self) -> Result<bool, CalibrationError> {
        Ok(self.state()?.is_converged())
    }

    pub fn is_running(&self) -> Result<bool, CalibrationError> {
        Ok(self.state()?.is_running())
    }

    fn check_tube_len(&self, what: &'static str, got: usize) -> Result<(), CalibrationError> {
        let expected = self.tubes.tube_count();
        if got != expected {
            return Err(ControlError::LengthMismatch {
                what,
                expected,
                got,
            }
            .into());
        }
        Ok(())
    }

    /// Start a new run: create the directory layout, store the initial DAC
    /// vector and reset the session state.
    pub fn initialize(&mut self, initial: &[i32]) -> Result<(), CalibrationError> {
        self.check_tube_len("initial control vector", initial.len())?;
        self.layout.ensure_dirs()?;
        self.store.save_control_vector(initial)?;
        SessionState::default().write_json(self.layout.state_file())?;
        CsvLog::new(self.layout.control_log(), initial.len()).append(&today(), 0, initial)?;
        log::info!(
            "initialized session in {} with DAC {initial:?}",
            self.layout.root().display()
        );
        Ok(())
    }

    /// Geometry for a carriage position, recomputed only when it changes.
    pub fn geometry_at(&mut self, position_mm: f64) -> &TubeGeometry {
        if !matches!(&self.geometry, Some((p, _)) if *p == position_mm) {
            self.geometry = None;
        }
        let tubes = &self.tubes;
        &self
            .geometry
            .get_or_insert_with(|| (position_mm, tubes.at_position(position_mm)))
            .1
    }

    pub fn run_iteration(&mut self, position_mm: f64) -> Result<IterationReport, CalibrationError> {
        self.run_iteration_with(position_mm, &mut NoDiagnostics)
    }

    /// Run one iteration for shots taken at `position_mm`.
    ///
    /// The session is marked running for the duration. The advanced state is
    /// written before the new control vector is saved; on failure the prior
    /// state is restored with the running flag cleared.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, sink), fields(root = %self.layout.root().display()))
    )]
    pub fn run_iteration_with(
        &mut self,
        position_mm: f64,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<IterationReport, CalibrationError> {
        let state_path = self.layout.state_file();
        let mut state = SessionState::load_or_default(&state_path)?;
        state.running = true;
        state.write_json(&state_path)?;

        match self.iterate(&state, position_mm, sink) {
            Ok((report, mut next)) => {
                next.running = false;
                next.write_json(&state_path)?;
                Ok(report)
            }
            Err(err) => {
                log::error!("iteration {} failed: {err}", state.iteration);
                state.running = false;
                if let Err(write_err) = state.write_json(&state_path) {
                    log::warn!("could not clear running flag: {write_err}");
                }
                Err(err)
            }
        }
    }

    fn iterate(
        &mut self,
        state: &SessionState,
        position_mm: f64,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(IterationReport, SessionState), CalibrationError> {
        let tube_count = self.tubes.tube_count();
        let prior = self.store.load_control_vector()?;
        self.check_tube_len("control vector", prior.len())?;

        let cal_dir = self.layout.cal_dir();
        log::info!(
            "iteration {}: waiting for {} files in {}",
            state.iteration,
            self.config.intake.wait.expected_files,
            cal_dir.display()
        );
        let batch = collect_batch(
            &cal_dir,
            &self.config.intake.wait,
            self.config.intake.ordering,
            &self.rule,
            tube_count,
        )?;

        let geometry = self.geometry_at(position_mm).clone();
        let readings = measure_frames(
            &batch.data,
            &geometry,
            &self.config.detector,
            self.config.roi_half_window,
            state.iteration,
            sink,
        )?;
        let intensities: Vec<u32> = readings.iter().map(|r| r.intensity).collect();

        let outcome = self.controller.step(state, &prior, &intensities)?;

        let date = today();
        CsvLog::new(self.layout.readings_log(), tube_count).append(
            &date,
            outcome.iteration,
            &intensities,
        )?;
        CsvLog::new(self.layout.control_log(), tube_count).append(
            &date,
            outcome.next_state.iteration,
            &outcome.control,
        )?;
        // the stored vector must never lead the persisted iteration
        outcome.next_state.write_json(self.layout.state_file())?;
        self.store.save_control_vector(&outcome.control)?;

        let archive = archive_batch(
            &batch,
            &self.config.intake.archive,
            &self.layout.archive_dir(),
            outcome.iteration,
        );

        let report = IterationReport {
            date,
            iteration: outcome.iteration,
            position_mm,
            exposure: self.config.exposure.clone(),
            row_centers: geometry.row_centers.clone(),
            col_center: geometry.col_center,
            readings,
            target: outcome.target,
            target_locked: outcome.target_locked,
            tolerance: self.controller.params().tolerance,
            converged: outcome.converged,
            prior_control: prior,
            new_control: outcome.control.clone(),
            archive,
        };
        let report_path = self.layout.iteration_report(outcome.iteration);
        if let Err(err) = report.write_json(&report_path) {
            log::warn!("could not write {}: {err}", report_path.display());
        }
        sink.on_iteration(&report);

        Ok((report, outcome.next_state))
    }
}
