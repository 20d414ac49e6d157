//! DAC sweep measured from per-setting batch directories.

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use tube_cal::core::{write_raw_frame, RawFrame};
use tube_cal::sweep::{estimate_gains, measure_dac_sweep, SweepPoint};
use tube_cal::CalibrationConfig;

const OFFSETS: [i32; 7] = [3000, 3100, 3200, 2900, 3050, 3150, 2950];
const GAINS: [i32; 7] = [9, 10, 8, 11, 9, 12, 7];

fn small_config(root: &Path) -> CalibrationConfig {
    let mut cfg = CalibrationConfig::default();
    cfg.session_root = root.join("session");
    cfg.detector.rows = 128;
    cfg.detector.cols = 128;
    cfg.detector.pixel_size_mm = 1.0;
    cfg.detector.active_col_limit = 128;
    cfg.array.pitch_mm = 15.0;
    cfg.roi_half_window = 4;
    cfg.intake.wait.poll_interval_ms = 1;
    cfg.intake.wait.max_polls = 2;
    cfg
}

/// One 25-shot batch where data frame `t` reads `offset[t] + gain[t] * dac`.
fn write_sweep_batch(dir: &Path, cfg: &CalibrationConfig, dac: i32) {
    fs::create_dir_all(dir).expect("mkdir");
    let (rows, cols) = (cfg.detector.rows, cfg.detector.cols);
    for i in 0..25usize {
        let level = if i >= 11 && i % 2 == 1 {
            let tube = (i - 11) / 2;
            (OFFSETS[tube] + GAINS[tube] * dac) as u16
        } else {
            500
        };
        write_raw_frame(dir.join(format!("{i}.raw")), &RawFrame::filled(rows, cols, level))
            .expect("write shot");
    }
}

#[test]
fn sweep_directories_yield_per_tube_gains() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = small_config(root.path());

    let points: Vec<SweepPoint> = [-20, 0, 20]
        .into_iter()
        .map(|dac| {
            let dir = root.path().join(format!("DAC_{dac}"));
            write_sweep_batch(&dir, &cfg, dac);
            SweepPoint { dac, dir }
        })
        .collect();

    let sweep = measure_dac_sweep(&points, &cfg, 60.0).expect("sweep");
    assert_eq!(sweep.len(), 3);
    assert_eq!(sweep[0].dac, -20);
    assert_eq!(sweep[1].readings, OFFSETS.map(|o| o as u32).to_vec());
    assert_eq!(sweep[2].readings[3], 2900 + 11 * 20);
    assert_eq!(sweep[0].readings[5], 3150 - 12 * 20);

    let gains = estimate_gains(&sweep, cfg.tube_count()).expect("gains");
    for (gain, expected) in gains.iter().zip(GAINS) {
        assert_relative_eq!(*gain, f64::from(expected), epsilon = 1e-9);
    }

    // shots stay where they were written
    for point in &points {
        assert_eq!(fs::read_dir(&point.dir).expect("dir").count(), 25);
    }
}

#[test]
fn incomplete_sweep_directory_fails() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = small_config(root.path());
    let full = root.path().join("DAC_0");
    write_sweep_batch(&full, &cfg, 0);
    let partial = root.path().join("DAC_20");
    fs::create_dir_all(&partial).expect("mkdir");

    let points = vec![
        SweepPoint { dac: 0, dir: full },
        SweepPoint {
            dac: 20,
            dir: partial,
        },
    ];
    assert!(measure_dac_sweep(&points, &cfg, 60.0).is_err());
}
