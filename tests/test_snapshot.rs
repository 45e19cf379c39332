//! Snapshot files and file-driven runs


use acoustic3d::prelude::*;
use acoustic3d::utilities::create_sink;
use std::fs;
use tempfile::TempDir;
use test_utils::{random_field, rng};

fn parse_values(text: &str) -> Vec<f64> {
    text.lines()
        .skip(3)
        .take_while(|line| *line != "];")
        .map(|line| line.parse().unwrap())
        .collect()
}

#[test]
fn test_matlab_file_layout() {
    let dir = TempDir::new().unwrap();
    let mut sink = MatlabSnapshotSink::new(dir.path(), "tmp_Bvec_");
    let mut rng = rng(2);
    let field = random_field((4, 3, 5), &mut rng);

    let path = sink.write(&field, 40).unwrap().unwrap();
    assert_eq!(path, dir.path().join("tmp_Bvec_40.m"));

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "%Vec Object: Vec_0x0 1 MPI processes");
    assert_eq!(lines[1], "%  type: seq");
    assert_eq!(lines[2], "Vec_0x0 = [");
    assert_eq!(lines.last(), Some(&"];"));
    assert_eq!(lines.len(), 4 + field.len());

    // one value per line with a signed two-digit exponent
    for line in &lines[3..lines.len() - 1] {
        let (mantissa, exponent) = line.split_once('e').unwrap();
        assert_eq!(mantissa.trim_start_matches('-').len(), 18, "{line}");
        assert!(exponent.starts_with('+') || exponent.starts_with('-'), "{line}");
        assert!(exponent.len() >= 3, "{line}");
    }
}

#[test]
fn test_values_are_written_in_natural_order() {
    let dir = TempDir::new().unwrap();
    let mut sink = MatlabSnapshotSink::new(dir.path(), "snap_");
    let (nx, ny, nz) = (3, 4, 2);
    let mut field = WaveArray::zeros((nx, ny, nz));
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                field.data[[i, j, k]] = (i + nx * (j + ny * k)) as f64;
            }
        }
    }

    let path = sink.write(&field, 7).unwrap().unwrap();
    let values = parse_values(&fs::read_to_string(path).unwrap());
    let expected: Vec<f64> = (0..nx * ny * nz).map(|n| n as f64).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_values_survive_full_precision() {
    let dir = TempDir::new().unwrap();
    let mut sink = MatlabSnapshotSink::new(dir.path(), "p_");
    let mut rng = rng(9);
    let mut field = random_field((3, 3, 3), &mut rng);
    field *= 1e-7;

    let path = sink.write(&field, 1).unwrap().unwrap();
    let values = parse_values(&fs::read_to_string(path).unwrap());
    assert_eq!(values.as_slice(), field.as_slice());
}

#[test]
fn test_disabled_output_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut sink = create_sink(SnapshotFormat::None, dir.path(), "tmp_Bvec_");
    let field = WaveArray::from_scalar((3, 3, 3), 1.0);
    assert!(sink.write(&field, 40).unwrap().is_none());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_run_from_config_file_writes_snapshots() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("run.toml");
    let output = dir.path().join("out");
    fs::create_dir(&output).unwrap();
    fs::write(
        &config_path,
        format!(
            r#"
            [grid]
            nx = 9
            ny = 9
            nz = 9
            xmax = 360.0
            ymax = 360.0
            zmax = 360.0

            [time]
            tmax = 0.25

            [output]
            directory = "{}"
            interval = 4
            "#,
            output.display()
        ),
    )
    .unwrap();

    let config = RunConfig::from_file(&config_path).unwrap();
    assert_eq!(config.steps(), 11);
    let mut sink = create_sink(
        config.output.format,
        config.output.directory.clone(),
        config.output.prefix.clone(),
    );
    let summary = simulate(config, sink.as_mut()).unwrap();
    assert_eq!(summary.steps, 11);

    let mut written: Vec<_> = fs::read_dir(&output)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    written.sort();
    assert_eq!(written, vec!["tmp_Bvec_4.m", "tmp_Bvec_8.m"]);

    let text = fs::read_to_string(output.join("tmp_Bvec_8.m")).unwrap();
    assert_eq!(parse_values(&text).len(), 9 * 9 * 9);
}

#[test]
fn test_unwritable_directory_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let mut config = RunConfig::default();
    config.grid.nx = 7;
    config.grid.ny = 7;
    config.grid.nz = 7;
    config.time.tmax = 0.1;
    config.output.interval = 1;
    let missing = dir.path().join("missing");
    let mut sink = MatlabSnapshotSink::new(&missing, "tmp_Bvec_");

    let err = simulate(config, &mut sink).unwrap_err();
    assert!(matches!(err, SimulationError::SnapshotIo { step: 1, .. }));
}
