use std::collections::BTreeMap;

use ndarray_rand::rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;
use tempdir::TempDir;

use ct_buildup::calibration::{CalibrationRecord, Config, RawCalibrationRecord, TypeB};
use ct_buildup::topology::{Transformer, TransformerKind, Violation};
use ct_buildup::{Error, Result};

const LEVELS: [f64; 7] = [120., 100., 60., 40., 20., 10., 5.];

fn create_calibration_dir(test_name: &str) -> Result<TempDir> {
    let tmp_dir = TempDir::new(test_name)?;
    std::fs::create_dir(tmp_dir.path().join("calibration"))?;
    Ok(tmp_dir)
}

fn transformer() -> Result<Transformer> {
    let groups = BTreeMap::from([
        ("P1".to_owned(), vec![25; 4]),
        ("P2".to_owned(), vec![5; 4]),
        ("P3".to_owned(), vec![1]),
    ]);
    let secondaries = BTreeMap::from([("main".to_owned(), 100), ("auxiliary".to_owned(), 100)]);
    let cores = BTreeMap::from([("main".to_owned(), "supermalloy".to_owned())]);
    Transformer::new("a", groups, secondaries, cores, TransformerKind::Current)
}

fn generate_record<R: Rng>(transformer: &Transformer, rng: &mut R, num_burdens: usize) -> RawCalibrationRecord {
    let burdens = (0..num_burdens)
        .map(|_| [rng.gen_range(0.1..0.5), rng.gen_range(0.0..0.1)])
        .collect::<Vec<_>>();
    let errors = transformer
        .ratio_catalog()
        .into_keys()
        .map(|ratio| {
            let sets = (0..num_burdens)
                .map(|_| {
                    LEVELS
                        .iter()
                        .map(|_| [rng.gen_range(-1e-5..1e-5), rng.gen_range(-1e-5..1e-5)])
                        .collect()
                })
                .collect();
            (ratio, sets)
        })
        .collect();

    RawCalibrationRecord {
        reference: Some(format!("S{}", rng.gen_range(10_000..99_999))),
        excitation_levels: Some(LEVELS.to_vec()),
        secondary_current: Some(5.0),
        burdens: Some(burdens),
        errors,
    }
}

#[test]
fn calibration_record_round_trips_through_toml() -> Result<()> {
    let seed = 40;
    let mut rng = Isaac64Rng::seed_from_u64(seed);

    // Arrange
    let tmp_dir = create_calibration_dir("calibration_record_round_trips_through_toml")?;
    let mut transformer = transformer()?;
    let num_burdens = rng.gen_range(1..4);
    let generated = generate_record(&transformer, &mut rng, num_burdens);
    let path = tmp_dir.path().join("calibration").join("a.toml");
    std::fs::write(&path, toml::to_string(&generated).unwrap()).unwrap();

    // Act
    let raw = RawCalibrationRecord::from_file(&path)?;
    let record = CalibrationRecord::from_raw(raw, &transformer)?;
    transformer.set_calibration(record);

    // Assert
    assert!(transformer.is_calibrated());
    let record = transformer.calibration().expect("calibration was attached");
    assert_eq!(record.ratios().count(), transformer.ratio_catalog().len());
    assert_eq!(record.burdens.len(), num_burdens);

    for (ratio, sets) in &generated.errors {
        for (burden, set) in sets.iter().enumerate() {
            for (level, expected) in LEVELS.iter().zip(set) {
                let found = record.error(ratio, burden, *level).expect("error present");
                assert_eq!([found.re, found.im], *expected);
            }
        }
    }
    assert!(record.error("P1_s", num_burdens, 100.0).is_none());
    assert!(record.error("P1_s", 0, 42.0).is_none());

    Ok(())
}

#[test]
fn incomplete_records_list_every_violation() -> Result<()> {
    let seed = 40;
    let mut rng = Isaac64Rng::seed_from_u64(seed);

    let tmp_dir = create_calibration_dir("incomplete_records_list_every_violation")?;
    let transformer = transformer()?;
    let mut generated = generate_record(&transformer, &mut rng, 2);
    generated.errors.remove("P2_sp");
    generated.reference = None;
    if let Some(sets) = generated.errors.get_mut("P1_p") {
        sets[1].pop();
    }
    let path = tmp_dir.path().join("calibration").join("a.toml");
    std::fs::write(&path, toml::to_string(&generated).unwrap()).unwrap();

    let raw = RawCalibrationRecord::from_file(&path)?;
    let report = transformer.validate_calibration_record(&raw);

    assert!(!report.is_ok());
    assert!(report
        .violations
        .contains(&Violation::MissingRatio("P2_sp".to_owned())));
    assert!(report
        .violations
        .contains(&Violation::MissingKey("reference".to_owned())));
    assert!(report.violations.contains(&Violation::WrongLevelCount {
        ratio: "P1_p".to_owned(),
        burden: 1,
        expected: LEVELS.len(),
        found: LEVELS.len() - 1,
    }));

    match CalibrationRecord::from_raw(raw, &transformer) {
        Err(Error::MissingCalibrationField(violations)) => assert_eq!(violations.len(), 3),
        other => panic!("expected missing fields, found {other:?}"),
    }
    Ok(())
}

#[test]
fn configuration_files_override_selected_constants() -> Result<()> {
    let tmp_dir = create_calibration_dir("configuration_files_override_selected_constants")?;
    let path = tmp_dir.path().join("constants.toml");
    std::fs::write(
        &path,
        r#"
        [stability]
        real = { u = 2e-8, df = 20.0 }

        [burden]
        variation = 0.01
        "#,
    )
    .unwrap();

    let config = Config::from_file(&path)?;

    assert_eq!(config.stability.real, TypeB::new(2e-8, 20.0));
    assert_eq!(config.stability.imag, Config::default().stability.imag);
    assert_eq!(config.burden.variation, 0.01);
    assert_eq!(config.burden.main, Config::default().burden.main);
    assert!(Config::from_file(&tmp_dir.path().join("missing.toml")).is_err());
    Ok(())
}

#[test]
fn default_configuration_survives_serialisation() -> Result<()> {
    let config = Config::default();
    let written = toml::to_string(&config).unwrap();
    assert_eq!(Config::from_toml_str(&written)?, config);
    Ok(())
}
