//! Model persistence round trips

mod common;

use aad_core::{DetectorType, Label, ScoreType};
use aad_forest::{
    load_aad_model, save_aad_model, AadForest, HalfSpaceConfig, HalfSpaceForest, IsolationForest, SplitRule,
};

use common::{clustered, iforest_detector, test_config};

#[test]
fn test_iforest_model_scores_identically_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.aad");
    let data = clustered(80, 4, 13);

    let mut det = iforest_detector(&data, test_config(ScoreType::LeafInvSample, false));
    let x = det.transform_to_region_features(data.x.view()).unwrap();
    det.update_weights(&x, &data.labels, &[81], &[0, 1]).unwrap();

    save_aad_model(&path, &det).unwrap();
    let loaded: AadForest<IsolationForest> = load_aad_model(&path).unwrap();

    let x_loaded = loaded.transform_to_region_features(data.x.view()).unwrap();
    assert_eq!(x_loaded, x);
    assert_eq!(loaded.get_score(&x_loaded, None).unwrap(), det.get_score(&x, None).unwrap());
    assert_eq!(loaded.uniform_prior(), det.uniform_prior());
    assert_eq!(loaded.config(), det.config());
}

#[test]
fn test_half_space_model_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hst.aad");
    let data = clustered(60, 2, 4);

    let mut forest = HalfSpaceForest::new(HalfSpaceConfig {
        n_estimators: 4,
        max_depth: 5,
        split_rule: SplitRule::Random,
        seed: 4,
    });
    forest.fit(data.x.view()).unwrap();
    let mut config = test_config(ScoreType::RsfLog, true);
    config.detector.detector_type = DetectorType::RsForest;
    let mut det = AadForest::new(forest, config);
    det.fit().unwrap();

    save_aad_model(&path, &det).unwrap();
    let loaded: AadForest<HalfSpaceForest> = load_aad_model(&path).unwrap();

    assert_eq!(loaded.d(), det.d());
    let a = det.transform_to_region_features(data.x.view()).unwrap();
    let b = loaded.transform_to_region_features(data.x.view()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_reloaded_model_updates_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.aad");
    let data = clustered(50, 3, 17);

    let det = iforest_detector(&data, test_config(ScoreType::LeafInvSample, true));
    save_aad_model(&path, &det).unwrap();

    let mut original = det;
    let mut loaded: AadForest<IsolationForest> = load_aad_model(&path).unwrap();
    let x = original.transform_to_region_features(data.x.view()).unwrap();
    let labels: Vec<Label> = data.labels.clone();

    original.update_weights(&x, &labels, &[50, 51], &[0]).unwrap();
    loaded.update_weights(&x, &labels, &[50, 51], &[0]).unwrap();
    assert_eq!(original.weights().unwrap(), loaded.weights().unwrap());
}

#[test]
fn test_missing_file_is_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_aad_model::<IsolationForest>(dir.path().join("absent.aad")).unwrap_err();
    assert!(matches!(err, aad_core::AadError::Persistence(_)));
}
