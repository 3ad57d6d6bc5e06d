mod common;

use std::fs;

use batch_sfm::colmap::Subcommand;
use batch_sfm::core::{discover_batches, CollisionPolicy, StagedImageSet, Workspace};
use batch_sfm::{
    Orchestrator, Phase, PipelineConfig, PipelineError, ReconstructionError, RunContext,
};
use common::{make_batch, two_batch_root, FakeEngine};

use Subcommand::*;

fn orchestrator_for(
    root: &std::path::Path,
    engine: FakeEngine,
    config: PipelineConfig,
) -> Orchestrator<FakeEngine> {
    let batches = discover_batches(root).unwrap();
    let ctx = RunContext::new(root, batches);
    ctx.workspace.create().unwrap();
    Orchestrator::new(engine, ctx, config)
}

#[test]
fn two_batch_run_calls_engine_in_order() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());

    assert_eq!(orch.phase(), Phase::Empty);
    assert_eq!(orch.step().unwrap(), Phase::Bootstrapped);
    assert_eq!(orch.step().unwrap(), Phase::Registering(1));
    assert_eq!(orch.step().unwrap(), Phase::Complete);

    let undistorted = orch.finalize().unwrap();
    let ws = Workspace::for_root(root.path());
    assert_eq!(undistorted, ws.undistorted_dir);
    assert!(ws.undistorted_dir.is_dir());

    let engine = orch.engine();
    assert_eq!(
        engine.calls,
        vec![
            FeatureExtractor,
            ExhaustiveMatcher,
            Mapper,
            FeatureExtractor,
            ImageRegistrator,
            VocabTreeMatcher,
            BundleAdjuster,
            ImageUndistorter,
        ]
    );
    assert_eq!(orch.invocations(), engine.calls.as_slice());
    assert_eq!(StagedImageSet::read(&ws.images_dir).unwrap().len(), 5);
}

#[test]
fn camera_model_only_set_at_bootstrap() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());
    orch.run().unwrap();

    assert_eq!(
        orch.engine().camera_models,
        vec![Some("OPENCV".to_string()), None]
    );
}

#[test]
fn batches_are_staged_before_their_extraction_in_numeric_order() {
    let root = tempfile::tempdir().unwrap();
    make_batch(root.path(), "t2", &["z.jpg"]);
    make_batch(root.path(), "t0", &["x.jpg"]);
    make_batch(root.path(), "t1", &["y.jpg"]);

    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());
    orch.run().unwrap();

    assert_eq!(
        orch.engine().staged_at_extract,
        vec![
            vec!["x.jpg".to_string()],
            vec!["x.jpg".to_string(), "y.jpg".to_string()],
            vec!["x.jpg".to_string(), "y.jpg".to_string(), "z.jpg".to_string()],
        ]
    );
}

#[test]
fn every_registration_updates_the_single_model_in_place() {
    let root = tempfile::tempdir().unwrap();
    for (i, name) in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"].iter().enumerate() {
        make_batch(root.path(), &format!("t{i}"), &[name]);
    }
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());
    let model = orch.run().unwrap();

    let ws = Workspace::for_root(root.path());
    assert_eq!(model, ws.sparse_dir.join("0"));

    let engine = orch.engine();
    assert_eq!(engine.count(ExhaustiveMatcher), 1);
    assert_eq!(engine.count(Mapper), 1);
    assert_eq!(engine.registrations.len(), 3);
    for reg in &engine.registrations {
        assert_eq!(reg.input_path, model);
        assert_eq!(reg.output_path, model);
    }
    for ba in &engine.adjustments {
        assert_eq!(ba.input_path, ba.output_path);
        assert_eq!(ba.input_path, model);
    }
    assert_eq!(ws.model_dirs().unwrap().len(), 1);
}

#[test]
fn single_batch_completes_without_registration() {
    let root = tempfile::tempdir().unwrap();
    make_batch(root.path(), "t0", &["a.jpg", "b.jpg"]);
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());
    orch.run().unwrap();
    orch.finalize().unwrap();

    assert_eq!(
        orch.engine().calls,
        vec![FeatureExtractor, ExhaustiveMatcher, Mapper, ImageUndistorter]
    );
}

#[test]
fn mapper_failure_stops_before_registration() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(
        root.path(),
        FakeEngine::failing_on(Mapper),
        PipelineConfig::default(),
    );

    let err = orch.run().unwrap_err();
    assert!(matches!(err, PipelineError::Engine(_)));
    assert_eq!(err.engine_diagnostics(), Some("scripted mapper failure"));
    assert_eq!(orch.phase(), Phase::Failed);
    assert_eq!(orch.engine().count(ImageRegistrator), 0);

    assert!(matches!(
        orch.finalize(),
        Err(PipelineError::InvalidPhase { phase: Phase::Failed, .. })
    ));
    assert!(matches!(
        orch.step(),
        Err(PipelineError::InvalidPhase { .. })
    ));
    assert_eq!(orch.engine().count(ImageUndistorter), 0);
}

#[test]
fn no_model_after_mapping_is_fatal() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(
        root.path(),
        FakeEngine::creating_models(0),
        PipelineConfig::default(),
    );

    let err = orch.run().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Reconstruction(ReconstructionError::NoReconstruction { .. })
    ));
    assert_eq!(orch.engine().calls, vec![FeatureExtractor, ExhaustiveMatcher, Mapper]);
    assert_eq!(orch.phase(), Phase::Failed);
}

#[test]
fn multiple_models_after_mapping_are_fatal() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(
        root.path(),
        FakeEngine::creating_models(2),
        PipelineConfig::default(),
    );

    match orch.run() {
        Err(PipelineError::Reconstruction(ReconstructionError::AmbiguousReconstruction {
            count,
            ..
        })) => assert_eq!(count, 2),
        other => panic!("unexpected result: {other:?}"),
    }
    let engine = orch.engine();
    assert_eq!(engine.count(ImageRegistrator), 0);
    assert_eq!(engine.count(VocabTreeMatcher), 0);
    assert_eq!(engine.count(BundleAdjuster), 0);
}

#[test]
fn registration_failure_leaves_workspace_in_place() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(
        root.path(),
        FakeEngine::failing_on(VocabTreeMatcher),
        PipelineConfig::default(),
    );

    assert!(orch.run().is_err());
    assert_eq!(orch.phase(), Phase::Failed);
    let ws = Workspace::for_root(root.path());
    assert_eq!(StagedImageSet::read(&ws.images_dir).unwrap().len(), 5);
    assert_eq!(ws.model_dirs().unwrap(), vec![ws.sparse_dir.join("0")]);
    assert_eq!(orch.engine().count(BundleAdjuster), 0);
}

#[test]
fn finalize_requires_complete_phase() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), PipelineConfig::default());
    orch.step().unwrap();

    assert!(matches!(
        orch.finalize(),
        Err(PipelineError::InvalidPhase {
            phase: Phase::Bootstrapped,
            ..
        })
    ));
    assert_eq!(orch.engine().count(ImageUndistorter), 0);
}

#[test]
fn resume_adopts_existing_model() {
    let root = two_batch_root();
    let ws = Workspace::for_root(root.path());
    ws.create().unwrap();
    fs::create_dir(ws.sparse_dir.join("0")).unwrap();

    let config = PipelineConfig {
        resume: true,
        ..PipelineConfig::default()
    };
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), config);
    let model = orch.run().unwrap();

    assert_eq!(model, ws.sparse_dir.join("0"));
    assert_eq!(
        orch.engine().calls,
        vec![FeatureExtractor, ImageRegistrator, VocabTreeMatcher, BundleAdjuster]
    );
}

#[test]
fn resume_refuses_ambiguous_workspace() {
    let root = two_batch_root();
    let ws = Workspace::for_root(root.path());
    ws.create().unwrap();
    fs::create_dir(ws.sparse_dir.join("0")).unwrap();
    fs::create_dir(ws.sparse_dir.join("1")).unwrap();

    let config = PipelineConfig {
        resume: true,
        ..PipelineConfig::default()
    };
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), config);

    assert!(matches!(
        orch.run(),
        Err(PipelineError::Reconstruction(
            ReconstructionError::AmbiguousReconstruction { .. }
        ))
    ));
    assert!(orch.engine().calls.is_empty());
}

#[test]
fn rejected_collision_fails_before_registering_the_batch() {
    let root = tempfile::tempdir().unwrap();
    make_batch(root.path(), "t0", &["a.jpg", "b.jpg"]);
    make_batch(root.path(), "t1", &["a.jpg"]);
    let config = PipelineConfig {
        collision_policy: CollisionPolicy::Reject,
        ..PipelineConfig::default()
    };
    let mut orch = orchestrator_for(root.path(), FakeEngine::default(), config);

    let err = orch.run().unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(orch.engine().calls, vec![FeatureExtractor, ExhaustiveMatcher, Mapper]);
}

#[test]
fn undistortion_failure_marks_run_failed() {
    let root = two_batch_root();
    let mut orch = orchestrator_for(
        root.path(),
        FakeEngine::failing_on(ImageUndistorter),
        PipelineConfig::default(),
    );
    orch.run().unwrap();

    assert!(matches!(orch.finalize(), Err(PipelineError::Engine(_))));
    assert_eq!(orch.phase(), Phase::Failed);
    assert!(Workspace::for_root(root.path()).undistorted_dir.is_dir());
}
