//! Enroll/verify engine tests over scripted sessions and a mock store.

use std::sync::Arc;

use veriface_core::detect::{DetectorConfig, FaceDetector};
use veriface_core::modules::{
    EmbeddingExtractor, LivenessConfig, LivenessEnsemble, OcclusionClassifier, OcclusionConfig,
};
use veriface_core::pipeline::{LivenessPipeline, PipelineConfig};
use veriface_core::ports::{EmbeddingStore, RemoteDetails, RemoteResponse};
use veriface_core::{CancellationToken, FaceEngine, IdentifyOutcome, Prediction, VerifyOutcome};
use veriface_test_support::{
    MockEmbeddingStore, MockRemoteVerify, ScriptedSession, SyntheticFrameBuilder,
};

fn engine(store: Arc<MockEmbeddingStore>) -> FaceEngine {
    let detector = FaceDetector::from_sessions(
        ScriptedSession::proposal_grid(0.9),
        ScriptedSession::refine_all(0.9),
        ScriptedSession::output_all(0.95, ScriptedSession::face_landmark_row()),
        DetectorConfig::default(),
    );
    let pipeline = LivenessPipeline::from_components(
        PipelineConfig::default(),
        OcclusionClassifier::new(
            Some(ScriptedSession::fixed_logits("occlusion", [-3.0, 3.0])),
            OcclusionConfig::default(),
        ),
        LivenessEnsemble::new(
            ScriptedSession::fixed_probabilities("liveness_1_0x", [0.9, 0.1]),
            ScriptedSession::fixed_probabilities("liveness_0_5x", [0.9, 0.1]),
            LivenessConfig::default(),
        ),
        None,
    );
    let embedder = EmbeddingExtractor::new(ScriptedSession::embedding_from_input());
    let store: Arc<dyn EmbeddingStore> = store;
    FaceEngine::new(detector, pipeline, embedder, store)
}

#[tokio::test]
async fn enroll_stores_a_live_frame() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));

    let outcome = engine
        .enroll(
            "alice",
            "Alice",
            &SyntheticFrameBuilder::gate_passing(),
            Some(b"jpeg-bytes".as_slice()),
            &CancellationToken::new(),
        )
        .await
        .expect("enroll");

    assert_eq!(outcome.verdict.prediction, Prediction::Live);
    assert!(outcome.stored);
    assert!(outcome.embedding.is_some());

    let record = store.get("alice").await.expect("get").expect("record");
    assert_eq!(record.name, "Alice");
    assert_eq!(record.image_blob.as_deref(), Some(b"jpeg-bytes".as_slice()));
}

#[tokio::test]
async fn enroll_rejects_a_blurry_frame() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));

    let outcome = engine
        .enroll(
            "alice",
            "Alice",
            &SyntheticFrameBuilder::gray(),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("enroll");

    assert_eq!(outcome.verdict.prediction, Prediction::Spoof);
    assert!(!outcome.stored);
    assert!(outcome.embedding.is_none());
    assert!(store.get("alice").await.expect("get").is_none());
}

#[tokio::test]
async fn verify_matches_the_enrolled_frame() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));
    let frame = SyntheticFrameBuilder::gate_passing();

    engine
        .enroll("alice", "Alice", &frame, None, &CancellationToken::new())
        .await
        .expect("enroll");

    let outcome = engine
        .verify("alice", &frame, &CancellationToken::new())
        .await
        .expect("verify");

    match outcome {
        VerifyOutcome::Match { similarity } => {
            assert!((similarity - 1.0).abs() < 1e-6, "similarity = {similarity}");
        }
        other => panic!("expected a match, got {other:?}"),
    }
    assert_eq!(store.match_count("alice"), 1);
}

#[tokio::test]
async fn verify_mismatches_a_different_subject() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));

    engine
        .enroll(
            "alice",
            "Alice",
            &SyntheticFrameBuilder::speckled(224, 100),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("enroll");

    let outcome = engine
        .verify(
            "alice",
            &SyntheticFrameBuilder::speckled(224, 40),
            &CancellationToken::new(),
        )
        .await
        .expect("verify");

    match outcome {
        VerifyOutcome::Mismatch { similarity } => {
            assert!(similarity <= 0.7, "similarity = {similarity}");
        }
        other => panic!("expected a mismatch, got {other:?}"),
    }
    assert_eq!(store.match_count("alice"), 0);
}

#[tokio::test]
async fn identify_finds_the_closest_enrolled_user() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));
    let alice_frame = SyntheticFrameBuilder::speckled(224, 100);
    let bob_frame = SyntheticFrameBuilder::speckled(224, 40);

    engine
        .enroll("alice", "Alice", &alice_frame, None, &CancellationToken::new())
        .await
        .expect("enroll alice");
    engine
        .enroll("bob", "Bob", &bob_frame, None, &CancellationToken::new())
        .await
        .expect("enroll bob");

    let outcome = engine
        .identify(&alice_frame, &CancellationToken::new())
        .await
        .expect("identify");
    match outcome {
        IdentifyOutcome::Match {
            user_id,
            name,
            similarity,
        } => {
            assert_eq!(user_id, "alice");
            assert_eq!(name, "Alice");
            assert!(similarity > 0.99);
        }
        other => panic!("expected an identification, got {other:?}"),
    }
    assert_eq!(store.match_count("alice"), 1);
    assert_eq!(store.match_count("bob"), 0);
}

#[tokio::test]
async fn identify_with_empty_gallery() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(store);
    let outcome = engine
        .identify(
            &SyntheticFrameBuilder::gate_passing(),
            &CancellationToken::new(),
        )
        .await
        .expect("identify");
    assert_eq!(outcome, IdentifyOutcome::EmptyGallery);
}

#[tokio::test]
async fn remote_verification_maps_response_codes() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(store);
    let frame = SyntheticFrameBuilder::gate_passing();

    let api = MockRemoteVerify::new(RemoteResponse {
        status: "success".into(),
        code: 200,
        message: "ok".into(),
        details: Some(RemoteDetails {
            similarity: Some(0.91),
            spoof_label: None,
            occlusion_label: None,
        }),
    });
    let outcome = engine
        .verify_remote(&api, "alice", &frame, &CancellationToken::new())
        .await
        .expect("remote verify");
    assert_eq!(outcome, VerifyOutcome::Match { similarity: 0.91 });

    // The request carried a non-empty JPEG for the right user.
    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "alice");
    assert!(requests[0].1 > 0);

    let api = MockRemoteVerify::new(RemoteResponse {
        status: "error".into(),
        code: 404,
        message: "unknown user".into(),
        details: None,
    });
    let outcome = engine
        .verify_remote(&api, "alice", &frame, &CancellationToken::new())
        .await
        .expect("remote verify");
    assert_eq!(outcome, VerifyOutcome::NotEnrolled);

    let api = MockRemoteVerify::new(RemoteResponse {
        status: "error".into(),
        code: 400,
        message: "spoof detected".into(),
        details: Some(RemoteDetails {
            similarity: None,
            spoof_label: Some("spoof".into()),
            occlusion_label: None,
        }),
    });
    let outcome = engine
        .verify_remote(&api, "alice", &frame, &CancellationToken::new())
        .await
        .expect("remote verify");
    assert!(matches!(outcome, VerifyOutcome::Rejected(_)));

    let api = MockRemoteVerify::new(RemoteResponse {
        status: "error".into(),
        code: 500,
        message: "server exploded".into(),
        details: None,
    });
    assert!(engine
        .verify_remote(&api, "alice", &frame, &CancellationToken::new())
        .await
        .is_err());
}

#[tokio::test]
async fn remote_verification_skips_the_upload_for_gated_frames() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(store);
    let api = MockRemoteVerify::new(RemoteResponse {
        status: "success".into(),
        code: 200,
        message: "ok".into(),
        details: None,
    });

    let outcome = engine
        .verify_remote(
            &api,
            "alice",
            &SyntheticFrameBuilder::gray(),
            &CancellationToken::new(),
        )
        .await
        .expect("remote verify");
    assert!(matches!(outcome, VerifyOutcome::Rejected(_)));
    assert!(api.requests().is_empty());
}

#[tokio::test]
async fn verify_unknown_user_is_not_enrolled() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(store);

    let outcome = engine
        .verify(
            "bob",
            &SyntheticFrameBuilder::gate_passing(),
            &CancellationToken::new(),
        )
        .await
        .expect("verify");
    assert_eq!(outcome, VerifyOutcome::NotEnrolled);
}

#[tokio::test]
async fn verify_rejects_a_gated_frame_without_touching_the_store() {
    let store = Arc::new(MockEmbeddingStore::new());
    let engine = engine(Arc::clone(&store));

    engine
        .enroll(
            "alice",
            "Alice",
            &SyntheticFrameBuilder::gate_passing(),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("enroll");

    let outcome = engine
        .verify("alice", &SyntheticFrameBuilder::gray(), &CancellationToken::new())
        .await
        .expect("verify");

    match outcome {
        VerifyOutcome::Rejected(verdict) => {
            assert_eq!(verdict.prediction, Prediction::Spoof);
            assert_eq!(verdict.failure_reason.as_deref(), Some("Image is blurry"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(store.match_count("alice"), 0);
}
