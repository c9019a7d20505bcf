//! Verification policy: validate, delegate, then re-check the distance.

use crate::comparator::{error_chain, CompareError, FaceComparator};
use crate::types::{
    CompareSpec, Comparison, Verification, VerificationRequest, VerificationResult, VerifyStatus,
};

pub const DEFAULT_MODEL: &str = "ArcFace";
pub const DEFAULT_DETECTOR: &str = "scrfd";
/// Cosine-distance threshold applied on top of the comparator's own verdict.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Process-wide verification settings, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyConfig {
    pub model: String,
    pub detector: String,
    pub threshold: f64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            detector: DEFAULT_DETECTOR.into(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl VerifyConfig {
    /// Comparison settings; detection is always enforced.
    pub fn compare_spec(&self) -> CompareSpec<'_> {
        CompareSpec {
            model: &self.model,
            detector: &self.detector,
            enforce_detection: true,
        }
    }
}

/// Run one verification request end to end.
///
/// Missing images are rejected before the comparator is touched. Comparator
/// faults are logged in full and reduced to their summary for the caller.
pub fn verify<C: FaceComparator + ?Sized>(
    comparator: &mut C,
    config: &VerifyConfig,
    request: &VerificationRequest,
) -> Verification {
    let (img1, img2) = match require_images(request) {
        Ok(images) => images,
        Err(rejected) => return rejected,
    };
    conclude(comparator.compare(img1, img2, &config.compare_spec()), config)
}

/// Validation step of [`verify`]: both payloads, or the 400 outcome.
///
/// Callers that reach their comparator asynchronously run this first and
/// finish with [`conclude`].
pub fn require_images(request: &VerificationRequest) -> Result<(&str, &str), Verification> {
    request.images().ok_or_else(|| {
        tracing::info!("verification rejected: missing images");
        Verification::missing_images()
    })
}

/// Final step of [`verify`]: threshold a verdict, or reduce a fault to its summary.
pub fn conclude(outcome: Result<Comparison, CompareError>, config: &VerifyConfig) -> Verification {
    match outcome {
        Ok(comparison) => decide(comparison, config),
        Err(err) => fault(&err),
    }
}

/// Apply the service threshold to a comparator verdict.
///
/// Both the comparator's `matched` flag and `distance <= threshold` must
/// hold; neither is sufficient alone.
pub fn decide(comparison: Comparison, config: &VerifyConfig) -> Verification {
    let Comparison { matched, distance } = comparison;
    let within_threshold = distance <= config.threshold;

    tracing::info!(
        matched,
        distance,
        threshold = config.threshold,
        verified = matched && within_threshold,
        "verification decided"
    );

    if matched && within_threshold {
        Verification {
            status: VerifyStatus::Ok,
            result: VerificationResult::Verified {
                distance,
                threshold: config.threshold,
                model: config.model.clone(),
            },
        }
    } else {
        Verification {
            status: VerifyStatus::Unauthorized,
            result: VerificationResult::Mismatch {
                distance: distance.is_finite().then_some(distance),
                threshold: config.threshold,
            },
        }
    }
}

fn fault(err: &CompareError) -> Verification {
    tracing::error!(error = %error_chain(err), "verification failed");
    Verification::fault(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::UnavailableComparator;
    use crate::image_input::DecodeError;
    use crate::types::MISSING_IMAGES;

    /// Returns a fixed outcome and counts calls.
    struct MockComparator {
        outcome: Option<Comparison>,
        calls: usize,
        last_spec: Option<(String, String, bool)>,
    }

    impl MockComparator {
        fn returning(matched: bool, distance: f64) -> Self {
            Self {
                outcome: Some(Comparison { matched, distance }),
                calls: 0,
                last_spec: None,
            }
        }

        fn failing() -> Self {
            Self {
                outcome: None,
                calls: 0,
                last_spec: None,
            }
        }
    }

    impl FaceComparator for MockComparator {
        fn compare(
            &mut self,
            _img1: &str,
            _img2: &str,
            spec: &CompareSpec<'_>,
        ) -> Result<Comparison, CompareError> {
            self.calls += 1;
            self.last_spec = Some((
                spec.model.to_string(),
                spec.detector.to_string(),
                spec.enforce_detection,
            ));
            self.outcome.ok_or(CompareError::Decode {
                index: 1,
                source: DecodeError::Empty,
            })
        }
    }

    fn request() -> VerificationRequest {
        VerificationRequest::new("aW1nMQ==", "aW1nMg==")
    }

    #[test]
    fn test_verified_within_threshold() {
        let config = VerifyConfig::default();
        let mut cmp = MockComparator::returning(true, 0.35);
        let v = verify(&mut cmp, &config, &request());

        assert_eq!(v.status, VerifyStatus::Ok);
        assert_eq!(
            v.result,
            VerificationResult::Verified {
                distance: 0.35,
                threshold: 0.6,
                model: "ArcFace".into(),
            }
        );
    }

    #[test]
    fn test_distance_equal_to_threshold_is_verified() {
        let v = decide(
            Comparison { matched: true, distance: 0.6 },
            &VerifyConfig::default(),
        );
        assert_eq!(v.status, VerifyStatus::Ok);
    }

    #[test]
    fn test_upstream_match_over_threshold_is_rejected() {
        let config = VerifyConfig::default();
        for distance in [0.6000001, 0.61, 0.68, 1.2] {
            let mut cmp = MockComparator::returning(true, distance);
            let v = verify(&mut cmp, &config, &request());
            assert_eq!(v.status, VerifyStatus::Unauthorized, "distance={distance}");
            assert_eq!(
                v.result,
                VerificationResult::Mismatch {
                    distance: Some(distance),
                    threshold: 0.6,
                }
            );
        }
    }

    #[test]
    fn test_upstream_rejection_wins_even_under_threshold() {
        let mut cmp = MockComparator::returning(false, 0.1);
        let v = verify(&mut cmp, &VerifyConfig::default(), &request());
        assert_eq!(v.status, VerifyStatus::Unauthorized);
        assert!(!v.result.is_verified());
    }

    #[test]
    fn test_non_finite_distance_is_mismatch_without_distance() {
        for distance in [f64::NAN, f64::INFINITY] {
            let v = decide(Comparison { matched: true, distance }, &VerifyConfig::default());
            assert_eq!(v.status, VerifyStatus::Unauthorized);
            assert_eq!(
                v.result,
                VerificationResult::Mismatch { distance: None, threshold: 0.6 }
            );
        }
    }

    #[test]
    fn test_missing_images_never_invoke_comparator() {
        let config = VerifyConfig::default();
        for req in [
            VerificationRequest::default(),
            VerificationRequest { img1: Some("a".into()), img2: None },
            VerificationRequest { img1: None, img2: Some("b".into()) },
            VerificationRequest::new("", "b"),
        ] {
            let mut cmp = MockComparator::returning(true, 0.1);
            let v = verify(&mut cmp, &config, &req);
            assert_eq!(v.status, VerifyStatus::BadRequest);
            assert_eq!(
                v.result,
                VerificationResult::Failed { error: MISSING_IMAGES.into() }
            );
            assert_eq!(cmp.calls, 0);
        }
    }

    #[test]
    fn test_comparator_fault_is_internal_error_with_summary() {
        let mut cmp = MockComparator::failing();
        let v = verify(&mut cmp, &VerifyConfig::default(), &request());
        assert_eq!(v.status, VerifyStatus::InternalError);
        // the decode source detail stays in the logs
        assert_eq!(
            v.result,
            VerificationResult::Failed {
                error: "image 1 is not a valid base64-encoded image".into(),
            }
        );
    }

    #[test]
    fn test_unavailable_model_fails_fast() {
        let mut cmp = UnavailableComparator::new("w600k_r50.onnx not found");
        let v = verify(&mut cmp, &VerifyConfig::default(), &request());
        assert_eq!(v.status, VerifyStatus::InternalError);
        assert_eq!(
            v.result,
            VerificationResult::Failed {
                error: "face model unavailable: w600k_r50.onnx not found".into(),
            }
        );
    }

    #[test]
    fn test_comparator_receives_configured_spec() {
        let config = VerifyConfig {
            model: "ArcFace".into(),
            detector: "SCRFD".into(),
            threshold: 0.4,
        };
        let mut cmp = MockComparator::returning(true, 0.5);
        let v = verify(&mut cmp, &config, &request());

        assert_eq!(cmp.calls, 1);
        assert_eq!(cmp.last_spec, Some(("ArcFace".into(), "SCRFD".into(), true)));
        // 0.5 passes the default threshold but not this one
        assert_eq!(v.status, VerifyStatus::Unauthorized);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let config = VerifyConfig::default();
        let mut cmp = MockComparator::returning(true, 0.2);
        let first = verify(&mut cmp, &config, &request());
        let second = verify(&mut cmp, &config, &request());
        assert_eq!(first, second);
        assert_eq!(cmp.calls, 2);
    }

    #[test]
    fn test_require_images_rejects_missing_payload() {
        let rejected = require_images(&VerificationRequest::default()).unwrap_err();
        assert_eq!(rejected, Verification::missing_images());

        let request = request();
        assert_eq!(require_images(&request), Ok(("aW1nMQ==", "aW1nMg==")));
    }

    #[test]
    fn test_conclude_matches_verify() {
        let config = VerifyConfig::default();
        let mut cmp = MockComparator::returning(true, 0.3);
        let direct = verify(&mut cmp, &config, &request());
        let staged = conclude(Ok(Comparison { matched: true, distance: 0.3 }), &config);
        assert_eq!(direct, staged);

        let aborted = conclude(Err(CompareError::Aborted("boom".into())), &config);
        assert_eq!(aborted.status, VerifyStatus::InternalError);
        assert_eq!(aborted, Verification::fault("comparison aborted"));
    }
}
