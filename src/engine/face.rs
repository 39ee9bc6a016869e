use derive_more::Display;
use serde::{Deserialize, Serialize};

pub const ENCODING_DIMS: usize = 128;
pub const DEFAULT_TOLERANCE: f64 = 0.35;

#[derive(Debug, Display)]
pub enum FaceMatchError {
    #[display(fmt = "Image could not be decoded")]
    InvalidImage,
    #[display(fmt = "No face detected in the submitted image")]
    NoFaceDetected,
    #[display(fmt = "No face enrolled for this member")]
    NoEnrollment,
    #[display(fmt = "Face does not match any enrolled image")]
    NoMatch(Option<MatchCandidate>),
    #[display(fmt = "Multiple enrolled identities matched the probe")]
    Ambiguous(Vec<MatchCandidate>),
    #[display(fmt = "Stored face encoding is malformed")]
    CorruptEncoding,
    #[display(fmt = "Face encoder unavailable: {}", _0)]
    Encoder(String),
}

/// Fixed-length face embedding. Compared by Euclidean distance; smaller is
/// more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding(Vec<f64>);

impl FaceEncoding {
    pub fn new(values: Vec<f64>) -> Result<Self, FaceMatchError> {
        if values.len() != ENCODING_DIMS {
            return Err(FaceMatchError::CorruptEncoding);
        }
        Ok(Self(values))
    }

    /// Parses the JSON float array persisted on a member_images row.
    pub fn from_json(raw: &str) -> Result<Self, FaceMatchError> {
        let values: Vec<f64> =
            serde_json::from_str(raw).map_err(|_| FaceMatchError::CorruptEncoding)?;
        Self::new(values)
    }

    pub fn distance(&self, other: &FaceEncoding) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub member_id: u64,
    pub distance: f64,
}

/// Organization-wide identification: best match across every enrolled
/// encoding, with the ambiguity rule. Two *distinct* identities inside
/// tolerance is a rejection, never a silent nearest pick.
pub fn identify(
    probe: &FaceEncoding,
    gallery: &[(u64, FaceEncoding)],
    tolerance: f64,
) -> Result<MatchCandidate, FaceMatchError> {
    if gallery.is_empty() {
        return Err(FaceMatchError::NoEnrollment);
    }

    let mut nearest: Option<MatchCandidate> = None;
    // best distance per identity, among encodings inside tolerance
    let mut matched: Vec<MatchCandidate> = Vec::new();

    for (member_id, encoding) in gallery {
        let candidate = MatchCandidate {
            member_id: *member_id,
            distance: probe.distance(encoding),
        };
        if nearest.as_ref().map_or(true, |n| candidate.distance < n.distance) {
            nearest = Some(candidate.clone());
        }
        if candidate.distance <= tolerance {
            match matched.iter_mut().find(|m| m.member_id == candidate.member_id) {
                Some(existing) if existing.distance > candidate.distance => *existing = candidate,
                Some(_) => {}
                None => matched.push(candidate),
            }
        }
    }

    match matched.len() {
        0 => Err(FaceMatchError::NoMatch(nearest)),
        1 => Ok(matched.remove(0)),
        _ => Err(FaceMatchError::Ambiguous(matched)),
    }
}

/// Identity-scoped re-verification against one member's own gallery. The
/// nearest neighbor must pass tolerance and belong to the claimed member.
pub fn verify(
    probe: &FaceEncoding,
    member_id: u64,
    gallery: &[(u64, FaceEncoding)],
    tolerance: f64,
) -> Result<MatchCandidate, FaceMatchError> {
    if gallery.is_empty() {
        return Err(FaceMatchError::NoEnrollment);
    }

    let best = gallery
        .iter()
        .map(|(id, encoding)| MatchCandidate {
            member_id: *id,
            distance: probe.distance(encoding),
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .expect("gallery checked non-empty");

    if best.member_id != member_id || best.distance > tolerance {
        return Err(FaceMatchError::NoMatch(Some(best)));
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Encoding whose first component carries the value, rest zero: the
    // Euclidean distance between two of these is |a - b|.
    fn enc(v: f64) -> FaceEncoding {
        let mut values = vec![0.0; ENCODING_DIMS];
        values[0] = v;
        FaceEncoding::new(values).unwrap()
    }

    #[test]
    fn rejects_wrong_dimension() {
        assert!(matches!(
            FaceEncoding::new(vec![0.0; 64]),
            Err(FaceMatchError::CorruptEncoding)
        ));
    }

    #[test]
    fn parses_persisted_json() {
        let raw = serde_json::to_string(&vec![0.0f64; ENCODING_DIMS]).unwrap();
        assert!(FaceEncoding::from_json(&raw).is_ok());
        assert!(matches!(
            FaceEncoding::from_json("not json"),
            Err(FaceMatchError::CorruptEncoding)
        ));
    }

    #[test]
    fn identify_empty_gallery_is_no_enrollment() {
        assert!(matches!(
            identify(&enc(0.0), &[], DEFAULT_TOLERANCE),
            Err(FaceMatchError::NoEnrollment)
        ));
    }

    #[test]
    fn identify_picks_unique_best_match() {
        let gallery = vec![(1, enc(0.1)), (1, enc(0.3)), (2, enc(0.9))];
        let hit = identify(&enc(0.0), &gallery, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(hit.member_id, 1);
        assert!((hit.distance - 0.1).abs() < 1e-9);
    }

    #[test]
    fn identify_beyond_tolerance_is_no_match_with_nearest() {
        let gallery = vec![(1, enc(0.5)), (2, enc(0.9))];
        match identify(&enc(0.0), &gallery, DEFAULT_TOLERANCE) {
            Err(FaceMatchError::NoMatch(Some(nearest))) => {
                assert_eq!(nearest.member_id, 1);
                assert!((nearest.distance - 0.5).abs() < 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn identify_two_identities_in_tolerance_is_ambiguous() {
        let gallery = vec![(1, enc(0.1)), (2, enc(0.2))];
        match identify(&enc(0.0), &gallery, DEFAULT_TOLERANCE) {
            Err(FaceMatchError::Ambiguous(candidates)) => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn verify_accepts_own_face() {
        let gallery = vec![(42, enc(0.1)), (42, enc(0.2))];
        let hit = verify(&enc(0.0), 42, &gallery, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(hit.member_id, 42);
    }

    #[test]
    fn verify_rejects_nearest_belonging_to_other_identity() {
        let gallery = vec![(42, enc(0.3)), (7, enc(0.1))];
        assert!(matches!(
            verify(&enc(0.0), 42, &gallery, DEFAULT_TOLERANCE),
            Err(FaceMatchError::NoMatch(Some(_)))
        ));
    }

    #[test]
    fn verify_rejects_beyond_tolerance() {
        let gallery = vec![(42, enc(0.5))];
        assert!(matches!(
            verify(&enc(0.0), 42, &gallery, DEFAULT_TOLERANCE),
            Err(FaceMatchError::NoMatch(Some(_)))
        ));
    }
}
