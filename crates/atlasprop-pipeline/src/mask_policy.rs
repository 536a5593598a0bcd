//! Lesion-mask source selection for the diffusion stage.
//!
//! Precedence, highest first:
//!
//! 1. the atlas-space incidence mask of a requested reference session;
//! 2. the T2-space lesion mask of the current session;
//! 3. no mask, in which case superposition is skipped.
//!
//! A reference session that was requested but cannot supply a mask is not an
//! error: it is reported as a missing optional input and selection falls
//! through to the next source.

use std::path::{Path, PathBuf};
use crate::error::PipelineError;

/// Outcome of looking up the reference session's mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceMask {
    NotRequested,
    /// The session was requested but has no usable mask.
    Missing { session: String, reason: String },
    Found { session: String, path: PathBuf },
}

/// Where the lesion mask of a diffusion run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
    /// Atlas-space mask from another session of the same subject.
    CrossSession { session: String, path: PathBuf },
    /// T2-space mask of the current session.
    CurrentSession(PathBuf),
    None,
}

impl MaskSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::CrossSession { path, .. } => Some(path),
            Self::CurrentSession(path) => Some(path),
            Self::None => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Selected source plus the optional inputs found missing on the way.
#[derive(Debug)]
pub struct MaskSelection {
    pub source: MaskSource,
    pub notices: Vec<PipelineError>,
}

/// Apply the precedence rule.
pub fn select_mask_source(reference: &ReferenceMask, current: Option<&Path>) -> MaskSelection {
    let mut notices = Vec::new();

    match reference {
        ReferenceMask::Found { session, path } => {
            return MaskSelection {
                source: MaskSource::CrossSession {
                    session: session.clone(),
                    path: path.clone(),
                },
                notices,
            };
        }
        ReferenceMask::Missing { session, reason } => {
            notices.push(PipelineError::missing_optional(
                format!("reference mask of session {}", session),
                reason.clone(),
            ));
        }
        ReferenceMask::NotRequested => {}
    }

    let source = match current {
        Some(path) => MaskSource::CurrentSession(path.to_path_buf()),
        None => {
            notices.push(PipelineError::missing_optional("lesion mask", "no lesion mask in the current session"));
            MaskSource::None
        }
    };
    MaskSelection { source, notices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn found() -> ReferenceMask {
        ReferenceMask::Found {
            session: "P5".into(),
            path: PathBuf::from("/data/P5/sub01/T2w/sub01_IncidenceData_mask.nii.gz"),
        }
    }

    #[test]
    fn test_reference_session_wins() {
        let sel = select_mask_source(&found(), Some(Path::new("/data/P7/sub01/T2w/sub01Stroke_mask.nii.gz")));
        assert!(matches!(sel.source, MaskSource::CrossSession { ref session, .. } if session == "P5"));
        assert!(sel.notices.is_empty());
    }

    #[test]
    fn test_missing_reference_falls_through_to_current() {
        let missing = ReferenceMask::Missing {
            session: "P5".into(),
            reason: "no incidence mask".into(),
        };
        let current = PathBuf::from("/data/P7/sub01/T2w/sub01Stroke_mask.nii.gz");
        let sel = select_mask_source(&missing, Some(&current));
        assert_eq!(sel.source, MaskSource::CurrentSession(current));
        assert_eq!(sel.notices.len(), 1);
        assert_eq!(sel.notices[0].kind(), ErrorKind::MissingOptionalInput);
    }

    #[test]
    fn test_nothing_available() {
        let missing = ReferenceMask::Missing {
            session: "P5".into(),
            reason: "session directory does not exist".into(),
        };
        let sel = select_mask_source(&missing, None);
        assert!(sel.source.is_none());
        assert_eq!(sel.notices.len(), 2);

        let sel = select_mask_source(&ReferenceMask::NotRequested, None);
        assert!(sel.source.path().is_none());
        assert_eq!(sel.notices.len(), 1);
    }
}
