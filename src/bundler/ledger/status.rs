//! Upload status flags and their transition table.

use super::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The built file is present locally.
    MarkLocalSaved,
    /// The bundle payload reached the remote store.
    MarkBundleUploaded,
    /// The manifest side-file reached the remote store.
    MarkManifestUploaded,
    /// The uploaded files were moved into the backup directory.
    MarkBackedUp,
    /// New build output replaced an unfinished upload; only the local flag survives.
    Rebuild,
}

/// Upload progress of one artifact as named flags.
///
/// Flags are only ever changed through [`apply`](Self::apply), which enforces
/// the allowed-transition table, or cleared wholesale by [`reset`](Self::reset).
/// [`Transition::Rebuild`] is the one transition that drops flags, and only
/// on an artifact that is not yet fully uploaded. Persisted as the legacy bitmask
/// (`LocalSave=1, BundleUploaded=2, ManifestUploaded=4, Backuped=8`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct UploadStatus {
    local_saved: bool,
    bundle_uploaded: bool,
    manifest_uploaded: bool,
    backed_up: bool,
}

impl UploadStatus {
    pub const LOCAL_SAVE: u8 = 1;
    pub const BUNDLE_UPLOADED: u8 = 2;
    pub const MANIFEST_UPLOADED: u8 = 4;
    pub const BACKED_UP: u8 = 8;

    pub fn local_saved(&self) -> bool {
        self.local_saved
    }

    pub fn bundle_uploaded(&self) -> bool {
        self.bundle_uploaded
    }

    pub fn manifest_uploaded(&self) -> bool {
        self.manifest_uploaded
    }

    pub fn backed_up(&self) -> bool {
        self.backed_up
    }

    pub fn is_none(&self) -> bool {
        *self == UploadStatus::default()
    }

    /// Whether every required file has been uploaded.
    ///
    /// `manifest_required` is false for scene artifacts and when manifest
    /// upload is globally disabled; then only the payload flag counts.
    pub fn is_all_uploaded(&self, manifest_required: bool) -> bool {
        self.bundle_uploaded && (!manifest_required || self.manifest_uploaded)
    }

    /// Applies `transition`, returning whether a flag changed.
    ///
    /// | transition             | requires                    |
    /// |------------------------|-----------------------------|
    /// | `MarkLocalSaved`       | -                           |
    /// | `MarkBundleUploaded`   | `local_saved`               |
    /// | `MarkManifestUploaded` | `bundle_uploaded`           |
    /// | `MarkBackedUp`         | all required files uploaded |
    /// | `Rebuild`              | not all required files uploaded |
    pub fn apply(&mut self, transition: Transition, manifest_required: bool) -> Result<bool, LedgerError> {
        let allowed = match transition {
            Transition::MarkLocalSaved => true,
            Transition::MarkBundleUploaded => self.local_saved,
            Transition::MarkManifestUploaded => self.bundle_uploaded,
            Transition::MarkBackedUp => self.is_all_uploaded(manifest_required),
            Transition::Rebuild => !self.is_all_uploaded(manifest_required),
        };
        if !allowed {
            return Err(LedgerError::InvalidTransition {
                transition,
                status: *self,
            });
        }

        let flag = match transition {
            Transition::MarkLocalSaved => &mut self.local_saved,
            Transition::MarkBundleUploaded => &mut self.bundle_uploaded,
            Transition::MarkManifestUploaded => &mut self.manifest_uploaded,
            Transition::MarkBackedUp => &mut self.backed_up,
            Transition::Rebuild => {
                let rebuilt = UploadStatus {
                    local_saved: true,
                    ..UploadStatus::default()
                };
                let changed = *self != rebuilt;
                *self = rebuilt;
                return Ok(changed);
            }
        };
        let changed = !*flag;
        *flag = true;
        Ok(changed)
    }

    /// Clears every flag.
    pub fn reset(&mut self) {
        *self = UploadStatus::default();
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.local_saved {
            bits |= Self::LOCAL_SAVE;
        }
        if self.bundle_uploaded {
            bits |= Self::BUNDLE_UPLOADED;
        }
        if self.manifest_uploaded {
            bits |= Self::MANIFEST_UPLOADED;
        }
        if self.backed_up {
            bits |= Self::BACKED_UP;
        }
        bits
    }
}

impl From<u8> for UploadStatus {
    fn from(bits: u8) -> Self {
        Self {
            local_saved: bits & Self::LOCAL_SAVE != 0,
            bundle_uploaded: bits & Self::BUNDLE_UPLOADED != 0,
            manifest_uploaded: bits & Self::MANIFEST_UPLOADED != 0,
            backed_up: bits & Self::BACKED_UP != 0,
        }
    }
}

impl From<UploadStatus> for u8 {
    fn from(status: UploadStatus) -> u8 {
        status.bits()
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("None");
        }
        let names = [
            (self.local_saved, "LocalSave"),
            (self.bundle_uploaded, "BundleUploaded"),
            (self.manifest_uploaded, "ManifestUploaded"),
            (self.backed_up, "Backuped"),
        ];
        let set: Vec<&str> = names.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
        f.write_str(&set.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_with_manifest() {
        let mut s = UploadStatus::default();
        assert!(s.apply(Transition::MarkLocalSaved, true).unwrap());
        assert!(s.apply(Transition::MarkBundleUploaded, true).unwrap());
        assert!(!s.is_all_uploaded(true));
        assert!(s.apply(Transition::MarkManifestUploaded, true).unwrap());
        assert!(s.is_all_uploaded(true));
        assert!(s.apply(Transition::MarkBackedUp, true).unwrap());
        assert_eq!(s.bits(), 15);
    }

    #[test]
    fn scene_needs_only_payload() {
        let mut s = UploadStatus::default();
        s.apply(Transition::MarkLocalSaved, false).unwrap();
        s.apply(Transition::MarkBundleUploaded, false).unwrap();
        assert!(s.is_all_uploaded(false));
        assert!(!s.manifest_uploaded());
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let mut s = UploadStatus::default();
        assert!(matches!(
            s.apply(Transition::MarkBundleUploaded, true),
            Err(LedgerError::InvalidTransition { .. })
        ));
        s.apply(Transition::MarkLocalSaved, true).unwrap();
        assert!(s.apply(Transition::MarkManifestUploaded, true).is_err());
        assert!(s.apply(Transition::MarkBackedUp, true).is_err());
        assert!(!s.is_none());
    }

    #[test]
    fn flags_are_monotonic_until_reset() {
        let mut s = UploadStatus::default();
        s.apply(Transition::MarkLocalSaved, true).unwrap();
        s.apply(Transition::MarkBundleUploaded, true).unwrap();
        let before = s.bits();
        assert!(!s.apply(Transition::MarkLocalSaved, true).unwrap());
        assert!(s.bits() >= before && s.bits() & before == before);

        s.reset();
        assert!(s.is_none());
    }

    #[test]
    fn rebuild_restarts_only_unfinished_uploads() {
        let mut s = UploadStatus::default();
        s.apply(Transition::MarkLocalSaved, true).unwrap();
        s.apply(Transition::MarkBundleUploaded, true).unwrap();
        assert!(s.apply(Transition::Rebuild, true).unwrap());
        assert_eq!(s.bits(), UploadStatus::LOCAL_SAVE);
        assert!(!s.apply(Transition::Rebuild, true).unwrap());

        s.apply(Transition::MarkBundleUploaded, true).unwrap();
        s.apply(Transition::MarkManifestUploaded, true).unwrap();
        assert!(matches!(
            s.apply(Transition::Rebuild, true),
            Err(LedgerError::InvalidTransition {
                transition: Transition::Rebuild,
                ..
            })
        ));
        assert_eq!(s.bits(), 7);
    }

    #[test]
    fn bitmask_round_trip_and_display() {
        let s = UploadStatus::from(UploadStatus::LOCAL_SAVE | UploadStatus::BUNDLE_UPLOADED);
        assert_eq!(u8::from(s), 3);
        assert_eq!(s.to_string(), "LocalSave|BundleUploaded");
        assert_eq!(serde_json::to_string(&s).unwrap(), "3");
    }
}
