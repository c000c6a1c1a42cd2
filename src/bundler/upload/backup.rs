//! Moving uploaded build output into the backup tree.

use crate::bundler::Result;
use crate::bundler::ledger::{FileKind, Ledger};
use crate::bundler::settings::BuildMode;
use crate::bundler::utils::fs;
use std::path::Path;
use tokio::sync::Mutex;

/// Backs up the files of the uploaded artifacts `nos`.
///
/// Each file moves to `<backup_root>/<target>/<timestamp>/<Normal|Scenes>/<file>`
/// and the artifact is marked backed up. Build output of discarded artifacts
/// in `modes` is deleted instead. Returns the number of artifacts backed up.
pub async fn backup_uploaded(
    ledger: &Mutex<Ledger>,
    backup_root: &Path,
    nos: &[u32],
    modes: &[BuildMode],
) -> Result<usize> {
    // (no, discarded, [(local, backup)])
    let plan: Vec<_> = {
        let ledger = ledger.lock().await;
        ledger
            .artifacts()
            .iter()
            .filter(|a| !a.status.backed_up())
            .filter(|a| {
                (nos.contains(&a.no) && ledger.is_all_uploaded(a))
                    || (a.discarded && modes.contains(&a.build_mode))
            })
            .map(|a| {
                let dest_dir = backup_root
                    .join(&a.build_target)
                    .join(a.upload_timestamp.to_string())
                    .join(a.bundle_type.dir_name());
                let files: Vec<_> = [FileKind::Bundle, FileKind::Manifest]
                    .into_iter()
                    .map(|kind| {
                        (
                            ledger.local_path(a, kind),
                            dest_dir.join(ledger.file_name(a, kind)),
                        )
                    })
                    .collect();
                (a.no, a.discarded, files)
            })
            .collect()
    };

    let mut backed_up = 0;
    for (no, discarded, files) in plan {
        for (local, dest) in files {
            if !local.exists() {
                continue;
            }
            if discarded {
                log::debug!("Deleting discarded build output {}", local.display());
                fs::remove_file(&local).await?;
            } else {
                fs::move_file(&local, &dest).await?;
            }
        }
        if !discarded {
            ledger.lock().await.mark_backed_up(no)?;
            backed_up += 1;
        }
    }
    log::info!("Backed up {} artifacts to {}", backed_up, backup_root.display());
    Ok(backed_up)
}
