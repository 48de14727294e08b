// Per-subject staging between extraction and load
//
// Validated batches are written to numbered part files under
// <staging_dir>/subject_<id>/ as JSON record arrays, one file per batch.
// Extraction runs in parallel but only ever touches its own subject
// directory; the load phase reads the parts back in order. Keeping batches
// on disk between the phases bounds memory the same way the streamer does.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::ingest::Batch;

/// Writer side: owns one subject's staging directory during extraction
pub struct SubjectStaging {
    dir: PathBuf,
    subject_id: u32,
    parts: usize,
    epochs: u64,
}

impl SubjectStaging {
    /// Create a clean staging directory for a subject, wiping any
    /// leftovers from a previous run.
    pub fn create(staging_root: &Path, subject_id: u32) -> io::Result<Self> {
        let dir = staging_root.join(format!("subject_{}", subject_id));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            subject_id,
            parts: 0,
            epochs: 0,
        })
    }

    /// Append one validated batch as the next part file
    pub fn append_batch(&mut self, batch: &Batch) -> io::Result<()> {
        let path = part_path(&self.dir, self.parts);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(file, batch)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.parts += 1;
        self.epochs += batch.len() as u64;
        Ok(())
    }

    pub fn finish(self) -> StagedSubject {
        StagedSubject {
            subject_id: self.subject_id,
            dir: self.dir,
            parts: self.parts,
            epochs: self.epochs,
        }
    }
}

/// Result of a successful extraction: where the parts live
#[derive(Debug, Clone)]
pub struct StagedSubject {
    pub subject_id: u32,
    pub dir: PathBuf,
    pub parts: usize,
    pub epochs: u64,
}

impl StagedSubject {
    /// Part file paths in batch order
    pub fn part_paths(&self) -> Vec<PathBuf> {
        (0..self.parts).map(|i| part_path(&self.dir, i)).collect()
    }

    /// Remove the staging directory after a successful load
    pub fn cleanup(&self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            log::warn!(
                "[Staging] Could not remove {:?} after load: {}",
                self.dir,
                err
            );
        }
    }
}

fn part_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("part_{}.json", index))
}

/// Read one part file back into a batch
pub fn read_part(path: &Path) -> io::Result<Batch> {
    let file = BufReader::new(File::open(path)?);
    serde_json::from_reader(file).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{EpochRecord, SleepStage};

    fn batch(subject_id: u32, start: u32, len: u32) -> Batch {
        Batch::new(
            (start..start + len)
                .map(|epoch_idx| EpochRecord {
                    subject_id,
                    epoch_idx,
                    stage: SleepStage::N1,
                    delta_power: 1.0,
                    theta_power: 2.0,
                    alpha_power: 3.0,
                    sigma_power: 4.0,
                    beta_power: 5.0,
                })
                .collect(),
        )
    }

    #[test]
    fn parts_roundtrip_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut staging = SubjectStaging::create(root.path(), 9).unwrap();
        staging.append_batch(&batch(9, 0, 100)).unwrap();
        staging.append_batch(&batch(9, 100, 50)).unwrap();
        let staged = staging.finish();

        assert_eq!(staged.parts, 2);
        assert_eq!(staged.epochs, 150);

        let paths = staged.part_paths();
        assert_eq!(read_part(&paths[0]).unwrap().len(), 100);
        let second = read_part(&paths[1]).unwrap();
        assert_eq!(second.first_epoch_idx(), Some(100));
        assert_eq!(second.last_epoch_idx(), Some(149));
    }

    #[test]
    fn create_wipes_previous_run() {
        let root = tempfile::tempdir().unwrap();
        let mut staging = SubjectStaging::create(root.path(), 4).unwrap();
        staging.append_batch(&batch(4, 0, 10)).unwrap();
        let old = staging.finish();
        assert_eq!(old.part_paths().len(), 1);

        // A fresh run for the same subject starts from an empty directory
        let staging = SubjectStaging::create(root.path(), 4).unwrap();
        let fresh = staging.finish();
        assert_eq!(fresh.parts, 0);
        assert!(!old.part_paths()[0].exists());
    }

    #[test]
    fn cleanup_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut staging = SubjectStaging::create(root.path(), 2).unwrap();
        staging.append_batch(&batch(2, 0, 5)).unwrap();
        let staged = staging.finish();
        assert!(staged.dir.exists());
        staged.cleanup();
        assert!(!staged.dir.exists());
    }
}
