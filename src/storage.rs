//! Reference database snapshots, so later runs can skip face detection on the
//! reference corpus.

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embedding::{self, Embedding, Label};
use crate::reference::ReferenceDatabase;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    label: Label,
    references: Array2<f32>,
}

pub fn to_bytes(db: &ReferenceDatabase) -> Result<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        entries: db
            .iter()
            .map(|(label, refs)| SnapshotEntry {
                label: label.to_string(),
                references: refs.matrix().to_owned(),
            })
            .collect(),
    };
    Ok(postcard::to_allocvec(&snapshot)?)
}

/// Decodes a snapshot, re-checking that every label is a plain folder name,
/// has references, and that all references share one dimensionality.
pub fn from_bytes(data: &[u8]) -> Result<ReferenceDatabase> {
    let snapshot: Snapshot = postcard::from_bytes(data).context("decoding snapshot")?;
    if snapshot.version != SNAPSHOT_VERSION {
        anyhow::bail!(
            "unsupported snapshot version {} (expected {})",
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }

    let mut builder = ReferenceDatabase::builder();
    for entry in snapshot.entries {
        embedding::check_label(&entry.label)?;
        let embeddings = entry
            .references
            .rows()
            .into_iter()
            .map(|row| Embedding::new(row.to_vec()))
            .collect::<crate::Result<Vec<_>>>()
            .with_context(|| format!("label {}", entry.label))?;
        if !builder
            .add(entry.label.clone(), embeddings)
            .with_context(|| format!("label {}", entry.label))?
        {
            anyhow::bail!("label {} has no reference embeddings", entry.label);
        }
    }
    Ok(builder.build())
}

pub fn save(db: &ReferenceDatabase, path: &Path) -> Result<()> {
    let data = to_bytes(db)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<ReferenceDatabase> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    from_bytes(&data).with_context(|| format!("loading snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec()).unwrap()
    }

    #[test]
    fn snapshot_preserves_database() -> Result<()> {
        let mut b = ReferenceDatabase::builder();
        b.add("alice", vec![emb(&[1.0, 0.0]), emb(&[0.6, 0.8])])?;
        b.add("bob", vec![emb(&[0.0, 1.0])])?;
        let db = b.build();

        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("nested/refs.bin");
        save(&db, &path)?;
        assert_eq!(load(&path)?, db);
        Ok(())
    }

    #[test]
    fn empty_label_in_snapshot_is_rejected() -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: vec![SnapshotEntry {
                label: "ghost".into(),
                references: Array2::zeros((0, 4)),
            }],
        };
        let data = postcard::to_allocvec(&snapshot)?;
        assert!(from_bytes(&data).is_err());
        Ok(())
    }

    #[test]
    fn mixed_dimensions_are_rejected() -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: vec![
                SnapshotEntry {
                    label: "a".into(),
                    references: Array2::ones((1, 2)),
                },
                SnapshotEntry {
                    label: "b".into(),
                    references: Array2::ones((1, 3)),
                },
            ],
        };
        let data = postcard::to_allocvec(&snapshot)?;
        assert!(from_bytes(&data).is_err());
        Ok(())
    }

    #[test]
    fn labels_escaping_the_output_folder_are_rejected() -> Result<()> {
        for label in ["/etc", "..", "../../home", "a/b"] {
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                entries: vec![SnapshotEntry {
                    label: label.into(),
                    references: Array2::ones((1, 2)),
                }],
            };
            let data = postcard::to_allocvec(&snapshot)?;
            let err = from_bytes(&data).unwrap_err();
            assert_eq!(
                err.downcast_ref::<crate::Error>(),
                Some(&crate::Error::InvalidLabel(label.to_string()))
            );
        }
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(from_bytes(&[0xff, 0x01, 0x02]).is_err());
    }
}
