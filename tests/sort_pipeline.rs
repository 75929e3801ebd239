//! Reference loading, classification and routing wired together with a stub
//! face analyzer standing in for the detection model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use facesort::{
    corpus, router::OutputRouter, storage, Embedding, FaceAnalyzer, PhotoClassifier,
    PhotoLabelSet, ReferenceDatabase,
};

fn emb(v: &[f32]) -> Embedding {
    Embedding::new(v.to_vec()).unwrap()
}

/// Maps file names to the faces "detected" in them; unknown files fail.
struct StubAnalyzer {
    faces: HashMap<String, Vec<Embedding>>,
    calls: usize,
}

impl StubAnalyzer {
    fn new(entries: Vec<(&str, Vec<Embedding>)>) -> Self {
        Self {
            faces: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: 0,
        }
    }
}

impl FaceAnalyzer for StubAnalyzer {
    fn analyze(&mut self, path: &Path) -> Result<Vec<Embedding>> {
        self.calls += 1;
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        match self.faces.get(&name) {
            Some(faces) => Ok(faces.clone()),
            None => anyhow::bail!("cannot decode {}", path.display()),
        }
    }
}

fn touch(path: PathBuf) -> Result<()> {
    fs::create_dir_all(path.parent().unwrap())?;
    fs::write(path, b"img")?;
    Ok(())
}

#[test]
fn sorts_photos_into_label_folders() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let refs = tmp.path().join("reference_faces");
    let photos = tmp.path().join("photos");
    let out = tmp.path().join("output");

    touch(refs.join("alice/alice1.jpg"))?;
    touch(refs.join("alice/group.jpg"))?;
    touch(refs.join("bob/bob1.png"))?;
    touch(refs.join("dave/blurry.jpg"))?;
    touch(refs.join("erin/readme.txt"))?;
    touch(photos.join("p1.jpg"))?;
    touch(photos.join("p2.JPEG"))?;
    touch(photos.join("p3.png"))?;
    touch(photos.join("p4.bmp"))?;
    touch(photos.join("notes.txt"))?;

    let mut analyzer = StubAnalyzer::new(vec![
        ("alice1.jpg", vec![emb(&[1.0, 0.0, 0.0])]),
        // only the first face of a reference image counts
        ("group.jpg", vec![emb(&[0.9, 0.1, 0.0]), emb(&[0.0, 0.0, 1.0])]),
        ("bob1.png", vec![emb(&[0.0, 1.0, 0.0])]),
        ("blurry.jpg", vec![]),
        ("p1.jpg", vec![emb(&[0.95, 0.05, 0.0])]),
        ("p2.JPEG", vec![emb(&[0.0, 1.0, 0.1]), emb(&[1.0, 0.0, 0.05])]),
        ("p3.png", vec![emb(&[0.0, 0.0, 1.0])]),
        ("p4.bmp", vec![]),
    ]);

    let db = ReferenceDatabase::from_corpus(&corpus::reference_corpus(&refs)?, &mut analyzer)?;
    assert_eq!(db.labels().collect::<Vec<_>>(), vec!["alice", "bob"]);
    assert_eq!(db.references("alice").unwrap().len(), 2);

    let router = OutputRouter::new(&out);
    router.create_label_dirs(db.labels())?;
    let classifier = PhotoClassifier::new(Arc::new(db), 0.5);

    let mut results = Vec::new();
    for photo in corpus::photo_files(&photos)? {
        let labels = classifier.process_photo(&photo, &mut analyzer)?;
        assert_eq!(router.route(&photo, &labels).len(), labels.len());
        results.push((photo.file_name().unwrap().to_string_lossy().into_owned(), labels));
    }

    let set = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<PhotoLabelSet>();
    assert_eq!(
        results,
        vec![
            ("p1.jpg".to_string(), set(&["alice"])),
            ("p2.JPEG".to_string(), set(&["alice", "bob"])),
            ("p3.png".to_string(), set(&[])),
            ("p4.bmp".to_string(), set(&[])),
        ]
    );

    assert!(out.join("alice/p1.jpg").exists());
    assert!(out.join("alice/p2.JPEG").exists());
    assert!(out.join("bob/p2.JPEG").exists());
    assert!(!out.join("bob/p1.jpg").exists());
    assert!(!out.join("dave").exists());
    assert_eq!(fs::read_dir(out.join("bob"))?.count(), 1);
    Ok(())
}

#[test]
fn snapshot_reproduces_classification() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let refs = tmp.path().join("refs");
    touch(refs.join("alice/a.jpg"))?;
    touch(refs.join("bob/b.jpg"))?;

    let mut analyzer = StubAnalyzer::new(vec![
        ("a.jpg", vec![emb(&[1.0, 0.0])]),
        ("b.jpg", vec![emb(&[0.0, 1.0])]),
    ]);
    let db = ReferenceDatabase::from_corpus(&corpus::reference_corpus(&refs)?, &mut analyzer)?;
    assert_eq!(analyzer.calls, 2);

    let snap = tmp.path().join("refs.bin");
    storage::save(&db, &snap)?;
    let restored = storage::load(&snap)?;

    let faces = vec![emb(&[0.2, 0.9])];
    let a = PhotoClassifier::new(Arc::new(db), 0.5).classify(&faces)?;
    let b = PhotoClassifier::new(Arc::new(restored), 0.5).classify(&faces)?;
    assert_eq!(a, b);
    assert_eq!(a.into_iter().collect::<Vec<_>>(), vec!["bob"]);
    Ok(())
}

#[test]
fn model_with_other_dimension_is_refused() -> Result<()> {
    let mut b = ReferenceDatabase::builder();
    b.add("alice", vec![emb(&[1.0, 0.0])])?;
    let classifier = PhotoClassifier::new(Arc::new(b.build()), 0.5);

    let mut analyzer = StubAnalyzer::new(vec![("x.jpg", vec![emb(&[1.0, 0.0, 0.0])])]);
    assert!(classifier
        .process_photo(Path::new("x.jpg"), &mut analyzer)
        .is_err());
    Ok(())
}
