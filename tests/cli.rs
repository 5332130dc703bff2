use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn make_tree(root: &Path) {
    for (chapter, pages) in [("ch1", 2u32), ("ch2", 1)] {
        let dir = root.join("Comic A").join("Vol 1").join(chapter);
        fs::create_dir_all(&dir).unwrap();
        for p in 0..pages {
            image::RgbImage::new(4 + p, 6).save(dir.join(format!("{}.png", p + 1))).unwrap();
        }
    }
}

fn pkz() -> Command {
    Command::cargo_bin("pkz").unwrap()
}

#[test]
fn pack_info_verify() {
    let src = tempdir().unwrap();
    make_tree(src.path());
    let out = tempdir().unwrap();
    let archive = out.path().join("a.pkz");

    pkz()
        .args(["pack", src.path().to_str().unwrap(), "-o", archive.to_str().unwrap(), "--level", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Packed 1 comics, 1 volumes, 2 chapters, 3 pictures"));
    assert!(archive.exists());

    pkz()
        .args(["info", archive.to_str().unwrap(), "--tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 comics, 1 volumes, 2 chapters, 3 pictures"))
        .stdout(predicate::str::contains("Comic A"))
        .stdout(predicate::str::contains("4x6 png"));

    pkz()
        .args(["verify", archive.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 4 entries, 3 pictures"));
}

#[test]
fn info_json_and_cat() {
    let src = tempdir().unwrap();
    make_tree(src.path());
    let out = tempdir().unwrap();
    let archive = out.path().join("a.pkz");
    pkz().args(["pack", src.path().to_str().unwrap(), "-o", archive.to_str().unwrap()]).assert().success();

    let output = pkz().args(["info", archive.to_str().unwrap(), "--json"]).output().unwrap();
    assert!(output.status.success());
    let index = pkz::Archive::from_json(&output.stdout).unwrap();
    assert_eq!(index.picture_count, 3);

    let picture = &index.comics[0].volumes[0].chapters[0].pictures[0];
    let target = out.path().join("page.png");
    pkz()
        .args(["cat", archive.to_str().unwrap(), &picture.picture_path, "-o", target.to_str().unwrap()])
        .assert()
        .success();
    let expected = fs::read(src.path().join("Comic A").join("Vol 1").join("ch1").join("1.png")).unwrap();
    assert_eq!(fs::read(&target).unwrap(), expected);

    pkz()
        .args(["cat", archive.to_str().unwrap(), pkz::INDEX_ENTRY])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"comic_count\""));
}

#[test]
fn extract_writes_tree() {
    let src = tempdir().unwrap();
    make_tree(src.path());
    let out = tempdir().unwrap();
    let archive = out.path().join("a.pkz");
    pkz().args(["pack", src.path().to_str().unwrap(), "-o", archive.to_str().unwrap()]).assert().success();

    let tree = out.path().join("tree");
    pkz()
        .args(["x", archive.to_str().unwrap(), "-o", tree.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Extracted 3 assets"));
    let chapter = tree.join("001 Comic A").join("001 Vol 1").join("002 ch2");
    assert!(chapter.join("chapter.json").is_file());
    assert!(chapter.join("pictures.json").is_file());
    assert!(chapter.join("0001.png").is_file());
    assert!(tree.join("archive.json").is_file());
}

#[test]
fn errors_exit_nonzero() {
    let out = tempdir().unwrap();
    let garbage = out.path().join("garbage.pkz");
    fs::write(&garbage, b"not an archive at all").unwrap();

    pkz().args(["info", garbage.to_str().unwrap()]).assert().failure().stderr(predicate::str::contains("Error:"));
    pkz()
        .args(["info", out.path().join("missing.pkz").to_str().unwrap()])
        .assert()
        .failure();
    pkz().args(["pack", out.path().to_str().unwrap(), "-o", "x.pkz", "--level", "12"]).assert().failure();
}
