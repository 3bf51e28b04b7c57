//! Library-level round trips over a throwaway images root.

use portfolio_image_pipeline::pipeline::PathResolver;
use portfolio_image_pipeline::{ApplyFailurePolicy, Config, DirectoryState, Pipeline};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

struct Site {
    _temp: TempDir,
    config: Config,
}

impl Site {
    fn new(dirs: &[&str]) -> Self {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("public").join("assets").join("images");
        for dir in dirs {
            fs::create_dir_all(images.join(dir)).unwrap();
        }
        let config = Config {
            images_root: images,
            public_root: temp.path().join("public"),
            managed_dirs: dirs.iter().map(PathBuf::from).collect(),
            ..Default::default()
        };
        Self { _temp: temp, config }
    }

    fn live(&self, dir: &str) -> PathBuf {
        PathResolver::live_dir(&self.config, Path::new(dir))
    }

    fn staging(&self, dir: &str) -> PathBuf {
        PathResolver::staging_dir(&self.config, Path::new(dir))
    }

    fn write(&self, dir: &str, name: &str, content: &[u8]) {
        fs::write(self.live(dir).join(name), content).unwrap();
    }

    fn stage(&self, dir: &str, name: &str, content: &[u8]) {
        fs::create_dir_all(self.staging(dir)).unwrap();
        fs::write(self.staging(dir).join(name), content).unwrap();
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone()).unwrap()
    }
}

/// Sorted (name, bytes) of the regular files directly inside `dir`
fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            (name, fs::read(&p).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn backup_before_apply_yields_exact_restore() {
    let site = Site::new(&["ai-portfolio"]);
    site.write("ai-portfolio", "page-1.png", b"original page");
    site.write("ai-portfolio", "cover.jpg", b"original cover");
    site.write("ai-portfolio", "readme.txt", b"notes");
    let before = snapshot(&site.live("ai-portfolio"));

    site.stage("ai-portfolio", "page-1.webp", b"webp");
    site.stage("ai-portfolio", "page-1.jpg", b"jpg");
    site.stage("ai-portfolio", "cover.jpg", b"smaller cover");

    let pipeline = site.pipeline();
    assert_ok!(pipeline.backup().await);
    let applied = pipeline.apply().await.unwrap();
    assert!(applied.failed.is_empty());
    assert_ne!(snapshot(&site.live("ai-portfolio")), before);

    let restored = pipeline.restore().await.unwrap();
    assert_eq!(restored.total_restored(), 2);
    assert_eq!(snapshot(&site.live("ai-portfolio")), before);

    let status = pipeline.status().await.unwrap();
    assert_eq!(status[0].state, DirectoryState::Original);
    assert_eq!(status[0].backup_files, 2);
}

#[tokio::test]
async fn apply_exhausts_staging() {
    let site = Site::new(&["video-planning"]);
    site.write("video-planning", "video-1.png", b"orig");
    let staged = [("video-1.webp", b"w".as_slice()), ("video-1.jpg", b"j".as_slice())];
    for (name, content) in staged {
        site.stage("video-planning", name, content);
    }

    let summary = site.pipeline().apply().await.unwrap();
    assert_eq!(summary.totals.webp, 1);
    assert_eq!(summary.totals.jpg, 1);
    assert!(!site.staging("video-planning").exists());
    for (name, content) in staged {
        assert_eq!(fs::read(site.live("video-planning").join(name)).unwrap(), content);
    }
}

#[tokio::test]
async fn restore_without_backup_copies_nothing() {
    let site = Site::new(&["product-planning"]);
    site.write("product-planning", "a.png", b"a");
    let before = snapshot(&site.live("product-planning"));

    let summary = site.pipeline().restore().await.unwrap();
    assert_eq!(summary.total_restored(), 0);
    assert!(summary.failed.is_empty());
    assert_eq!(snapshot(&site.live("product-planning")), before);
}

#[tokio::test]
async fn backup_is_idempotent_when_copying_if_absent() {
    let site = Site::new(&["planning-portfolio"]);
    site.write("planning-portfolio", "a.png", b"first");
    let pipeline = site.pipeline();
    pipeline.backup().await.unwrap();
    let mirror = PathResolver::backup_dir(&site.config, Path::new("planning-portfolio"));
    let first = snapshot(&mirror);

    site.write("planning-portfolio", "a.png", b"edited later");
    let summary = pipeline.backup().await.unwrap();
    assert_eq!(summary.total_copied(), 0);
    assert_eq!(snapshot(&mirror), first);
}

#[tokio::test]
async fn missing_directories_are_skipped() {
    let mut site = Site::new(&["gallery"]);
    site.config.managed_dirs.push(PathBuf::from("not-created"));
    site.write("gallery", "a.png", b"a");

    let pipeline = site.pipeline();
    let backup = pipeline.backup().await.unwrap();
    assert_eq!(backup.directories.len(), 1);
    assert!(backup.failed.is_empty());

    let status = pipeline.status().await.unwrap();
    assert!(status[0].exists);
    assert!(!status[1].exists);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut site = Site::new(&["gallery"]);
    site.config.workers = 0;
    assert_err!(Pipeline::new(site.config.clone()));
}

#[tokio::test]
async fn optimize_fails_fast_without_tools() {
    let mut site = Site::new(&["gallery"]);
    site.write("gallery", "a.png", b"a");
    site.config.tools.cwebp = PathBuf::from("no-such-cwebp-binary");
    site.config.tools.magick = PathBuf::from("no-such-magick-binary");

    assert_err!(site.pipeline().optimize(false).await);
    assert!(!site.staging("gallery").exists());
}

/// Shell scripts that copy their input to their output, standing in for the
/// real encoders.
#[cfg(unix)]
fn fake_tools(dir: &Path) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let cwebp = dir.join("cwebp");
    fs::write(
        &cwebp,
        "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\nwhile [ $# -gt 3 ]; do shift; done\ncp \"$1\" \"$3\"\n",
    )
    .unwrap();
    let magick = dir.join("magick");
    fs::write(
        &magick,
        "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\nin=\"$1\"\nfor a; do out=\"$a\"; done\ncp \"$in\" \"$out\"\n",
    )
    .unwrap();
    for tool in [&cwebp, &magick] {
        fs::set_permissions(tool, fs::Permissions::from_mode(0o755)).unwrap();
    }
    (cwebp, magick)
}

#[cfg(unix)]
#[tokio::test]
async fn optimize_apply_restore_with_stand_in_tools() {
    let mut site = Site::new(&["ai-portfolio"]);
    let bin = TempDir::new().unwrap();
    let (cwebp, magick) = fake_tools(bin.path());
    site.config.tools.cwebp = cwebp;
    site.config.tools.magick = magick;
    site.config.workers = 2;

    site.write("ai-portfolio", "page-1.png", b"page");
    site.write("ai-portfolio", "icon.png", b"icon");
    let before = snapshot(&site.live("ai-portfolio"));

    let pipeline = site.pipeline();
    let optimized = pipeline.optimize(false).await.unwrap();
    assert_eq!(optimized.stats.files, 2);
    assert_eq!(optimized.stats.conversions_failed, 0);
    // page-1 → webp + jpg, icon → webp + png
    assert_eq!(optimized.stats.conversions_ok, 4);
    assert_eq!(pipeline.status().await.unwrap()[0].state, DirectoryState::Staged);

    pipeline.apply().await.unwrap();
    assert_eq!(pipeline.status().await.unwrap()[0].state, DirectoryState::Applied);

    // Applied directories are left alone unless forced
    let again = pipeline.optimize(false).await.unwrap();
    assert_eq!(again.skipped_applied.len(), 1);
    assert!(!site.staging("ai-portfolio").exists());

    pipeline.restore().await.unwrap();
    assert_eq!(snapshot(&site.live("ai-portfolio")), before);
}

/// Two directories with staged output; a directory named like the first
/// directory's staged file blocks its copy.
fn site_with_blocked_first_dir() -> Site {
    let site = Site::new(&["first", "second"]);
    for dir in ["first", "second"] {
        site.write(dir, "a.png", b"original");
        site.stage(dir, "a.webp", b"webp");
    }
    fs::create_dir(site.live("first").join("a.webp")).unwrap();
    site
}

#[tokio::test]
async fn failed_directory_keeps_staging_and_the_run_continues() {
    let site = site_with_blocked_first_dir();
    let pipeline = site.pipeline();

    let summary = pipeline.apply().await.unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].dir, site.live("first"));
    assert_eq!(summary.directories.len(), 1);

    assert!(site.staging("first").is_dir());
    assert!(!site.staging("second").exists());
    assert_eq!(fs::read(site.live("second").join("a.webp")).unwrap(), b"webp");

    let status = pipeline.status().await.unwrap();
    assert_eq!(status[0].state, DirectoryState::Staged);
    assert_eq!(status[1].state, DirectoryState::Applied);
}

#[tokio::test]
async fn abort_run_stops_at_the_first_failed_directory() {
    let mut site = site_with_blocked_first_dir();
    site.config.apply_failure_policy = ApplyFailurePolicy::AbortRun;
    let pipeline = site.pipeline();

    assert_err!(pipeline.apply().await);

    assert!(site.staging("first").is_dir());
    assert!(site.staging("second").is_dir());
    assert!(!site.live("second").join("a.webp").exists());
    let status = pipeline.status().await.unwrap();
    assert_eq!(status[1].state, DirectoryState::Staged);
}

#[cfg(unix)]
#[tokio::test]
async fn directory_with_only_failed_conversions_stays_original() {
    let mut site = Site::new(&["gallery"]);
    site.write("gallery", "a.png", b"a");
    // `true` passes the version check but never writes an output
    site.config.tools.cwebp = PathBuf::from("true");
    site.config.tools.magick = PathBuf::from("true");
    let pipeline = site.pipeline();

    let optimized = pipeline.optimize(false).await.unwrap();
    assert_eq!(optimized.stats.conversions_ok, 0);
    assert_eq!(optimized.stats.conversions_failed, 2);
    assert!(!site.staging("gallery").exists());
    assert_eq!(pipeline.status().await.unwrap()[0].state, DirectoryState::Original);

    let applied = pipeline.apply().await.unwrap();
    assert!(applied.directories.is_empty());
    assert_eq!(pipeline.status().await.unwrap()[0].state, DirectoryState::Original);

    let again = pipeline.optimize(false).await.unwrap();
    assert!(again.skipped_applied.is_empty());
}
