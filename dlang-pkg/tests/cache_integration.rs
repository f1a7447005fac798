//! Integration tests for the package cache under concurrency.
//!
//! Run with: `cargo test --test cache_integration`

use std::path::PathBuf;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use dlang_pkg::cache::{PackageCache, PackageMetadata};

const COMMIT: &str = "abcdefabcdefabcdefabcdefabcdefabcdefabcd";

fn write_tarball(dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("acme-core-abcdef0/{name}"), contents.as_bytes())
            .unwrap();
    }
    let bytes = builder.into_inner().unwrap().finish().unwrap();
    let path = dir.path().join("core.tar.gz");
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_concurrent_installs_of_one_package() {
    let temp = TempDir::new().unwrap();
    let tarball = write_tarball(
        &temp,
        &[
            ("index.dlang", "model Core {}"),
            ("a/b/c.dlang", "entity Deep {}"),
        ],
    );
    let cache = Arc::new(PackageCache::for_workspace(temp.path()));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            let tarball = tarball.clone();
            tokio::spawn(async move { cache.put("acme", "core", COMMIT, &tarball).await })
        })
        .collect();

    let expected = cache.package_path("acme", "core", COMMIT);
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), expected);
    }

    assert_eq!(
        std::fs::read_to_string(expected.join("a/b/c.dlang")).unwrap(),
        "entity Deep {}"
    );
    let listed = cache.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].commit, COMMIT);

    let siblings = std::fs::read_dir(expected.parent().unwrap()).unwrap().count();
    assert_eq!(siblings, 1, "temporary directories were left behind");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_installs_of_different_packages() {
    let temp = TempDir::new().unwrap();
    let tarball = write_tarball(&temp, &[("index.dlang", "model X {}")]);
    let cache = Arc::new(PackageCache::for_workspace(temp.path()));

    let tasks: Vec<_> = ["one", "two", "three", "four"]
        .into_iter()
        .map(|repo| {
            let cache = cache.clone();
            let tarball = tarball.clone();
            tokio::spawn(async move {
                let path = cache.put("acme", repo, COMMIT, &tarball).await?;
                cache
                    .write_metadata(
                        "acme",
                        repo,
                        COMMIT,
                        &PackageMetadata {
                            integrity: format!("sha512-{repo}"),
                            resolved: format!("https://git.test/repos/acme/{repo}/tarball/{COMMIT}"),
                            commit_sha: COMMIT.to_string(),
                        },
                    )
                    .await?;
                Ok::<_, dlang_pkg::cache::CacheError>(path)
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap().join("index.dlang").exists());
    }

    let repos: Vec<_> = cache
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|package| package.repo)
        .collect();
    assert_eq!(repos, vec!["four", "one", "three", "two"]);
    assert_eq!(
        cache
            .read_metadata("acme", "two", COMMIT)
            .await
            .unwrap()
            .integrity,
        "sha512-two"
    );
}
