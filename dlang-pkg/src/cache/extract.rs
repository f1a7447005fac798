//! Gzipped tarball extraction.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::trace;

/// Extract a `.tar.gz` into `dest`, stripping the single top-level folder
/// that git host tarballs wrap their contents in.
///
/// Only directories and regular files are written. Links and pax headers are
/// skipped, and entries with `..` or absolute paths are rejected. Returns
/// the number of files written.
pub fn extract_tarball(tarball: &Path, dest: &Path) -> io::Result<usize> {
    let file = File::open(tarball)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    fs::create_dir_all(dest)?;
    let mut files = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(relative) = strip_top_level(&path)? else {
            continue;
        };
        let target = dest.join(&relative);

        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            files += 1;
        } else {
            trace!(path = %path.display(), ?entry_type, "Skipping tar entry");
        }
    }

    Ok(files)
}

/// Drop the first path component. `None` for the top-level folder itself.
fn strip_top_level(path: &Path) -> io::Result<Option<PathBuf>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsafe path in tarball: {}", path.display()),
                ));
            }
        }
    }

    if parts.len() < 2 {
        return Ok(None);
    }
    Ok(Some(parts[1..].iter().collect()))
}

/// Build a gzipped tarball with every file under `top/`, the way git hosts
/// package a commit.
#[cfg(test)]
pub(crate) fn build_tarball(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let comment = "52 comment=0123456789abcdef0123456789abcdef01234567\n";
    let mut pax = tar::Header::new_ustar();
    pax.set_entry_type(EntryType::XGlobalHeader);
    pax.set_size(comment.len() as u64);
    pax.set_mode(0o644);
    builder
        .append_data(&mut pax, "pax_global_header", comment.as_bytes())
        .unwrap();

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    builder
        .append_data(&mut dir, format!("{top}/"), io::empty())
        .unwrap();

    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("{top}/{name}"), contents.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}
