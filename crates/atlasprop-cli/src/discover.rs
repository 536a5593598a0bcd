//! Session-layout discovery.
//!
//! Data is laid out as `<root>/<session>/<subject>/{T2w,DTI}/`, where a
//! session is an acquisition day such as `P5`. A diffusion run locates its
//! structural products in the sibling `T2w/` directory, and a reference
//! session's lesion mask under `<root>/<day>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atlasprop_pipeline::naming;
use atlasprop_pipeline::{ReferenceMask, T2SessionPaths};

/// Subjects in different sessions share this many leading characters.
const SUBJECT_PREFIX_LEN: usize = 9;

/// Files directly in `dir` whose names end with `suffix`, sorted.
pub fn find_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && file_name(&path).is_some_and(|n| n.ends_with(suffix)) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// `<subject>/` of a volume stored at `<subject>/<modality>/<file>`.
fn subject_dir(input: &Path) -> Result<&Path> {
    input
        .parent()
        .and_then(Path::parent)
        .with_context(|| format!("{} is not inside a <subject>/<modality>/ directory", input.display()))
}

/// Structural products belonging to the same session as `dti_input`.
pub fn t2_session(dti_input: &Path) -> Result<T2SessionPaths> {
    let t2_dir = subject_dir(dti_input)?.join(naming::T2_DIR);
    let t2 = find_with_suffix(&t2_dir, naming::BET)?
        .into_iter()
        .next()
        .with_context(|| format!("no *{} in {}", naming::BET, t2_dir.display()))?;
    let lesion_mask = find_with_suffix(&t2_dir, naming::LESION_MASK)?.into_iter().next();
    Ok(T2SessionPaths::for_input(&t2, lesion_mask)?)
}

/// Look up the atlas-space lesion mask of session `day` for the subject of
/// `dti_input`.
pub fn reference_mask(dti_input: &Path, day: Option<&str>) -> ReferenceMask {
    let Some(day) = day else {
        return ReferenceMask::NotRequested;
    };
    let missing = |reason: String| ReferenceMask::Missing {
        session: day.to_string(),
        reason,
    };

    let Some(root) = subject_dir(dti_input).ok().and_then(Path::parent).and_then(Path::parent) else {
        return missing(format!("{} has no session root", dti_input.display()));
    };
    let Some(prefix) = file_name(dti_input).map(|n| n.chars().take(SUBJECT_PREFIX_LEN).collect::<String>()) else {
        return missing(format!("{} has no file name", dti_input.display()));
    };

    let session_dir = root.join(day);
    let subjects = match sorted_dirs(&session_dir) {
        Ok(dirs) => dirs,
        Err(e) => return missing(format!("{}: {}", session_dir.display(), e)),
    };
    for subject in subjects.iter().filter(|d| file_name(d).is_some_and(|n| n.starts_with(&prefix))) {
        let t2_dir = subject.join(naming::T2_DIR);
        if !t2_dir.is_dir() {
            continue;
        }
        if let Ok(masks) = find_with_suffix(&t2_dir, naming::INCIDENCE_MASK_FILE) {
            if let Some(path) = masks.into_iter().next() {
                return ReferenceMask::Found {
                    session: day.to_string(),
                    path,
                };
            }
        }
    }
    missing(format!("no {}* subject with a *{} in {}", prefix, naming::INCIDENCE_MASK_FILE, session_dir.display()))
}

fn sorted_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Every `*Bet.nii.gz` inside a directory named `modality` below `root`.
fn find_inputs(root: &Path, modality: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for sub in sorted_dirs(&dir).with_context(|| format!("reading {}", dir.display()))? {
            if file_name(&sub) == Some(modality) {
                found.extend(find_with_suffix(&sub, naming::BET)?);
            } else {
                pending.push(sub);
            }
        }
    }
    found.sort();
    Ok(found)
}

pub fn find_t2_inputs(root: &Path) -> Result<Vec<PathBuf>> {
    find_inputs(root, naming::T2_DIR)
}

pub fn find_dti_inputs(root: &Path) -> Result<Vec<PathBuf>> {
    find_inputs(root, naming::DTI_DIR)
}
