//! Packages user strategy source into an immutable tar archive the sandbox
//! can stage without the host ever importing or executing the code (C12.2).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{PlatformError, Result};

const BUNDLE_SCHEMA: &str = "tradeguard.strategy_bundle.v1";

#[derive(Debug, Clone, Serialize)]
pub struct BundleManifest {
    pub schema: String,
    pub strategy_id: String,
    pub entrypoint: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StrategyBundle {
    pub bundle_path: PathBuf,
    pub sha256: String,
    pub manifest: BundleManifest,
}

fn safe_relpath(base: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| PlatformError::Validation("path outside bundle root".to_string()))?;
    let rel = rel.to_string_lossy().replace('\\', "/");
    if rel.starts_with('/') || rel.split('/').any(|seg| seg == "..") {
        return Err(PlatformError::Validation("unsafe path in bundle".to_string()));
    }
    Ok(rel)
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}

/// Builds `{strategy_id}.tar` at `out_dir`, laid out as `manifest.json` plus
/// `strategy/<entrypoint>` (single file) or `strategy/<relative path>`
/// (directory tree of `.py`/`.txt`/`.md`/`.json`/`.yaml`/`.yml` files).
pub fn create_strategy_bundle(
    strategy_source: &Path,
    entrypoint: &str,
    strategy_id: &str,
    out_dir: &Path,
) -> Result<StrategyBundle> {
    if !strategy_source.exists() {
        return Err(PlatformError::Validation(format!(
            "strategy_source not found: {}",
            strategy_source.display()
        )));
    }
    std::fs::create_dir_all(out_dir)?;
    let bundle_path = out_dir.join(format!("{strategy_id}.tar"));

    let mut files: Vec<(PathBuf, String)> = Vec::new();
    if strategy_source.is_file() {
        if strategy_source.extension().and_then(|e| e.to_str()) != Some("py") {
            return Err(PlatformError::Validation("strategy_source file must be .py".to_string()));
        }
        files.push((strategy_source.to_path_buf(), format!("strategy/{entrypoint}")));
    } else {
        let allowed_ext = ["py", "txt", "md", "json", "yaml", "yml"];
        for entry in walk_files(strategy_source)? {
            if entry
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false)
            {
                continue;
            }
            let ext = entry.extension().and_then(|e| e.to_str()).unwrap_or("");
            if allowed_ext.contains(&ext) {
                let rel = safe_relpath(strategy_source, &entry)?;
                files.push((entry, format!("strategy/{rel}")));
            }
        }
        let ep = strategy_source.join(entrypoint);
        if !ep.exists() {
            return Err(PlatformError::Validation(format!(
                "entrypoint not found in directory: {}",
                ep.display()
            )));
        }
    }

    let manifest = BundleManifest {
        schema: BUNDLE_SCHEMA.to_string(),
        strategy_id: strategy_id.to_string(),
        entrypoint: entrypoint.to_string(),
        files: files.iter().map(|(_, dst)| dst.clone()).collect(),
    };

    let file = std::fs::File::create(&bundle_path)?;
    let mut builder = tar::Builder::new(file);

    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o444);
    header.set_cksum();
    builder.append_data(&mut header, "manifest.json", manifest_bytes.as_slice())?;

    for (src, dst) in &files {
        let mut f = std::fs::File::open(src)?;
        let mut header = tar::Header::new_gnu();
        let len = f.metadata()?.len();
        header.set_size(len);
        header.set_mode(0o444);
        header.set_cksum();
        builder.append_data(&mut header, dst, &mut f)?;
    }
    builder.into_inner()?.flush()?;

    let sha256 = sha256_file(&bundle_path)?;
    Ok(StrategyBundle {
        bundle_path,
        sha256,
        manifest,
    })
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn bundles_single_file_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = tmp.path().join("strategy.py");
        std::fs::write(&strategy, b"def on_event(e): pass\n").unwrap();
        let out_dir = tmp.path().join("out");
        let bundle = create_strategy_bundle(&strategy, "user_strategy.py", "s1", &out_dir).unwrap();
        assert!(bundle.bundle_path.exists());
        assert_eq!(bundle.manifest.files, vec!["strategy/user_strategy.py"]);
        assert_eq!(bundle.sha256.len(), 64);
    }

    #[test]
    fn rejects_missing_entrypoint_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("strategy_dir");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("helper.py"), b"x = 1\n").unwrap();
        let out_dir = tmp.path().join("out");
        let err = create_strategy_bundle(&dir, "user_strategy.py", "s1", &out_dir).unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
    }

    #[test]
    fn bundles_directory_with_entrypoint() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("strategy_dir");
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join("user_strategy.py")).unwrap();
        writeln!(f, "def on_event(e): pass").unwrap();
        let out_dir = tmp.path().join("out");
        let bundle = create_strategy_bundle(&dir, "user_strategy.py", "s1", &out_dir).unwrap();
        assert!(bundle.manifest.files.contains(&"strategy/user_strategy.py".to_string()));
    }
}
