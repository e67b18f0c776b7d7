//! Zipped file-geodatabase archives.
//!
//! The archive is extracted into a scoped temporary directory, the
//! geodatabase folder is located, and the named layer is handed to a
//! [`LayerOpener`]. The default opener reads a GeoJSON export of the layer
//! (`<layer>.geojson` or `<layer>.json`); openers backed by a native
//! geodatabase driver plug in through the same trait.

use std::ffi::OsStr;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use super::geojson::decode_page;
use super::raw::RawFeatureCollection;
use crate::error::FetchError;

/// Reads one named layer out of an extracted geodatabase folder.
pub trait LayerOpener: Send + Sync {
    fn open(&self, folder: &Path, layer: &str) -> Result<RawFeatureCollection, FetchError>;
}

/// Opens `<layer>.geojson` / `<layer>.json` files found under the folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonExportOpener;

impl LayerOpener for GeoJsonExportOpener {
    fn open(&self, folder: &Path, layer: &str) -> Result<RawFeatureCollection, FetchError> {
        let path = WalkDir::new(folder)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .find(|p| is_layer_export(p, layer))
            .ok_or_else(|| FetchError::LayerNotFound {
                folder: folder.display().to_string(),
                layer: layer.to_string(),
            })?;

        debug!("Opening layer {} from {}", layer, path.display());
        let page = decode_page(&fs::read(&path)?)?;
        Ok(RawFeatureCollection {
            features: page.features,
            crs: page.crs.unwrap_or_default(),
        })
    }
}

fn is_layer_export(path: &Path, layer: &str) -> bool {
    let stem_matches = path
        .file_stem()
        .and_then(OsStr::to_str)
        .is_some_and(|s| s.eq_ignore_ascii_case(layer));
    let ext_matches = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));
    stem_matches && ext_matches
}

/// Extract `bytes` and open `layer` from the geodatabase inside.
pub fn open_archive_layer(
    bytes: &[u8],
    folder_name: Option<&str>,
    layer: &str,
    opener: &dyn LayerOpener,
) -> Result<RawFeatureCollection, FetchError> {
    let dir = Builder::new().prefix("precinct-archive-").tempdir()?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    info!(
        "Extracting {} archive entries to {}",
        archive.len(),
        dir.path().display()
    );
    archive.extract(dir.path())?;

    let folder = locate_folder(dir.path(), folder_name, layer)?;
    opener.open(&folder, layer)
}

/// Find the named folder, or else the first `*.gdb` directory, under `root`.
fn locate_folder(
    root: &Path,
    folder_name: Option<&str>,
    layer: &str,
) -> Result<PathBuf, FetchError> {
    let mut dirs = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir());

    match folder_name {
        Some(name) => dirs
            .find(|e| e.file_name() == OsStr::new(name))
            .map(|e| e.into_path())
            .ok_or_else(|| FetchError::LayerNotFound {
                folder: name.to_string(),
                layer: layer.to_string(),
            }),
        None => Ok(dirs
            .find(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("gdb"))
            })
            .map(|e| e.into_path())
            .unwrap_or_else(|| root.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::squares;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_opens_layer_inside_gdb_folder() {
        let bytes = archive(&[
            (
                "COB_Planning.gdb/plan_Zoning.geojson",
                squares(&[(9, "z", [0.0, 0.0, 1.0, 1.0])], false),
            ),
            (
                "COB_Planning.gdb/plan_Wards.geojson",
                squares(&[(1, "1", [0.0, 0.0, 1.0, 1.0]), (2, "2", [1.0, 0.0, 2.0, 1.0])], false),
            ),
        ]);

        let collection =
            open_archive_layer(&bytes, None, "plan_Wards", &GeoJsonExportOpener).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_named_folder_must_exist() {
        let bytes = archive(&[(
            "COB_Planning.gdb/plan_Wards.geojson",
            squares(&[(1, "1", [0.0, 0.0, 1.0, 1.0])], false),
        )]);

        let result =
            open_archive_layer(&bytes, Some("Other.gdb"), "plan_Wards", &GeoJsonExportOpener);
        assert!(matches!(
            result,
            Err(FetchError::LayerNotFound { folder, .. }) if folder == "Other.gdb"
        ));
    }

    #[test]
    fn test_missing_layer_fails() {
        let bytes = archive(&[(
            "COB_Planning.gdb/plan_Zoning.geojson",
            squares(&[(1, "1", [0.0, 0.0, 1.0, 1.0])], false),
        )]);

        let result = open_archive_layer(&bytes, None, "plan_Wards", &GeoJsonExportOpener);
        assert!(matches!(
            result,
            Err(FetchError::LayerNotFound { layer, .. }) if layer == "plan_Wards"
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let result = open_archive_layer(b"not a zip", None, "plan_Wards", &GeoJsonExportOpener);
        assert!(matches!(result, Err(FetchError::Archive(_))));
    }
}
