use crate::error::{DataError, Result};
use crate::types::Boundaries;
use std::fs::{self, Permissions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Writes the collection pretty-printed (2-space indent) and returns the file size in bytes.
pub fn write_collection(path: &Path, boundaries: &Boundaries) -> Result<u64> {
    let value = boundaries.to_json().map_err(|e| DataError::write(path, e.into()))?;
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, &value).map_err(io::Error::from)
    })?;

    let size = fs::metadata(path).map_err(|e| DataError::write(path, e))?.len();
    info!("Saved {:?}", path);
    info!("Size: {:.2} MB", size as f64 / 1024.0 / 1024.0);
    Ok(size)
}

/// Replaces `path` with whatever `fill` writes, via a temp file in the same directory.
///
/// Missing parent directories are created. The destination is only touched by
/// the final rename, so a failure leaves any previous file as it was. An
/// existing destination keeps its permissions and must be writable; a new one
/// gets 0644.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| DataError::write(dir, e))?;

    let permissions = match fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => {
            let denied = io::Error::new(io::ErrorKind::PermissionDenied, "destination is read-only");
            return Err(DataError::write(path, denied));
        }
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => new_file_permissions(),
        Err(e) => return Err(DataError::write(path, e)),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DataError::write(dir, e))?;
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| DataError::write(path, e))?;
    }
    {
        let mut writer = BufWriter::new(&mut tmp);
        fill(&mut writer).map_err(|e| DataError::write(path, e))?;
        writer.flush().map_err(|e| DataError::write(path, e))?;
    }

    tmp.persist(path).map_err(|e| DataError::write(path, e.error))?;
    Ok(())
}

// NamedTempFile creates files as 0600.
#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, FeatureCollection, GeoJson};
    use serde_json::json;

    fn sample() -> Boundaries {
        let props = json!({"ISO_A3": "FRA", "population_prison": 70000, "has_data": true});
        let collection = FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: None,
                id: Some(geojson::feature::Id::Number(0u64.into())),
                properties: props.as_object().cloned(),
                foreign_members: None,
            }],
            foreign_members: None,
        };
        Boundaries {
            collection,
            raw_geometry: vec![json!({"type": "Point", "coordinates": [2, 46.25]})],
        }
    }

    #[test]
    fn creates_nested_directories_and_pretty_prints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("zonzon").join("out.geojson");

        let size = write_collection(&path, &sample()).unwrap();
        let content = fs::read_to_string(&path).unwrap();

        assert_eq!(size, content.len() as u64);
        assert!(content.starts_with("{\n  \""));
        assert!(content.contains("\n    {\n      \""));
        let reparsed: GeoJson = content.parse().unwrap();
        assert!(matches!(reparsed, GeoJson::FeatureCollection(fc) if fc.features.len() == 1));
    }

    #[test]
    fn geometry_is_written_as_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        write_collection(&path, &sample()).unwrap();

        let out: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let geometry = &out["features"][0]["geometry"];
        assert_eq!(geometry, &json!({"type": "Point", "coordinates": [2, 46.25]}));
        assert!(geometry["coordinates"][0].is_u64());
    }

    #[test]
    fn output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.geojson");
        let b = dir.path().join("b.geojson");
        write_collection(&a, &sample()).unwrap();
        write_collection(&b, &sample()).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn overwrites_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        fs::write(&path, "stale").unwrap();

        write_collection(&path, &sample()).unwrap();

        assert_ne!(fs::read_to_string(&path).unwrap(), "stale");
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_fill_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        fs::write(&path, "previous").unwrap();

        let err = write_atomic(&path, |_| Err(io::Error::other("boom"))).unwrap_err();

        assert!(matches!(err, DataError::Write { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn uncreatable_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let err = write_collection(&blocker.join("out.geojson"), &sample()).unwrap_err();
        assert!(matches!(err, DataError::Write { .. }));
    }

    #[cfg(unix)]
    mod modes {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn mode(path: &Path) -> u32 {
            fs::metadata(path).unwrap().permissions().mode() & 0o777
        }

        #[test]
        fn new_file_is_world_readable() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.geojson");
            write_collection(&path, &sample()).unwrap();
            assert_eq!(mode(&path), 0o644);
        }

        #[test]
        fn existing_file_keeps_its_mode() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.geojson");
            fs::write(&path, "stale").unwrap();
            fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

            write_collection(&path, &sample()).unwrap();
            assert_eq!(mode(&path), 0o640);
        }

        #[test]
        fn read_only_destination_is_write_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.geojson");
            fs::write(&path, "locked").unwrap();
            fs::set_permissions(&path, Permissions::from_mode(0o444)).unwrap();

            let err = write_collection(&path, &sample()).unwrap_err();
            assert!(matches!(err, DataError::Write { .. }));
            assert_eq!(fs::read_to_string(&path).unwrap(), "locked");
            assert_eq!(mode(&path), 0o444);
        }
    }
}
