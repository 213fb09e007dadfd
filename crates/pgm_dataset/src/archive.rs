//! `.npz` container support: a zip archive of `.npy` members.
//!
//! Members are held as raw `.npy` bytes and decoded on request, so one open
//! archive can serve typed reads (`read_u8`, `read_f32`, ...) and opaque
//! pass-through (`blob`) side by side. Numeric reads accept any integer or
//! float dtype and convert, since source files in the wild disagree on
//! label dtypes.

use crate::types::{ArchiveError, NpyBlob};
use ndarray::{ArrayBase, ArrayD, Data, Dimension};
use ndarray_npy::{ReadNpyExt, WritableElement, WriteNpyExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NPY_SUFFIX: &str = ".npy";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpzArchive {
    members: BTreeMap<String, Vec<u8>>,
}

impl NpzArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(path, e))?;
        let mut members = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| zip_error(path, e))?;
            if entry.is_dir() {
                continue;
            }
            let raw_name = entry.name().to_string();
            let name = raw_name
                .strip_suffix(NPY_SUFFIX)
                .unwrap_or(&raw_name)
                .to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| io_error(path, e))?;
            members.insert(name, bytes);
        }
        Ok(Self { members })
    }

    /// Member names without the `.npy` suffix.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    fn member(&self, name: &str) -> Result<&[u8], ArchiveError> {
        self.members
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ArchiveError::MissingMember {
                member: name.to_string(),
            })
    }

    pub fn blob(&self, name: &str) -> Result<NpyBlob, ArchiveError> {
        self.member(name).map(|bytes| NpyBlob(bytes.to_vec()))
    }

    pub fn read_f64(&self, name: &str) -> Result<ArrayD<f64>, ArchiveError> {
        let bytes = self.member(name)?;
        macro_rules! widen {
            ($($ty:ty),+) => {
                $(
                    if let Ok(arr) = ArrayD::<$ty>::read_npy(bytes) {
                        return Ok(arr.mapv(|v| v as f64));
                    }
                )+
            };
        }
        widen!(u8, i8, u16, i16, u32, i32, u64, i64, f32);
        ArrayD::<f64>::read_npy(bytes).map_err(|source| ArchiveError::NpyRead {
            member: name.to_string(),
            source,
        })
    }

    /// Values outside `0..=255` saturate.
    pub fn read_u8(&self, name: &str) -> Result<ArrayD<u8>, ArchiveError> {
        if let Ok(arr) = ArrayD::<u8>::read_npy(self.member(name)?) {
            return Ok(arr);
        }
        Ok(self
            .read_f64(name)?
            .mapv(|v| v.round().clamp(0.0, 255.0) as u8))
    }

    pub fn read_f32(&self, name: &str) -> Result<ArrayD<f32>, ArchiveError> {
        if let Ok(arr) = ArrayD::<f32>::read_npy(self.member(name)?) {
            return Ok(arr);
        }
        Ok(self.read_f64(name)?.mapv(|v| v as f32))
    }

    /// Read a member holding exactly one integer value (0-d or one-element array).
    pub fn read_scalar_i64(&self, name: &str) -> Result<i64, ArchiveError> {
        let arr = self.read_f64(name)?;
        if arr.len() != 1 {
            return Err(ArchiveError::Malformed {
                member: name.to_string(),
                msg: format!("expected a single value, got shape {:?}", arr.shape()),
            });
        }
        let value = arr.iter().next().copied().unwrap_or_default();
        if value.fract() != 0.0 {
            return Err(ArchiveError::Malformed {
                member: name.to_string(),
                msg: format!("expected an integer, got {value}"),
            });
        }
        Ok(value as i64)
    }

    pub fn insert_array<S, D>(
        &mut self,
        name: &str,
        array: &ArrayBase<S, D>,
    ) -> Result<(), ArchiveError>
    where
        S: Data,
        S::Elem: WritableElement,
        D: Dimension,
    {
        let mut bytes = Vec::new();
        array
            .write_npy(&mut bytes)
            .map_err(|source| ArchiveError::NpyWrite {
                member: name.to_string(),
                source,
            })?;
        self.members.insert(name.to_string(), bytes);
        Ok(())
    }

    pub fn insert_blob(&mut self, name: &str, blob: &NpyBlob) {
        self.members.insert(name.to_string(), blob.0.clone());
    }

    /// Write every member Deflate-compressed, the way `numpy.savez_compressed` does.
    pub fn write(&self, path: &Path) -> Result<(), ArchiveError> {
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.members {
            zip.start_file(format!("{name}{NPY_SUFFIX}"), options)
                .map_err(|e| zip_error(path, e))?;
            zip.write_all(bytes).map_err(|e| io_error(path, e))?;
        }
        let mut out = zip.finish().map_err(|e| zip_error(path, e))?;
        out.flush().map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn zip_error(path: &Path, source: zip::result::ZipError) -> ArchiveError {
    ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, Array2};

    #[test]
    fn integer_members_widen_to_float() -> Result<(), ArchiveError> {
        let mut archive = NpzArchive::new();
        archive.insert_array("meta", &arr1(&[0u8, 1, 0, 1]))?;
        let meta = archive.read_f32("meta")?;
        assert_eq!(meta.as_slice(), Some(&[0.0f32, 1.0, 0.0, 1.0][..]));
        Ok(())
    }

    #[test]
    fn float_image_saturates_into_u8() -> Result<(), ArchiveError> {
        let mut archive = NpzArchive::new();
        archive.insert_array("image", &Array2::from_elem((2, 2), 300.0f64))?;
        let image = archive.read_u8("image")?;
        assert!(image.iter().all(|&v| v == 255));
        Ok(())
    }

    #[test]
    fn scalar_target_accepts_zero_dim_arrays() -> Result<(), ArchiveError> {
        let mut archive = NpzArchive::new();
        archive.insert_array("target", &arr0(5i64))?;
        assert_eq!(archive.read_scalar_i64("target")?, 5);
        Ok(())
    }

    #[test]
    fn scalar_target_rejects_vectors() -> Result<(), ArchiveError> {
        let mut archive = NpzArchive::new();
        archive.insert_array("target", &arr1(&[1i64, 2]))?;
        assert!(matches!(
            archive.read_scalar_i64("target"),
            Err(ArchiveError::Malformed { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_member_is_reported_by_name() {
        let archive = NpzArchive::new();
        match archive.read_u8("image") {
            Err(ArchiveError::MissingMember { member }) => assert_eq!(member, "image"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn written_archive_reopens_with_same_members() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.npz");
        let mut archive = NpzArchive::new();
        archive.insert_array("target", &arr0(3i64))?;
        archive.insert_blob("relation_structure", &NpyBlob(vec![1, 2, 3]));
        archive.write(&path)?;

        let reopened = NpzArchive::open(&path)?;
        assert_eq!(reopened, archive);
        assert_eq!(
            reopened.names().collect::<Vec<_>>(),
            vec!["relation_structure", "target"]
        );
        Ok(())
    }
}
