use std::path::{Path, PathBuf};

use crate::TransferError;

/// Suffix inserted before the extension of a reassembled file.
const OUTPUT_SUFFIX: &str = "_out";

/// Derives the reassembled file's path from `source`.
///
/// The base name is split at its last `.` only, so `sample.tar.gz` becomes
/// `sample.tar_out.gz`. Names without a dot just gain the suffix. The result
/// sits in `output_dir` when given, otherwise next to the source.
pub fn derive_output_path(
    source: &Path,
    output_dir: Option<&Path>,
) -> Result<PathBuf, TransferError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| {
            TransferError::Configuration(format!(
                "source has no file name: {}",
                source.display()
            ))
        })?
        .to_string_lossy();

    let out_name = match file_name.rfind('.') {
        Some(pos) => {
            let (name, ext) = file_name.split_at(pos);
            format!("{name}{OUTPUT_SUFFIX}{ext}")
        }
        None => format!("{file_name}{OUTPUT_SUFFIX}"),
    };

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(out_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(source: &str) -> String {
        derive_output_path(Path::new(source), None)
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn simple_extension() {
        assert_eq!(name_of("sample.txt"), "sample_out.txt");
    }

    #[test]
    fn splits_at_last_dot_only() {
        assert_eq!(name_of("sample.tar.gz"), "sample.tar_out.gz");
    }

    #[test]
    fn no_extension() {
        assert_eq!(name_of("README"), "README_out");
    }

    #[test]
    fn leading_dot_name() {
        assert_eq!(name_of(".profile"), "_out.profile");
    }

    #[test]
    fn stays_next_to_source() {
        let out = derive_output_path(Path::new("/data/in/sample.pdf"), None).unwrap();
        assert_eq!(out, PathBuf::from("/data/in/sample_out.pdf"));
    }

    #[test]
    fn bare_file_name_has_relative_output() {
        let out = derive_output_path(Path::new("sample.jpg"), None).unwrap();
        assert_eq!(out, PathBuf::from("sample_out.jpg"));
    }

    #[test]
    fn output_dir_overrides_location() {
        let out =
            derive_output_path(Path::new("/data/in/sample.jpg"), Some(Path::new("out"))).unwrap();
        assert_eq!(out, PathBuf::from("out/sample_out.jpg"));
    }

    #[test]
    fn rejects_path_without_file_name() {
        assert!(matches!(
            derive_output_path(Path::new("/"), None),
            Err(TransferError::Configuration(_))
        ));
        assert!(derive_output_path(Path::new("a/.."), None).is_err());
    }
}
