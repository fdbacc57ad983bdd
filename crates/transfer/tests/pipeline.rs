//! End-to-end pipeline properties: partition, parallel read, ordered write, verify.

use std::path::{Path, PathBuf};

use partcopy_transfer::{
    DigestAlgorithm, FailureKind, Task, TaskConfig, TaskState, TransferError,
    calculate_file_signature, checksum_bytes, derive_output_path, partition, verify_files,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn write_source(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn config(dir: &Path, split_factor: u32, digest: DigestAlgorithm) -> TaskConfig {
    TaskConfig {
        split_factor,
        output_dir: Some(dir.join("out")),
        digest,
    }
}

#[tokio::test]
async fn roundtrip_across_sizes_and_split_factors() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let sizes = [0usize, 1, 2, 4, 5, 23, 4096, 65_537, 3 * 1024 * 1024 + 7];
    let factors = [1u32, 2, 5, 8, 64];

    for (i, &size) in sizes.iter().enumerate() {
        let data = random_bytes(&mut rng, size);
        let src = write_source(dir.path(), &format!("input_{i}.bin"), &data);

        for &factor in &factors {
            let mut task = Task::new(&src, config(dir.path(), factor, DigestAlgorithm::Sha256))
                .unwrap();
            let report = task.run().await.unwrap();

            let expected_parts = partition(size as u64, factor).unwrap().len();
            assert_eq!(report.parts, expected_parts, "size {size}, factor {factor}");
            assert!(report.parts <= factor as usize);
            assert_eq!(report.size, size as u64);
            assert_eq!(
                std::fs::read(&report.output).unwrap(),
                data,
                "size {size}, factor {factor}"
            );
        }
    }
}

#[tokio::test]
async fn twenty_three_bytes_in_five_parts() {
    let dir = TempDir::new().unwrap();
    let data = b"twenty-three bytes long";
    assert_eq!(data.len(), 23);
    let src = write_source(dir.path(), "scenario.txt", data);

    let lens: Vec<u64> = partition(23, 5).unwrap().iter().map(|s| s.len).collect();
    assert_eq!(lens, vec![5, 5, 5, 5, 3]);

    let mut task = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Md5)).unwrap();
    let report = task.run().await.unwrap();
    assert_eq!(report.parts, 5);
    assert_eq!(std::fs::read(&report.output).unwrap(), data);
    assert_eq!(
        report.signature,
        calculate_file_signature(&src, DigestAlgorithm::Md5).unwrap()
    );
}

#[tokio::test]
async fn empty_file_produces_empty_verified_output() {
    let dir = TempDir::new().unwrap();
    let src = write_source(dir.path(), "empty.txt", b"");

    let mut task = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Sha256)).unwrap();
    let report = task.run().await.unwrap();

    assert_eq!(report.parts, 0);
    assert_eq!(report.size, 0);
    assert!(std::fs::read(&report.output).unwrap().is_empty());
    assert_eq!(report.signature, checksum_bytes(DigestAlgorithm::Sha256, b""));
    assert_eq!(task.state(), TaskState::Completed);
}

#[tokio::test]
async fn fewer_bytes_than_split_factor() {
    let dir = TempDir::new().unwrap();
    let src = write_source(dir.path(), "tiny.bin", b"abc");

    let mut task = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Sha256)).unwrap();
    let report = task.run().await.unwrap();
    assert_eq!(report.parts, 3);
    assert_eq!(std::fs::read(&report.output).unwrap(), b"abc");
}

#[tokio::test]
async fn rerun_produces_identical_output() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let data = random_bytes(&mut rng, 200_003);
    let src = write_source(dir.path(), "again.dat", &data);

    let mut first = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Sha256)).unwrap();
    let first_report = first.run().await.unwrap();
    let first_bytes = std::fs::read(&first_report.output).unwrap();

    // The second run writes over the first output in place.
    let mut second = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Sha256)).unwrap();
    let second_report = second.run().await.unwrap();
    let second_bytes = std::fs::read(&second_report.output).unwrap();

    assert_eq!(first_report.output, second_report.output);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(second_bytes, data);
    assert_eq!(first_report.signature, second_report.signature);
}

#[tokio::test]
async fn any_flipped_bit_is_a_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let data = random_bytes(&mut rng, 4096);
    let src = write_source(dir.path(), "flip.bin", &data);

    let mut task = Task::new(&src, config(dir.path(), 5, DigestAlgorithm::Md5)).unwrap();
    let report = task.run().await.unwrap();

    for _ in 0..32 {
        let mut corrupted = data.clone();
        let byte = rng.gen_range(0..corrupted.len());
        let bit = rng.gen_range(0..8);
        corrupted[byte] ^= 1 << bit;
        std::fs::write(&report.output, &corrupted).unwrap();

        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha256] {
            let err = verify_files(&src, &report.output, algorithm).unwrap_err();
            assert_eq!(err.kind(), FailureKind::IntegrityMismatch);
            match err {
                TransferError::IntegrityMismatch { expected, actual } => assert_ne!(expected, actual),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    std::fs::write(&report.output, &data).unwrap();
    assert!(verify_files(&src, &report.output, DigestAlgorithm::Md5).is_ok());
}

#[tokio::test]
async fn output_lands_next_to_source_by_default() {
    let dir = TempDir::new().unwrap();
    let src = write_source(dir.path(), "sample.tar.gz", b"not really gzip");

    let mut task = Task::new(&src, TaskConfig::default()).unwrap();
    assert_eq!(task.output(), dir.path().join("sample.tar_out.gz"));
    assert_eq!(
        task.output(),
        derive_output_path(&src, None).unwrap().as_path()
    );

    task.run().await.unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("sample.tar_out.gz")).unwrap(),
        b"not really gzip"
    );
}

#[tokio::test]
async fn concurrent_tasks_with_different_split_factors() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let data_a = random_bytes(&mut rng, 10_000);
    let data_b = random_bytes(&mut rng, 77_777);
    let src_a = write_source(dir.path(), "a.bin", &data_a);
    let src_b = write_source(dir.path(), "b.bin", &data_b);

    let mut task_a = Task::new(&src_a, config(dir.path(), 3, DigestAlgorithm::Sha256)).unwrap();
    let mut task_b = Task::new(&src_b, config(dir.path(), 11, DigestAlgorithm::Md5)).unwrap();

    let (ra, rb) = tokio::join!(task_a.run(), task_b.run());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.parts, 3);
    assert_eq!(rb.parts, 11);
    assert_eq!(std::fs::read(&ra.output).unwrap(), data_a);
    assert_eq!(std::fs::read(&rb.output).unwrap(), data_b);
}
