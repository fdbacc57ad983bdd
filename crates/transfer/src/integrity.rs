use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;

/// Size of each read while streaming a file through a digest.
const DIGEST_BUFFER_SIZE: usize = 8192;

/// Content digest used to compare a source with its reassembled copy.
///
/// `Md5` only guards against accidental corruption; it offers no tamper
/// resistance. `Sha256` is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(TransferError::Configuration(format!(
                "unknown digest algorithm: {other}"
            ))),
        }
    }
}

/// Hex-encoded digest of a file's full content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegritySignature {
    pub algorithm: DigestAlgorithm,
    pub digest: String,
}

impl std::fmt::Display for IntegritySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Computes the signature of an in-memory buffer.
pub fn checksum_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> IntegritySignature {
    let digest = match algorithm {
        DigestAlgorithm::Md5 => hex::encode(Md5::digest(data)),
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
    };
    IntegritySignature { algorithm, digest }
}

/// Streams a file through `algorithm` without buffering it whole.
pub fn calculate_file_signature(
    path: &Path,
    algorithm: DigestAlgorithm,
) -> Result<IntegritySignature, TransferError> {
    let digest_err = |source| TransferError::Digest {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(digest_err)?;
    let digest = match algorithm {
        DigestAlgorithm::Md5 => stream_digest::<Md5>(file),
        DigestAlgorithm::Sha256 => stream_digest::<Sha256>(file),
    }
    .map_err(digest_err)?;
    Ok(IntegritySignature { algorithm, digest })
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; DIGEST_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compares the digests of `input` and `output`.
///
/// Returns the shared signature on success, or
/// [`TransferError::IntegrityMismatch`] carrying both digests.
pub fn verify_files(
    input: &Path,
    output: &Path,
    algorithm: DigestAlgorithm,
) -> Result<IntegritySignature, TransferError> {
    let expected = calculate_file_signature(input, algorithm)?;
    let actual = calculate_file_signature(output, algorithm)?;

    debug!(
        input = %input.display(),
        output = %output.display(),
        %algorithm,
        expected = %expected.digest,
        actual = %actual.digest,
        "integrity digests computed"
    );

    if expected.digest != actual.digest {
        return Err(TransferError::IntegrityMismatch {
            expected: expected.digest,
            actual: actual.digest,
        });
    }
    Ok(expected)
}
