use sha2::{Digest, Sha256};

/// Content address of tile bytes: the lower-case hex SHA-256 digest.
pub fn checksum(data: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(data);
	format!("{:x}", hasher.finalize())
}
