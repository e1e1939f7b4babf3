//! Canon hash chain.
//!
//! `content_digest = sha256("kind|turn|content")` and
//! `hash = sha256(prev_hash || content_digest)`, both lowercase hex. The
//! first entry chains from [`GENESIS_HASH`].

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use chronicle_domain::{CanonLedgerEntry, CanonRecord, SessionId};

pub use chronicle_domain::GENESIS_HASH;

pub fn content_digest(digest_input: &str) -> String {
    hex::encode(Sha256::digest(digest_input.as_bytes()))
}

pub fn chain_hash(prev_hash: &str, content_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(content_digest.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turn a record into the entry that follows `prev_hash` at `sequence`.
pub fn seal(
    record: CanonRecord,
    session_id: SessionId,
    sequence: u64,
    timestamp: DateTime<Utc>,
    prev_hash: &str,
) -> CanonLedgerEntry {
    let digest = content_digest(&record.digest_input());
    let hash = chain_hash(prev_hash, &digest);
    CanonLedgerEntry::from_record(
        record,
        session_id,
        sequence,
        timestamp,
        digest,
        prev_hash.to_string(),
        hash,
    )
}

/// The first entry that does not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub sequence: u64,
    pub reason: String,
}

/// Check `entries` as the continuation of a chain whose last verified entry
/// was `(after_sequence, after_hash)`. Returns the new verified head.
pub fn verify(
    entries: &[CanonLedgerEntry],
    after_sequence: u64,
    after_hash: &str,
) -> Result<(u64, String), ChainBreak> {
    let mut expected_sequence = after_sequence + 1;
    let mut prev_hash = after_hash.to_string();

    for entry in entries {
        let fail = |reason: String| ChainBreak {
            sequence: expected_sequence,
            reason,
        };

        if entry.sequence != expected_sequence {
            return Err(fail(format!("found sequence {}", entry.sequence)));
        }
        if entry.prev_hash != prev_hash {
            return Err(fail("previous hash does not match the chain".to_string()));
        }
        let digest = content_digest(&entry.digest_input());
        if entry.content_digest != digest {
            return Err(fail("content digest does not match content".to_string()));
        }
        if entry.hash != chain_hash(&prev_hash, &digest) {
            return Err(fail("entry hash does not match".to_string()));
        }

        prev_hash = entry.hash.clone();
        expected_sequence += 1;
    }

    Ok((expected_sequence - 1, prev_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::CanonKind;

    fn chain(n: u64) -> Vec<CanonLedgerEntry> {
        let session = SessionId::new();
        let mut prev = GENESIS_HASH.to_string();
        (1..=n)
            .map(|seq| {
                let record = CanonRecord::new(
                    CanonKind::Milestone,
                    seq as u32,
                    format!(r#"{{"n":{seq}}}"#),
                );
                let entry = seal(record, session, seq, Utc::now(), &prev);
                prev = entry.hash.clone();
                entry
            })
            .collect()
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            content_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(chain_hash(GENESIS_HASH, "ab").len(), 64);
    }

    #[test]
    fn an_intact_chain_verifies() {
        let entries = chain(4);
        let (head, hash) = verify(&entries, 0, GENESIS_HASH).expect("verify");
        assert_eq!(head, 4);
        assert_eq!(hash, entries[3].hash);
    }

    #[test]
    fn verification_can_resume_from_a_checkpoint() {
        let entries = chain(4);
        let (head, _) = verify(&entries[2..], 2, &entries[1].hash).expect("verify");
        assert_eq!(head, 4);
    }

    #[test]
    fn tampered_content_names_the_first_bad_entry() {
        let mut entries = chain(4);
        entries[2].content = r#"{"n":99}"#.to_string();
        let err = verify(&entries, 0, GENESIS_HASH).expect_err("tampered");
        assert_eq!(err.sequence, 3);
    }

    #[test]
    fn a_missing_entry_breaks_the_chain() {
        let mut entries = chain(4);
        entries.remove(1);
        let err = verify(&entries, 0, GENESIS_HASH).expect_err("gap");
        assert_eq!(err.sequence, 2);
    }

    #[test]
    fn an_empty_chain_is_genesis() {
        assert_eq!(
            verify(&[], 0, GENESIS_HASH).expect("verify"),
            (0, GENESIS_HASH.to_string())
        );
    }
}
