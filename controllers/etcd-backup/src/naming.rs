//! Names of backups and backup jobs.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;

/// Longest name accepted for Kubernetes objects.
pub const MAX_NAME_LENGTH: usize = 63;

const RANDOM_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const RANDOM_LENGTH: usize = 10;

/// Produces the random suffix of job names.
pub type RandStringGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Suffixes made of consonants and digits, so they never spell words.
pub fn random_suffix_generator() -> RandStringGenerator {
    Arc::new(|| {
        let mut rng = rand::thread_rng();
        (0..RANDOM_LENGTH)
            .map(|_| char::from(RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())]))
            .collect()
    })
}

/// Cuts `name` down to `MAX_NAME_LENGTH` by dropping the end and appending
/// fresh randomness, so shortened names stay unique.
pub fn limit_name_length(name: &str, rand: &RandStringGenerator) -> String {
    if name.len() <= MAX_NAME_LENGTH {
        return name.to_string();
    }
    let randomness = rand();
    let keep = MAX_NAME_LENGTH.saturating_sub(randomness.len());
    let prefix: String = name.chars().take(keep).collect();
    format!("{prefix}{randomness}")
}

pub fn one_shot_backup_name(config: &str) -> String {
    format!("{config}.db")
}

pub fn scheduled_backup_name(config: &str, scheduled: DateTime<Utc>) -> String {
    format!("{config}-{}.db", scheduled.format("%Y-%m-%dt%H-%M-%S"))
}

pub fn backup_job_name(cluster: &str, config: &str, rand: &RandStringGenerator) -> String {
    limit_name_length(&format!("{cluster}-backup-{config}-create-{}", rand()), rand)
}

pub fn delete_job_name(cluster: &str, config: &str, rand: &RandStringGenerator) -> String {
    limit_name_length(&format!("{cluster}-backup-{config}-delete-{}", rand()), rand)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(suffix: &'static str) -> RandStringGenerator {
        Arc::new(move || suffix.to_string())
    }

    #[test]
    fn test_short_names_are_kept() {
        let rand = constant("xxxx");
        assert_eq!(
            backup_job_name("testcluster", "testbackup", &rand),
            "testcluster-backup-testbackup-create-xxxx"
        );
        assert_eq!(
            delete_job_name("testcluster", "testbackup", &rand),
            "testcluster-backup-testbackup-delete-xxxx"
        );
    }

    #[test]
    fn test_long_names_keep_the_random_suffix() {
        let rand = constant("xxxx");
        let config = "long-backup-config-name-abcdefghijk";
        assert_eq!(config.len(), 35);

        let name = backup_job_name("testcluster", config, &rand);

        assert_eq!(name.len(), MAX_NAME_LENGTH);
        assert_eq!(
            name,
            "testcluster-backup-long-backup-config-name-abcdefghijk-creaxxxx"
        );
    }

    #[test]
    fn test_backup_names() {
        let scheduled = DateTime::from_timestamp(1200, 0).unwrap();
        assert_eq!(one_shot_backup_name("testbackup"), "testbackup.db");
        assert_eq!(
            scheduled_backup_name("testbackup", scheduled),
            "testbackup-1970-01-01t00-20-00.db"
        );
    }

    #[test]
    fn test_random_suffix_alphabet() {
        let suffix = random_suffix_generator()();
        assert_eq!(suffix.len(), RANDOM_LENGTH);
        assert!(suffix.bytes().all(|b| RANDOM_ALPHABET.contains(&b)));
    }
}
