//! Job identifiers: the alphabet validation and the random-id synthesis
//! used by [`crate::remote_queue::RemoteQueue::submit`] when the caller
//! doesn't supply an id.

use rand::Rng;

use crate::error::{Error, Result};

fn is_job_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '=' | '@' | '%' | ':' | '.' | ',')
}

/// A validated job identifier: a non-empty string over
/// `[A-Za-z0-9_\-+=@%:.,]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Validate `id` against the job-id alphabet.
    pub fn validate(id: &str) -> Result<Self> {
        if id.is_empty() || !id.chars().all(is_job_id_char) {
            return Err(Error::InvalidJobId(id.to_string()));
        }
        Ok(JobId(id.to_string()))
    }

    /// Synthesize a new job id from a job directory's basename and the
    /// local user name: `<basename>_<username>_<rand10>`, where `rand10`
    /// is ten characters drawn from `[a-z0-9]`.
    pub fn synthesize(directory_basename: &str, username: &str) -> Self {
        let suffix = random_suffix();
        JobId(format!("{directory_basename}_{username}_{suffix}"))
    }

    /// The id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unique_names_have_expected_shape() {
        let names: Vec<JobId> = (0..5).map(|_| JobId::synthesize("job", "me")).collect();
        let suffixes: HashSet<&str> = names
            .iter()
            .map(|n| n.as_str().rsplit('_').next().unwrap())
            .collect();
        assert_eq!(suffixes.len(), 5);
        for n in &names {
            let suffix = n.as_str().rsplit('_').next().unwrap();
            assert_eq!(suffix.len(), 10);
            assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn validates_allowed_alphabet() {
        assert!(JobId::validate("job_1.2,3:4%5=6+7-8@9").is_ok());
        assert!(JobId::validate("").is_err());
        assert!(JobId::validate("has space").is_err());
        assert!(JobId::validate("has/slash").is_err());
    }
}
