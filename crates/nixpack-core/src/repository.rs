//! Best-known-good and in-flight candidate tracking.

use crate::domain::Solution;

/// Holds the rollback baseline (`best`) and the latest evaluated candidate.
#[derive(Debug, Clone)]
pub struct CandidateRepository {
    best: Solution,
    candidate: Solution,
}

impl CandidateRepository {
    /// Seed both slots with the initial solution.
    pub fn new(initial: Solution) -> Self {
        Self {
            best: initial.clone(),
            candidate: initial,
        }
    }

    pub fn propose(&mut self, solution: Solution) {
        self.candidate = solution;
    }

    /// Promote the candidate to best.
    pub fn accept(&mut self) -> &Solution {
        self.best = self.candidate.clone();
        &self.best
    }

    /// Discard the candidate.
    pub fn rollback(&mut self) {
        self.candidate = self.best.clone();
    }

    pub fn best(&self) -> &Solution {
        &self.best
    }

    pub fn current(&self) -> &Solution {
        &self.candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildError, BuildResult, ErrorKind, FailureStage};

    fn failing(text: &str, message: &str) -> Solution {
        Solution::new(
            text,
            BuildResult::failure(BuildError {
                kind: ErrorKind::BuildError,
                message: message.to_string(),
                stage: FailureStage::Build,
            }),
        )
    }

    #[test]
    fn test_new_seeds_both_slots() {
        let repo = CandidateRepository::new(failing("v1", "e1"));
        assert_eq!(repo.best().candidate_text(), "v1");
        assert_eq!(repo.current().candidate_text(), "v1");
    }

    #[test]
    fn test_accept_promotes_candidate() {
        let mut repo = CandidateRepository::new(failing("v1", "e1"));
        repo.propose(failing("v2", "e2"));
        assert_eq!(repo.best().candidate_text(), "v1");
        let best = repo.accept();
        assert_eq!(best.candidate_text(), "v2");
        assert_eq!(repo.best().error().unwrap().message, "e2");
    }

    #[test]
    fn test_rollback_restores_best() {
        let mut repo = CandidateRepository::new(failing("v1", "e1"));
        repo.propose(failing("v2", "e2"));
        repo.rollback();
        assert_eq!(repo.current(), repo.best());
        assert_eq!(repo.current().candidate_text(), "v1");
    }
}
