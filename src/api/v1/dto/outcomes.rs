/*
 * Responsibility
 * - Outcome callback request/response DTO
 * - Shape validation only; authorization happens before deserialization is
 *   even attempted
 */
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Normalized score in [0.0, 1.0].
    pub score: f64,
    pub comment: Option<String>,
}

impl OutcomeRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.user_id.trim().is_empty() {
            return Err("userId is required");
        }
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err("score must be within [0.0, 1.0]");
        }
        if let Some(comment) = &self.comment
            && comment.len() > 1024
        {
            return Err("comment must be <= 1024 chars");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(score: f64) -> OutcomeRequest {
        OutcomeRequest {
            user_id: "user-1".to_string(),
            score,
            comment: None,
        }
    }

    #[test]
    fn boundary_scores_are_valid() {
        assert!(request(0.0).validate().is_ok());
        assert!(request(1.0).validate().is_ok());
    }

    #[test]
    fn out_of_range_and_non_finite_scores_fail() {
        assert!(request(-0.01).validate().is_err());
        assert!(request(1.01).validate().is_err());
        assert!(request(f64::NAN).validate().is_err());
        assert!(request(f64::INFINITY).validate().is_err());
    }

    #[test]
    fn blank_user_id_fails() {
        let mut req = request(0.5);
        req.user_id = "  ".to_string();
        assert!(req.validate().is_err());
    }
}
