use chrono::Utc;
use std::{collections::HashMap, sync::Arc};

use crate::{
    config::DEFAULT_PASSING_SCORE,
    error::{require_positive, AppError},
    gateway::{CatalogClient, QuizDetail},
    models::*,
    store::Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub correct: i32,
    pub total_questions: i32,
    pub score: i32,
    pub passing_score: i32,
    pub passed: bool,
}

/// Grades `answers` (questionId -> answerId) against the catalog's answer key.
///
/// A question counts only when the submitted answer belongs to that question
/// and the key flags it correct. Unanswered questions and foreign answer ids
/// score nothing.
pub fn grade(quiz: &QuizDetail, answers: &HashMap<i64, i64>) -> Grade {
    let total_questions = quiz.questions.len() as i32;
    let correct = quiz
        .questions
        .iter()
        .filter(|q| {
            answers.get(&q.id).is_some_and(|submitted| {
                q.answers.iter().any(|a| a.id == *submitted && a.correct)
            })
        })
        .count() as i32;

    let score = if total_questions == 0 {
        0
    } else {
        (f64::from(correct) * 100.0 / f64::from(total_questions)).round() as i32
    };
    let passing_score = quiz.passing_score.unwrap_or(DEFAULT_PASSING_SCORE);

    Grade {
        correct,
        total_questions,
        score,
        passing_score,
        passed: score >= passing_score,
    }
}

pub struct QuizGrader {
    store: Arc<dyn Store>,
    catalog: Arc<dyn CatalogClient>,
}

impl QuizGrader {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { store, catalog }
    }

    /// Grades a submission and appends the attempt. Attempts are unlimited
    /// and never affect enrollment progress.
    pub async fn submit_quiz(&self, submission: QuizSubmission) -> Result<QuizResult, AppError> {
        require_positive("enrollmentId", submission.enrollment_id)?;
        require_positive("quizId", submission.quiz_id)?;

        let enrollment = self
            .store
            .enrollment(submission.enrollment_id)
            .await?
            .ok_or_else(|| AppError::enrollment_not_found(submission.enrollment_id))?;

        let quiz = self
            .catalog
            .quiz_by_id(submission.quiz_id)
            .await
            .map_err(AppError::hard_dependency)?;

        let g = grade(&quiz, &submission.answers);
        let attempt = self
            .store
            .insert_quiz_attempt(NewQuizAttempt {
                enrollment_id: enrollment.id,
                quiz_id: submission.quiz_id,
                score: g.score,
                total_questions: g.total_questions,
                passed: g.passed,
                attempted_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            enrollment_id = enrollment.id,
            quiz_id = submission.quiz_id,
            score = g.score,
            passing_score = g.passing_score,
            passed = g.passed,
            "quiz graded"
        );
        Ok(attempt.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{AnswerDetail, QuestionDetail};

    // question n has answers 10n (correct) and 10n+1 (wrong)
    fn quiz(questions: i64, passing_score: Option<i32>) -> QuizDetail {
        QuizDetail {
            id: 1,
            passing_score,
            questions: (1..=questions)
                .map(|n| QuestionDetail {
                    id: n,
                    answers: vec![
                        AnswerDetail { id: 10 * n, correct: true },
                        AnswerDetail { id: 10 * n + 1, correct: false },
                    ],
                })
                .collect(),
        }
    }

    #[test]
    fn two_of_four_scores_fifty() {
        let answers = HashMap::from([(1, 10), (2, 20), (3, 31), (4, 41)]);
        let g = grade(&quiz(4, None), &answers);
        assert_eq!(g.correct, 2);
        assert_eq!(g.score, 50);
        assert_eq!(g.passing_score, 60);
        assert!(!g.passed);

        let lenient = grade(&quiz(4, Some(50)), &answers);
        assert!(lenient.passed);
    }

    #[test]
    fn answers_from_other_questions_do_not_count() {
        // 20 is correct, but for question 2
        let answers = HashMap::from([(1, 20), (2, 20)]);
        let g = grade(&quiz(2, None), &answers);
        assert_eq!(g.correct, 1);
        assert_eq!(g.score, 50);
    }

    #[test]
    fn missing_and_unknown_answers_are_wrong() {
        let answers = HashMap::from([(1, 999), (77, 10)]);
        let g = grade(&quiz(3, None), &answers);
        assert_eq!(g.correct, 0);
        assert_eq!(g.score, 0);
        assert_eq!(g.total_questions, 3);
    }

    #[test]
    fn score_is_rounded() {
        let answers = HashMap::from([(1, 10), (2, 20)]);
        assert_eq!(grade(&quiz(3, None), &answers).score, 67);
        let answers = HashMap::from([(1, 10)]);
        assert_eq!(grade(&quiz(3, None), &answers).score, 33);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let g = grade(&quiz(0, Some(0)), &HashMap::new());
        assert_eq!(g.score, 0);
        assert_eq!(g.total_questions, 0);
        assert!(g.passed);
    }
}
