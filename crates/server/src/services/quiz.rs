use serde::Serialize;

use crate::{
    db::models::QuizQuestion,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuizResult {
    pub correct: usize,
    pub total: usize,
    pub score: i64,
    pub passed: bool,
}

pub fn validate_questions(questions: &[QuizQuestion]) -> Result<()> {
    if questions.is_empty() {
        return Err(AppError::Validation(
            "A quiz lesson needs at least one question".to_string(),
        ));
    }
    for (i, q) in questions.iter().enumerate() {
        let n = i + 1;
        if q.question_text.trim().is_empty() {
            return Err(AppError::Validation(format!("Question {n} has no text")));
        }
        if q.options.len() < 2 {
            return Err(AppError::Validation(format!(
                "Question {n} needs at least two options"
            )));
        }
        if q.correct_answer >= q.options.len() {
            return Err(AppError::Validation(format!(
                "Question {n} has an answer outside its options"
            )));
        }
    }
    Ok(())
}

/// Scores a full set of answers, one option index per question, in order.
pub fn grade(
    questions: &[QuizQuestion],
    answers: &[usize],
    passing_score: i64,
) -> Result<QuizResult> {
    if questions.is_empty() {
        return Err(AppError::Validation("This lesson has no questions".to_string()));
    }
    if answers.len() != questions.len() {
        return Err(AppError::Validation(format!(
            "Expected {} answers, got {}",
            questions.len(),
            answers.len()
        )));
    }

    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| q.correct_answer == **a)
        .count();
    let total = questions.len();
    let score = ((correct * 100 + total / 2) / total) as i64;

    Ok(QuizResult {
        correct,
        total,
        score,
        passed: score >= passing_score,
    })
}
