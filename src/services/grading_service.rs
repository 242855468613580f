use crate::models::answer::{AnswerMap, AnswerValue};
use crate::models::question::{Question, QuestionKind};
use crate::models::score::Score;

pub struct GradingService;

impl GradingService {
    /// Totals every question's points and credits the automatically gradable ones.
    /// Long answers and unanswered questions earn nothing.
    pub fn score(questions: &[Question], answers: &AnswerMap) -> Score {
        let mut total_points: u32 = 0;
        let mut earned_points: u32 = 0;

        for q in questions {
            total_points = total_points.saturating_add(q.points);

            let given = answers.get(&q.id).and_then(|a| a.value.as_ref());
            if let Some(value) = given {
                if Self::is_correct(&q.kind, value) {
                    earned_points = earned_points.saturating_add(q.points);
                }
            }
        }

        Score {
            earned_points: earned_points.min(total_points),
            total_points,
        }
    }

    fn is_correct(kind: &QuestionKind, value: &AnswerValue) -> bool {
        match kind {
            QuestionKind::Mcq { correct_index, .. } => value.as_choice() == Some(*correct_index),
            QuestionKind::OneWord { correct_text } => value
                .as_text()
                .map(|text| normalize(text) == normalize(correct_text))
                .unwrap_or(false),
            QuestionKind::LongAnswer => false,
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
