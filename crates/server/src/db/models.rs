use serde::{Deserialize, Serialize};
use sqlx::types::Json;

pub const CATEGORIES: &[&str] = &[
    "Statistical Analysis",
    "Programming",
    "Data Science",
    "Qualitative Research",
    "Artificial Intelligence",
    "Machine Learning",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LessonType {
    Video,
    Text,
    Quiz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Failed,
    Free,
}

impl PaymentStatus {
    /// Whether an enrollment in this state unlocks course content.
    pub fn grants_access(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Free)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tutor_id: String,
    pub price: i64,
    pub category: String,
    pub level: CourseLevel,
    pub thumbnail: String,
    pub is_published: bool,
    pub live_session_url: String,
    pub next_session_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub order_index: i64,
    pub is_free: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub lesson_type: LessonType,
    pub video_url: Option<String>,
    pub content: Option<String>,
    pub duration: i64,
    pub questions: Json<Vec<QuizQuestion>>,
    pub passing_score: i64,
    pub is_free: bool,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub description: String,
    pub due_date: Option<String>,
    pub total_points: i64,
    pub attachment_url: Option<String>,
    pub is_premium: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub content: Option<String>,
    pub file_url: String,
    pub status: SubmissionStatus,
    pub grade: Option<i64>,
    pub feedback: Option<String>,
    pub graded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub amount_paid: i64,
    pub confirmed_email: Option<String>,
    pub last_accessed_lesson_id: Option<String>,
    pub last_accessed_at: Option<String>,
    pub certificate_id: Option<String>,
    pub certificate_issued_at: Option<String>,
    pub completion_date: Option<String>,
    pub enrolled_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub course_id: String,
    pub is_used: bool,
    pub used_by: Option<String>,
    pub used_at: Option<String>,
    pub created_at: String,
}
