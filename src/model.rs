use serde::{Deserialize, Serialize};

/// A portal account. The 4-character code doubles as the login credential
/// and the primary key; accounts are created and deleted, never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub code: String,
    pub role: String,
    pub name: String,
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
}

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_STUDENT: &str = "student";
pub const ROLES: [&str; 3] = [ROLE_ADMIN, ROLE_TEACHER, ROLE_STUDENT];

// Student sub-classification: روضة (kindergarten), دعم (support), عادي (normal).
pub const GROUP_KINDERGARTEN: &str = "روضة";
pub const GROUP_TYPES: [&str; 3] = [GROUP_KINDERGARTEN, "دعم", "عادي"];

// Attendance session kinds: رسمي (official), دعم (support).
pub const ATTENDANCE_KINDS: [&str; 2] = ["رسمي", "دعم"];

pub const STATUS_PRESENT: &str = "حاضر";
pub const STATUS_ABSENT: &str = "غائب";
pub const ATTENDANCE_STATUSES: [&str; 2] = [STATUS_PRESENT, STATUS_ABSENT];

/// Class name that switches the grading UI to qualitative assessments.
pub const KINDERGARTEN_CLASS: &str = "الروضة";

// قرآن, أذكار, أحاديث, رسم
pub const KINDERGARTEN_SUBJECTS: [&str; 4] = ["قرآن", "أذكار", "أحاديث", "رسم"];

// ممتاز .. ضعيف, best first.
pub const ASSESSMENT_LEVELS: [&str; 5] = ["ممتاز", "جيد جداً", "جيد", "مقبول", "ضعيف"];

pub const GRADE_MAX: f64 = 20.0;

impl User {
    pub fn is_kindergarten(&self) -> bool {
        self.group_type.as_deref() == Some(GROUP_KINDERGARTEN)
    }
}

pub fn is_kindergarten_group(group_type: Option<&str>) -> bool {
    group_type == Some(GROUP_KINDERGARTEN)
}

/// A grade value is either a qualitative level (kindergarten students) or
/// a numeric string in 0..=20. Stored verbatim either way.
pub fn grade_value_ok(group_type: Option<&str>, value: &str) -> bool {
    if is_kindergarten_group(group_type) {
        return ASSESSMENT_LEVELS.contains(&value);
    }
    match value.trim().parse::<f64>() {
        Ok(n) => (0.0..=GRADE_MAX).contains(&n),
        Err(_) => false,
    }
}
