pub const STUDENTS: &str = "students";
pub const TUTORS: &str = "tutors";

// Per-user attendance history logs, one entry per session instance
pub const STUDENT_HISTORY: &str = "student_history";
pub const TUTOR_HISTORY: &str = "tutor_history";
