mod answer;
mod difficulty;
mod ids;
mod question;
mod session;
mod settings;
mod test;

pub use ids::{CaseId, GroupId, ParameterId, ParseIdError, QuestionId, SessionId, TestId, UserId};

pub use answer::{AnswerRecord, InvalidScreenSize, ScreenSize, answers_match, is_blank};
pub use difficulty::{Difficulty, DifficultyError, DifficultySummary, DifficultyVote};
pub use question::{
    Case, CaseOutcome, HeldOutValue, NewCase, NewParameter, NewQuestion, Parameter, ParameterValue,
    Question,
};
pub use session::{
    Advance, NewQuizSession, PersistedSession, QuizMode, QuizSession, SessionPosition,
    SessionStateError, SessionStatus, TestBinding,
};
pub use settings::{
    COOLDOWN_HOURS_KEY, DEFAULT_COOLDOWN_HOURS, MAX_COOLDOWN_HOURS, QuizSettings,
    SECURITY_MODE_KEY, SecurityMode, SettingEntry, SettingsError, TIME_LIMIT_KEY,
};
pub use test::{Test, TestCode, TestDraft, TestDraftError, ValidatedTest};
