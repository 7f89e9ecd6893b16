mod engine;
mod ordering;
mod queries;
mod view;

// Public API of the session subsystem.
pub use engine::QuizEngine;
pub use ordering::{GroupPlan, GroupPlanner};
pub use queries::SessionQueries;
pub use view::{
    AnswerOutcome, AnswerSubmission, NextQuestion, SessionListItem, StartRequest, StartedSession,
};
