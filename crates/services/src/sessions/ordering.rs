use std::sync::Arc;

use tracing::debug;

use quiz_core::model::{GroupId, QuestionId};
use storage::repository::{QuestionRepository, StorageError};

/// A group together with its freshly shuffled question order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub group: GroupId,
    pub order: Vec<QuestionId>,
}

/// Picks groups and builds their shuffled orderings.
#[derive(Clone)]
pub struct GroupPlanner {
    questions: Arc<dyn QuestionRepository>,
}

impl GroupPlanner {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Choose a group other than `excluding` and shuffle its questions.
    ///
    /// When `excluding` is the only group in the bank, that group is reshuffled.
    /// Returns `None` when there is no group or the chosen group is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question bank cannot be read.
    pub async fn fresh_group(
        &self,
        excluding: Option<GroupId>,
    ) -> Result<Option<GroupPlan>, StorageError> {
        let mut group = self.questions.next_group_id(excluding).await?;
        if group.is_none() && excluding.is_some() {
            debug!(?excluding, "no other group available, reshuffling current group");
            group = self.questions.next_group_id(None).await?;
        }
        let Some(group) = group else {
            return Ok(None);
        };

        let order = self.questions.random_group_question_ids(group).await?;
        if order.is_empty() {
            return Ok(None);
        }
        Ok(Some(GroupPlan { group, order }))
    }
}
