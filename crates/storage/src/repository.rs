use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    Case, CaseId, CaseOutcome, Difficulty, DifficultySummary, DifficultyVote, GroupId, NewCase,
    NewParameter, NewQuestion, NewQuizSession, Parameter, ParameterId, Question, QuestionId,
    QuizSession, SessionId, SettingEntry, Test, TestId, UserId, ValidatedTest,
};
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// Persistence of quiz sessions. The store is the single source of truth.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a planned session and return it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn create_session(&self, session: &NewQuizSession) -> Result<QuizSession, StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<QuizSession>, StorageError>;

    /// Overwrite the mutable state of an existing session in a single write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn update_session(&self, session: &QuizSession) -> Result<(), StorageError>;

    /// Most recently created session of a user, finished or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn last_session_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<QuizSession>, StorageError>;

    /// Unfinished sessions of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizSession>, StorageError>;

    /// Every session bound to a test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn sessions_for_test(&self, test_id: TestId) -> Result<Vec<QuizSession>, StorageError>;

    /// Unfinished sessions last seen at or after `since`, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn live_sessions(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QuizSession>, StorageError>;
}

/// Read access to questions and groups, plus authoring used by seeding.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Question IDs of a group in a fresh random order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn random_group_question_ids(
        &self,
        group: GroupId,
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// Pick a random non-empty group other than `excluding`.
    ///
    /// Returns `None` when no such group exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn next_group_id(
        &self,
        excluding: Option<GroupId>,
    ) -> Result<Option<GroupId>, StorageError>;

    /// Fetch a question with its case, parameters and values.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// The correct option text of a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn correct_option(&self, id: QuestionId) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_questions(&self) -> Result<u64, StorageError>;

    /// Held-out values of a case.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn case_outcome(&self, case_id: CaseId) -> Result<Option<CaseOutcome>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the parameter cannot be stored.
    async fn insert_parameter(&self, parameter: &NewParameter) -> Result<ParameterId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the case code is taken, or
    /// `StorageError::NotFound` if a referenced parameter is missing.
    async fn insert_case(&self, case: &NewCase) -> Result<CaseId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the case is missing, or
    /// `StorageError::Serialization` for group 0.
    async fn insert_question(&self, question: &NewQuestion) -> Result<QuestionId, StorageError>;
}

/// Instructor-defined tests.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Persist a test and its ordered questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the code is already taken, or
    /// `StorageError::NotFound` if a listed question does not exist.
    async fn create_test(&self, test: &ValidatedTest) -> Result<Test, StorageError>;

    /// Resolve a normalised code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn test_by_code(&self, code: &str) -> Result<Option<Test>, StorageError>;

    /// Question IDs of a test in sort order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn ordered_question_ids(&self, test_id: TestId) -> Result<Vec<QuestionId>, StorageError>;

    /// Tests created by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn tests_by_owner(&self, owner: UserId) -> Result<Vec<Test>, StorageError>;
}

/// Key/value runtime settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn setting_entries(&self) -> Result<Vec<SettingEntry>, StorageError>;

    /// Insert or replace one setting.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn save_setting(&self, entry: &SettingEntry) -> Result<(), StorageError>;
}

/// Per-user access facts used by the start-quiz policy.
#[async_trait]
pub trait AccessRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn is_user_approved(&self, user_id: UserId) -> Result<bool, StorageError>;

    /// Upsert the approval flag of a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn set_approval(
        &self,
        user_id: UserId,
        approved: bool,
        changed_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn approved_user_ids(&self) -> Result<Vec<UserId>, StorageError>;

    /// Record `now` as the user's first-seen time unless one exists, then return
    /// the stored value.
    ///
    /// Concurrent callers for the same user all observe the same timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn registered_at_or_insert(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StorageError>;
}

/// Per-question difficulty votes, one per user.
#[async_trait]
pub trait DifficultyRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already voted on the question,
    /// or `StorageError::NotFound` if the question does not exist.
    async fn insert_vote(&self, vote: &DifficultyVote) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn vote_of(
        &self,
        question_id: QuestionId,
        user_id: UserId,
    ) -> Result<Option<DifficultyVote>, StorageError>;

    /// Tallies for those of `question_ids` that have votes, ordered by question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn vote_summaries(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<Vec<DifficultySummary>, StorageError>;
}

//
// ─── IN-MEMORY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
struct StoredQuestion {
    content: NewQuestion,
}

#[derive(Debug, Clone)]
struct StoredTest {
    test: Test,
    question_ids: Vec<QuestionId>,
}

#[derive(Debug, Clone, Copy)]
struct AccessRow {
    approved: bool,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<BTreeMap<SessionId, QuizSession>>>,
    parameters: Arc<Mutex<BTreeMap<ParameterId, Parameter>>>,
    cases: Arc<Mutex<BTreeMap<CaseId, NewCase>>>,
    questions: Arc<Mutex<BTreeMap<QuestionId, StoredQuestion>>>,
    tests: Arc<Mutex<BTreeMap<TestId, StoredTest>>>,
    settings: Arc<Mutex<BTreeMap<String, String>>>,
    access: Arc<Mutex<HashMap<UserId, AccessRow>>>,
    registry: Arc<Mutex<HashMap<UserId, DateTime<Utc>>>>,
    votes: Arc<Mutex<BTreeMap<(QuestionId, UserId), DifficultyVote>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// Questions must sit in a real group; group 0 is the "no group" sentinel.
pub(crate) fn ensure_assigned_group(group: GroupId) -> Result<(), StorageError> {
    if group.value() == 0 {
        return Err(StorageError::Serialization(
            "question group_id must be positive".into(),
        ));
    }
    Ok(())
}

fn next_key<K: Copy, V>(map: &BTreeMap<K, V>, value: impl Fn(K) -> u64) -> u64 {
    map.keys().next_back().map_or(1, |k| value(*k) + 1)
}

fn newest_first(sessions: &mut [QuizSession]) {
    sessions.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a question under a caller-chosen ID, replacing any existing one.
    ///
    /// Fixtures use this to lay out groups with known question IDs.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the referenced case is missing.
    pub fn put_question(&self, id: QuestionId, question: NewQuestion) -> Result<(), StorageError> {
        ensure_assigned_group(question.group)?;
        if !lock(&self.cases)?.contains_key(&question.case_id) {
            return Err(StorageError::NotFound);
        }
        lock(&self.questions)?.insert(id, StoredQuestion { content: question });
        Ok(())
    }

    fn assemble_case(&self, case_id: CaseId) -> Result<Option<Case>, StorageError> {
        let Some(stored) = lock(&self.cases)?.get(&case_id).cloned() else {
            return Ok(None);
        };
        let parameters = lock(&self.parameters)?;
        let mut used: Vec<Parameter> = stored
            .parameter_values
            .iter()
            .filter_map(|v| parameters.get(&v.parameter_id).cloned())
            .collect();
        used.sort_by_key(|p| (p.order, p.id));

        Ok(Some(Case {
            id: case_id,
            code: stored.code,
            gender: stored.gender,
            age1: stored.age1,
            age2: stored.age2,
            age3: stored.age3,
            parameters: used,
            parameter_values: stored.parameter_values,
        }))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &NewQuizSession) -> Result<QuizSession, StorageError> {
        let mut guard = lock(&self.sessions)?;
        let id = SessionId::new(next_key(&guard, |k| k.value()));
        let created = session.clone().assign_id(id);
        guard.insert(id, created.clone());
        Ok(created)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<QuizSession>, StorageError> {
        Ok(lock(&self.sessions)?.get(&id).cloned())
    }

    async fn update_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        let slot = guard.get_mut(&session.id()).ok_or(StorageError::NotFound)?;
        *slot = session.clone();
        Ok(())
    }

    async fn last_session_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<QuizSession>, StorageError> {
        let mut owned: Vec<QuizSession> = lock(&self.sessions)?
            .values()
            .filter(|s| s.is_owned_by(user_id))
            .cloned()
            .collect();
        newest_first(&mut owned);
        Ok(owned.into_iter().next())
    }

    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizSession>, StorageError> {
        let mut active: Vec<QuizSession> = lock(&self.sessions)?
            .values()
            .filter(|s| s.is_owned_by(user_id) && !s.is_finished())
            .cloned()
            .collect();
        newest_first(&mut active);
        Ok(active)
    }

    async fn sessions_for_test(&self, test_id: TestId) -> Result<Vec<QuizSession>, StorageError> {
        let mut bound: Vec<QuizSession> = lock(&self.sessions)?
            .values()
            .filter(|s| s.test().is_some_and(|t| t.test_id == test_id))
            .cloned()
            .collect();
        newest_first(&mut bound);
        Ok(bound)
    }

    async fn live_sessions(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QuizSession>, StorageError> {
        let mut live: Vec<QuizSession> = lock(&self.sessions)?
            .values()
            .filter(|s| !s.is_finished() && s.last_seen() >= since)
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.last_seen()
                .cmp(&a.last_seen())
                .then_with(|| b.id().cmp(&a.id()))
        });
        live.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(live)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn random_group_question_ids(
        &self,
        group: GroupId,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let mut ids: Vec<QuestionId> = lock(&self.questions)?
            .iter()
            .filter(|(_, q)| q.content.group == group)
            .map(|(id, _)| *id)
            .collect();
        ids.shuffle(&mut rand::rng());
        Ok(ids)
    }

    async fn next_group_id(
        &self,
        excluding: Option<GroupId>,
    ) -> Result<Option<GroupId>, StorageError> {
        let mut groups: Vec<GroupId> = lock(&self.questions)?
            .values()
            .map(|q| q.content.group)
            .filter(|g| Some(*g) != excluding)
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups.choose(&mut rand::rng()).copied())
    }

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let Some(stored) = lock(&self.questions)?.get(&id).cloned() else {
            return Ok(None);
        };
        let case = self
            .assemble_case(stored.content.case_id)?
            .ok_or(StorageError::NotFound)?;

        Ok(Some(Question {
            id,
            question: stored.content.question,
            options: stored.content.options,
            prediction_age: stored.content.prediction_age,
            case,
            group: Some(stored.content.group),
        }))
    }

    async fn correct_option(&self, id: QuestionId) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.questions)?
            .get(&id)
            .map(|q| q.content.correct.clone()))
    }

    async fn count_questions(&self) -> Result<u64, StorageError> {
        let len = lock(&self.questions)?.len();
        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }

    async fn case_outcome(&self, case_id: CaseId) -> Result<Option<CaseOutcome>, StorageError> {
        Ok(self.assemble_case(case_id)?.map(|c| c.outcome()))
    }

    async fn insert_parameter(&self, parameter: &NewParameter) -> Result<ParameterId, StorageError> {
        let mut guard = lock(&self.parameters)?;
        let id = ParameterId::new(next_key(&guard, |k| k.value()));
        guard.insert(
            id,
            Parameter {
                id,
                name: parameter.name.clone(),
                description: parameter.description.clone(),
                reference_values: parameter.reference_values.clone(),
                order: parameter.order,
            },
        );
        Ok(id)
    }

    async fn insert_case(&self, case: &NewCase) -> Result<CaseId, StorageError> {
        {
            let parameters = lock(&self.parameters)?;
            if case
                .parameter_values
                .iter()
                .any(|v| !parameters.contains_key(&v.parameter_id))
            {
                return Err(StorageError::NotFound);
            }
        }
        let mut guard = lock(&self.cases)?;
        if guard.values().any(|c| c.code == case.code) {
            return Err(StorageError::Conflict);
        }
        let id = CaseId::new(next_key(&guard, |k| k.value()));
        guard.insert(id, case.clone());
        Ok(id)
    }

    async fn insert_question(&self, question: &NewQuestion) -> Result<QuestionId, StorageError> {
        ensure_assigned_group(question.group)?;
        if !lock(&self.cases)?.contains_key(&question.case_id) {
            return Err(StorageError::NotFound);
        }
        let mut guard = lock(&self.questions)?;
        let id = QuestionId::new(next_key(&guard, |k| k.value()));
        guard.insert(
            id,
            StoredQuestion {
                content: question.clone(),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn create_test(&self, test: &ValidatedTest) -> Result<Test, StorageError> {
        {
            let questions = lock(&self.questions)?;
            if test.question_ids.iter().any(|q| !questions.contains_key(q)) {
                return Err(StorageError::NotFound);
            }
        }
        let mut guard = lock(&self.tests)?;
        if guard.values().any(|t| t.test.code == test.code.as_str()) {
            return Err(StorageError::Conflict);
        }
        let id = TestId::new(next_key(&guard, |k| k.value()));
        let created = Test {
            id,
            code: test.code.as_str().to_string(),
            name: test.name.clone(),
            created_by: test.created_by,
            created_at: test.created_at,
        };
        guard.insert(
            id,
            StoredTest {
                test: created.clone(),
                question_ids: test.question_ids.clone(),
            },
        );
        Ok(created)
    }

    async fn test_by_code(&self, code: &str) -> Result<Option<Test>, StorageError> {
        Ok(lock(&self.tests)?
            .values()
            .find(|t| t.test.code == code)
            .map(|t| t.test.clone()))
    }

    async fn ordered_question_ids(&self, test_id: TestId) -> Result<Vec<QuestionId>, StorageError> {
        Ok(lock(&self.tests)?
            .get(&test_id)
            .map(|t| t.question_ids.clone())
            .unwrap_or_default())
    }

    async fn tests_by_owner(&self, owner: UserId) -> Result<Vec<Test>, StorageError> {
        let mut owned: Vec<Test> = lock(&self.tests)?
            .values()
            .filter(|t| t.test.created_by == owner)
            .map(|t| t.test.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(owned)
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn setting_entries(&self) -> Result<Vec<SettingEntry>, StorageError> {
        Ok(lock(&self.settings)?
            .iter()
            .map(|(name, value)| SettingEntry::new(name.clone(), value.clone()))
            .collect())
    }

    async fn save_setting(&self, entry: &SettingEntry) -> Result<(), StorageError> {
        lock(&self.settings)?.insert(entry.name.clone(), entry.value.clone());
        Ok(())
    }
}

#[async_trait]
impl AccessRepository for InMemoryRepository {
    async fn is_user_approved(&self, user_id: UserId) -> Result<bool, StorageError> {
        Ok(lock(&self.access)?
            .get(&user_id)
            .is_some_and(|row| row.approved))
    }

    async fn set_approval(
        &self,
        user_id: UserId,
        approved: bool,
        _changed_by: Option<UserId>,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        lock(&self.access)?.insert(user_id, AccessRow { approved });
        Ok(())
    }

    async fn approved_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        let mut ids: Vec<UserId> = lock(&self.access)?
            .iter()
            .filter(|(_, row)| row.approved)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn registered_at_or_insert(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StorageError> {
        Ok(*lock(&self.registry)?.entry(user_id).or_insert(now))
    }
}

#[async_trait]
impl DifficultyRepository for InMemoryRepository {
    async fn insert_vote(&self, vote: &DifficultyVote) -> Result<(), StorageError> {
        if !lock(&self.questions)?.contains_key(&vote.question_id) {
            return Err(StorageError::NotFound);
        }
        let mut votes = lock(&self.votes)?;
        let key = (vote.question_id, vote.user_id);
        if votes.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        votes.insert(key, vote.clone());
        Ok(())
    }

    async fn vote_of(
        &self,
        question_id: QuestionId,
        user_id: UserId,
    ) -> Result<Option<DifficultyVote>, StorageError> {
        Ok(lock(&self.votes)?.get(&(question_id, user_id)).cloned())
    }

    async fn vote_summaries(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<Vec<DifficultySummary>, StorageError> {
        let votes = lock(&self.votes)?;
        let mut tally: BTreeMap<QuestionId, (u32, u32)> = BTreeMap::new();
        for vote in votes.values() {
            if !question_ids.contains(&vote.question_id) {
                continue;
            }
            let (hard, easy) = tally.entry(vote.question_id).or_default();
            match vote.difficulty {
                Difficulty::Hard => *hard += 1,
                Difficulty::Easy => *easy += 1,
            }
        }
        Ok(tally
            .into_iter()
            .map(|(id, (hard, easy))| DifficultySummary::from_counts(id, hard, easy))
            .collect())
    }
}

//
// ─── AGGREGATE ────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub tests: Arc<dyn TestRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub access: Arc<dyn AccessRepository>,
    pub difficulty: Arc<dyn DifficultyRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Share one in-memory repository across every handle.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        Self {
            sessions: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            tests: Arc::new(repo.clone()),
            settings: Arc::new(repo.clone()),
            access: Arc::new(repo.clone()),
            difficulty: Arc::new(repo.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{ParameterValue, QuizMode, TestDraft};
    use quiz_core::time::fixed_now;

    async fn repo_with_case() -> (InMemoryRepository, CaseId) {
        let repo = InMemoryRepository::new();
        let param = repo
            .insert_parameter(&NewParameter {
                name: "ANB".into(),
                description: "Sagittal jaw relation".into(),
                reference_values: "2 +/- 2".into(),
                order: 1,
            })
            .await
            .unwrap();
        let case = repo
            .insert_case(&NewCase {
                code: "C-1".into(),
                gender: "M".into(),
                age1: 8,
                age2: 11,
                age3: 16,
                parameter_values: vec![ParameterValue {
                    parameter_id: param,
                    value1: 4.0,
                    value2: 3.5,
                    value3: Some(2.0),
                }],
            })
            .await
            .unwrap();
        (repo, case)
    }

    fn question(case_id: CaseId, group: u64) -> NewQuestion {
        NewQuestion {
            question: "Which way?".into(),
            options: vec!["Up".into(), "Down".into()],
            correct: "Up".into(),
            prediction_age: 16,
            case_id,
            group: GroupId::new(group),
        }
    }

    #[tokio::test]
    async fn group_order_is_a_permutation_of_the_group() {
        let (repo, case) = repo_with_case().await;
        for id in [11, 12, 13] {
            repo.put_question(QuestionId::new(id), question(case, 7))
                .unwrap();
        }
        repo.put_question(QuestionId::new(20), question(case, 8))
            .unwrap();

        let mut order = repo
            .random_group_question_ids(GroupId::new(7))
            .await
            .unwrap();
        order.sort();
        assert_eq!(
            order,
            vec![QuestionId::new(11), QuestionId::new(12), QuestionId::new(13)]
        );
    }

    #[tokio::test]
    async fn next_group_skips_the_excluded_group() {
        let (repo, case) = repo_with_case().await;
        repo.put_question(QuestionId::new(1), question(case, 7))
            .unwrap();
        repo.put_question(QuestionId::new(2), question(case, 8))
            .unwrap();

        for _ in 0..20 {
            let next = repo.next_group_id(Some(GroupId::new(7))).await.unwrap();
            assert_eq!(next, Some(GroupId::new(8)));
        }
        let none = repo.next_group_id(Some(GroupId::new(8))).await.unwrap();
        assert_eq!(none, Some(GroupId::new(7)));
    }

    #[tokio::test]
    async fn group_zero_cannot_hold_questions() {
        let (repo, case) = repo_with_case().await;
        assert!(matches!(
            repo.put_question(QuestionId::new(1), question(case, 0)),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(
            repo.insert_question(&question(case, 0)).await,
            Err(StorageError::Serialization(_))
        ));
        assert_eq!(repo.count_questions().await.unwrap(), 0);
        assert_eq!(repo.next_group_id(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn one_difficulty_vote_per_user_and_question() {
        let (repo, case) = repo_with_case().await;
        repo.put_question(QuestionId::new(1), question(case, 2))
            .unwrap();
        let vote = |user: u64, difficulty| DifficultyVote {
            question_id: QuestionId::new(1),
            user_id: UserId::new(user),
            difficulty,
            created_at: fixed_now(),
        };

        repo.insert_vote(&vote(1, Difficulty::Hard)).await.unwrap();
        repo.insert_vote(&vote(2, Difficulty::Easy)).await.unwrap();
        repo.insert_vote(&vote(3, Difficulty::Hard)).await.unwrap();
        assert!(matches!(
            repo.insert_vote(&vote(1, Difficulty::Easy)).await,
            Err(StorageError::Conflict)
        ));
        let missing = DifficultyVote {
            question_id: QuestionId::new(99),
            ..vote(1, Difficulty::Easy)
        };
        assert!(matches!(
            repo.insert_vote(&missing).await,
            Err(StorageError::NotFound)
        ));

        let mine = repo
            .vote_of(QuestionId::new(1), UserId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mine.difficulty, Difficulty::Hard);

        let summaries = repo
            .vote_summaries(&[QuestionId::new(1), QuestionId::new(99)])
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].hard_votes, 2);
        assert_eq!(summaries[0].easy_votes, 1);
    }

    #[tokio::test]
    async fn question_carries_case_with_parameters() {
        let (repo, case) = repo_with_case().await;
        let id = repo.insert_question(&question(case, 3)).await.unwrap();

        let fetched = repo.question_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.case.parameters.len(), 1);
        assert_eq!(fetched.case.parameter_values[0].value3, Some(2.0));
        assert_eq!(fetched.group, Some(GroupId::new(3)));
        assert_eq!(
            repo.correct_option(id).await.unwrap().as_deref(),
            Some("Up")
        );
    }

    #[tokio::test]
    async fn registration_keeps_first_timestamp() {
        let repo = InMemoryRepository::new();
        let first = fixed_now();
        let later = first + chrono::Duration::hours(3);
        assert_eq!(
            repo.registered_at_or_insert(UserId::new(4), first)
                .await
                .unwrap(),
            first
        );
        assert_eq!(
            repo.registered_at_or_insert(UserId::new(4), later)
                .await
                .unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn duplicate_test_code_conflicts() {
        let (repo, case) = repo_with_case().await;
        let q = repo.insert_question(&question(case, 1)).await.unwrap();
        let draft = TestDraft {
            code: "abcd".into(),
            name: "Mid-term".into(),
            question_ids: vec![q],
        }
        .validate(UserId::new(9), fixed_now())
        .unwrap();

        repo.create_test(&draft).await.unwrap();
        assert!(matches!(
            repo.create_test(&draft).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn last_session_prefers_highest_id_on_ties() {
        let repo = InMemoryRepository::new();
        for _ in 0..2 {
            repo.create_session(&NewQuizSession::free_roam(
                UserId::new(1),
                QuizMode::Classic,
                "10x10",
                GroupId::new(1),
                vec![QuestionId::new(1)],
                fixed_now(),
            ))
            .await
            .unwrap();
        }
        let last = repo
            .last_session_for_user(UserId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.id(), SessionId::new(2));
    }
}
