use chrono::Duration;
use quiz_core::model::{
    Difficulty, DifficultyVote, GroupId, NewCase, NewParameter, NewQuestion, NewQuizSession,
    ParameterValue, QuestionId, QuizMode, SettingEntry, TestBinding, TestDraft, UserId,
};
use quiz_core::time::fixed_now;
use storage::repository::{
    AccessRepository, DifficultyRepository, QuestionRepository, SessionRepository,
    SettingsRepository, StorageError, TestRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn seed_group(repo: &SqliteRepository, group: u64, count: usize) -> Vec<QuestionId> {
    let param = repo
        .insert_parameter(&NewParameter {
            name: "SN/MP".into(),
            description: "Mandibular plane angle".into(),
            reference_values: "32 +/- 5".into(),
            order: 1,
        })
        .await
        .unwrap();

    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let case_id = repo
            .insert_case(&NewCase {
                code: format!("G{group}-C{n}"),
                gender: "F".into(),
                age1: 9,
                age2: 12,
                age3: 18,
                parameter_values: vec![ParameterValue {
                    parameter_id: param,
                    value1: 33.0,
                    value2: 34.0,
                    value3: Some(36.5),
                }],
            })
            .await
            .unwrap();
        let id = repo
            .insert_question(&NewQuestion {
                question: "Growth direction?".into(),
                options: vec!["Horizontal".into(), "Vertical".into()],
                correct: "Vertical".into(),
                prediction_age: 18,
                case_id,
                group: GroupId::new(group),
            })
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

#[tokio::test]
async fn sqlite_session_round_trip_preserves_order_and_sentinels() {
    let repo = connect("memdb_session_roundtrip").await;
    let order = vec![QuestionId::new(12), QuestionId::new(11), QuestionId::new(13)];

    let created = repo
        .create_session(&NewQuizSession::free_roam(
            UserId::new(5),
            QuizMode::Educational,
            "1280x720",
            GroupId::new(7),
            order.clone(),
            fixed_now(),
        ))
        .await
        .unwrap();

    let mut fetched = repo.get_session(created.id()).await.unwrap().unwrap();
    assert_eq!(fetched.group_order(), order.as_slice());
    assert_eq!(fetched.current_question(), Some(QuestionId::new(12)));
    assert_eq!(fetched.current_group(), Some(GroupId::new(7)));
    assert_eq!(fetched.mode(), QuizMode::Educational);

    fetched.mark_in_progress();
    fetched.stamp_question_requested(fixed_now() + Duration::seconds(4));
    fetched.touch(fixed_now() + Duration::seconds(9));
    repo.update_session(&fetched).await.unwrap();

    let again = repo.get_session(created.id()).await.unwrap().unwrap();
    assert_eq!(again, fetched);
}

#[tokio::test]
async fn sqlite_group_order_is_permutation_and_groups_rotate() {
    let repo = connect("memdb_groups").await;
    let group_a = seed_group(&repo, 1, 4).await;
    seed_group(&repo, 2, 2).await;

    let mut order = repo
        .random_group_question_ids(GroupId::new(1))
        .await
        .unwrap();
    order.sort();
    let mut expected = group_a.clone();
    expected.sort();
    assert_eq!(order, expected);

    let next = repo.next_group_id(Some(GroupId::new(1))).await.unwrap();
    assert_eq!(next, Some(GroupId::new(2)));
    assert_eq!(repo.count_questions().await.unwrap(), 6);
}

#[tokio::test]
async fn sqlite_group_zero_cannot_hold_questions() {
    let repo = connect("memdb_group_zero").await;
    let existing = seed_group(&repo, 3, 1).await;
    let case_id = repo
        .question_by_id(existing[0])
        .await
        .unwrap()
        .unwrap()
        .case
        .id;

    let err = repo
        .insert_question(&NewQuestion {
            question: "Growth direction?".into(),
            options: vec!["Horizontal".into(), "Vertical".into()],
            correct: "Vertical".into(),
            prediction_age: 18,
            case_id,
            group: GroupId::new(0),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
    assert_eq!(repo.count_questions().await.unwrap(), 1);
    assert_eq!(repo.next_group_id(Some(GroupId::new(3))).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_question_includes_case_and_correct_option() {
    let repo = connect("memdb_question").await;
    let ids = seed_group(&repo, 3, 1).await;

    let question = repo.question_by_id(ids[0]).await.unwrap().unwrap();
    assert_eq!(question.options, vec!["Horizontal", "Vertical"]);
    assert_eq!(question.case.parameters.len(), 1);
    assert_eq!(question.case.parameter_values[0].value3, Some(36.5));
    assert_eq!(
        repo.correct_option(ids[0]).await.unwrap().as_deref(),
        Some("Vertical")
    );

    let outcome = repo
        .case_outcome(question.case.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.age3, 18);
    assert_eq!(outcome.values[0].value3, Some(36.5));
}

#[tokio::test]
async fn sqlite_tests_keep_admin_order_and_reject_duplicates() {
    let repo = connect("memdb_tests").await;
    let ids = seed_group(&repo, 1, 3).await;
    let reversed: Vec<QuestionId> = ids.iter().rev().copied().collect();

    let draft = TestDraft {
        code: "abcd".into(),
        name: "Spring".into(),
        question_ids: reversed.clone(),
    }
    .validate(UserId::new(2), fixed_now())
    .unwrap();

    let test = repo.create_test(&draft).await.unwrap();
    assert_eq!(test.code, "ABCD");
    assert_eq!(repo.ordered_question_ids(test.id).await.unwrap(), reversed);
    assert!(matches!(
        repo.create_test(&draft).await,
        Err(StorageError::Conflict)
    ));

    let found = repo.test_by_code("ABCD").await.unwrap().unwrap();
    assert_eq!(found.id, test.id);
    assert_eq!(repo.tests_by_owner(UserId::new(2)).await.unwrap().len(), 1);

    let session = repo
        .create_session(&NewQuizSession::test_bound(
            UserId::new(8),
            QuizMode::Classic,
            "800x600",
            TestBinding {
                test_id: test.id,
                code: test.code.clone(),
            },
            reversed,
            fixed_now(),
        ))
        .await
        .unwrap();
    let bound = repo.sessions_for_test(test.id).await.unwrap();
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].id(), session.id());
    assert_eq!(bound[0].test().map(|t| t.code.as_str()), Some("ABCD"));
}

#[tokio::test]
async fn sqlite_registration_is_insert_if_absent() {
    let repo = connect("memdb_registry").await;
    let first = fixed_now();
    let user = UserId::new(77);

    let stored = repo.registered_at_or_insert(user, first).await.unwrap();
    assert_eq!(stored, first);
    let again = repo
        .registered_at_or_insert(user, first + Duration::hours(5))
        .await
        .unwrap();
    assert_eq!(again, first);
}

#[tokio::test]
async fn sqlite_approval_and_settings_upsert() {
    let repo = connect("memdb_access_settings").await;
    let user = UserId::new(3);

    assert!(!repo.is_user_approved(user).await.unwrap());
    repo.set_approval(user, true, Some(UserId::new(1)), fixed_now())
        .await
        .unwrap();
    assert!(repo.is_user_approved(user).await.unwrap());
    assert_eq!(repo.approved_user_ids().await.unwrap(), vec![user]);
    repo.set_approval(user, false, None, fixed_now())
        .await
        .unwrap();
    assert!(repo.approved_user_ids().await.unwrap().is_empty());

    repo.save_setting(&SettingEntry::new("time_limit", "300"))
        .await
        .unwrap();
    repo.save_setting(&SettingEntry::new("time_limit", "600"))
        .await
        .unwrap();
    let entries = repo.setting_entries().await.unwrap();
    assert_eq!(entries, vec![SettingEntry::new("time_limit", "600")]);
}

#[tokio::test]
async fn sqlite_live_sessions_filter_by_last_seen() {
    let repo = connect("memdb_live").await;
    let now = fixed_now();

    let stale = repo
        .create_session(&NewQuizSession::free_roam(
            UserId::new(1),
            QuizMode::Classic,
            "1x1",
            GroupId::new(1),
            vec![QuestionId::new(1)],
            now - Duration::minutes(30),
        ))
        .await
        .unwrap();
    let mut fresh = repo
        .create_session(&NewQuizSession::free_roam(
            UserId::new(2),
            QuizMode::Classic,
            "1x1",
            GroupId::new(1),
            vec![QuestionId::new(1)],
            now - Duration::minutes(30),
        ))
        .await
        .unwrap();
    fresh.stamp_question_requested(now - Duration::minutes(1));
    repo.update_session(&fresh).await.unwrap();

    let live = repo
        .live_sessions(now - Duration::minutes(5), 200)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id(), fresh.id());
    assert_ne!(live[0].id(), stale.id());
}

#[tokio::test]
async fn sqlite_difficulty_votes_are_unique_per_user() {
    let repo = connect("memdb_difficulty").await;
    let ids = seed_group(&repo, 1, 2).await;
    let vote = |question_id, user: u64, difficulty| DifficultyVote {
        question_id,
        user_id: UserId::new(user),
        difficulty,
        created_at: fixed_now(),
    };

    repo.insert_vote(&vote(ids[0], 1, Difficulty::Hard))
        .await
        .unwrap();
    repo.insert_vote(&vote(ids[0], 2, Difficulty::Easy))
        .await
        .unwrap();
    repo.insert_vote(&vote(ids[1], 1, Difficulty::Easy))
        .await
        .unwrap();

    let duplicate = repo
        .insert_vote(&vote(ids[0], 1, Difficulty::Easy))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, StorageError::Conflict));
    let missing = repo
        .insert_vote(&vote(QuestionId::new(999), 1, Difficulty::Easy))
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound));

    let mine = repo.vote_of(ids[0], UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(mine, vote(ids[0], 1, Difficulty::Hard));
    assert!(repo.vote_of(ids[1], UserId::new(2)).await.unwrap().is_none());

    let summaries = repo
        .vote_summaries(&[ids[1], ids[0], QuestionId::new(999)])
        .await
        .unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].question_id, ids[0]);
    assert_eq!((summaries[0].hard_votes, summaries[0].easy_votes), (1, 1));
    assert!((summaries[0].hard_pct - 50.0).abs() < f64::EPSILON);
    assert_eq!(summaries[1].question_id, ids[1]);
    assert_eq!(summaries[1].total_votes, 1);
    assert!(repo.vote_summaries(&[]).await.unwrap().is_empty());
}
