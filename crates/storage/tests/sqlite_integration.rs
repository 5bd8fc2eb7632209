use chrono::Duration;
use learn_core::model::{
    AnswerDraft, Assessment, Curriculum, Email, LessonId, Role, Score, SectionId,
    StudentProgress, User, UserId,
};
use learn_core::time::fixed_now;
use storage::repository::{
    AnswerLogRepository, AuthToken, CredentialRepository, ProgressRepository, StorageError,
    UserRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn user(email: &str, role: Role) -> User {
    User::new(
        UserId::generate(),
        Email::parse(email).unwrap(),
        role,
        Some("Test".into()),
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_progress_round_trip_and_lww() {
    let repo = connect("memdb_progress").await;
    let student = user("s1@school.test", Role::Student);
    repo.insert_user(&student).await.unwrap();

    let c = Curriculum::science();
    let mut progress = StudentProgress::new(student.id, &c, fixed_now());
    progress
        .complete_pretest(Score::new(40).unwrap(), fixed_now() + Duration::seconds(1))
        .unwrap();
    progress
        .complete_section(
            &c,
            LessonId::new(1),
            &SectionId::new("introduction").unwrap(),
            fixed_now() + Duration::seconds(2),
        )
        .unwrap();

    let stored = repo.save_progress_lww(&progress).await.unwrap();
    assert_eq!(stored, progress);

    let fetched = repo.get_progress(student.id).await.unwrap().expect("row");
    assert_eq!(fetched, progress);

    let stale = StudentProgress::new(student.id, &c, fixed_now());
    let winner = repo.save_progress_lww(&stale).await.unwrap();
    assert_eq!(winner, progress);

    assert_eq!(repo.list_progress().await.unwrap().len(), 1);
    repo.delete_progress(student.id).await.unwrap();
    assert!(repo.get_progress(student.id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_saves_from_many_students_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("class.db").display());
    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    let c = Curriculum::science();

    let mut students = Vec::new();
    for i in 0..40 {
        let s = user(&format!("pupil{i}@school.test"), Role::Student);
        repo.insert_user(&s).await.unwrap();
        students.push(s.id);
    }

    for round in 1..=5_i64 {
        let mut handles = Vec::new();
        for &id in &students {
            let repo = repo.clone();
            let mut progress = StudentProgress::new(id, &c, fixed_now());
            progress
                .complete_pretest(
                    Score::new(50).unwrap(),
                    fixed_now() + Duration::seconds(round),
                )
                .unwrap();
            handles.push(tokio::spawn(async move {
                repo.save_progress_lww(&progress).await
            }));
        }
        for handle in handles {
            let saved = handle.await.unwrap().unwrap();
            assert_eq!(saved.updated_at(), fixed_now() + Duration::seconds(round));
        }
    }

    let all = repo.list_progress().await.unwrap();
    assert_eq!(all.len(), students.len());
    assert!(all.iter().all(|p| p.pretest().completed));
}

#[tokio::test]
async fn sqlite_users_enforce_unique_email() {
    let repo = connect("memdb_users").await;
    let admin = user("admin@school.test", Role::Admin);
    repo.insert_user(&admin).await.unwrap();

    let dup = user("ADMIN@school.test", Role::Student);
    assert!(matches!(
        repo.insert_user(&dup).await.unwrap_err(),
        StorageError::Conflict
    ));

    assert_eq!(repo.count_admins().await.unwrap(), 1);
    let found = repo
        .find_by_email(&Email::parse("admin@school.test").unwrap())
        .await
        .unwrap()
        .expect("admin");
    assert_eq!(found.id, admin.id);

    let mut renamed = found.clone();
    renamed.role = Role::Student;
    repo.update_user(&renamed).await.unwrap();
    assert_eq!(repo.count_admins().await.unwrap(), 0);

    let ghost = user("ghost@school.test", Role::Student);
    assert!(matches!(
        repo.update_user(&ghost).await.unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn sqlite_delete_user_cascades_everything() {
    let repo = connect("memdb_cascade").await;
    let student = user("s2@school.test", Role::Student);
    repo.insert_user(&student).await.unwrap();
    repo.set_password_hash(student.id, "$argon2id$fake").await.unwrap();
    repo.issue_token(&AuthToken {
        token: "tok".into(),
        user_id: student.id,
        issued_at: fixed_now(),
        expires_at: fixed_now() + Duration::hours(1),
    })
    .await
    .unwrap();
    repo.save_progress_lww(&StudentProgress::new(
        student.id,
        &Curriculum::science(),
        fixed_now(),
    ))
    .await
    .unwrap();
    for (q, ok) in [("q1", true), ("q2", false)] {
        let answer = AnswerDraft {
            assessment: Assessment::PreTest,
            question_id: q.into(),
            answer: "a".into(),
            is_correct: ok,
        }
        .validate(student.id, fixed_now())
        .unwrap();
        repo.append_answer(answer).await.unwrap();
    }

    let logs = repo.answers_for_user(student.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].id < logs[1].id);
    assert_eq!(
        repo.resolve_token("tok", fixed_now()).await.unwrap(),
        Some(student.id)
    );

    repo.delete_user(student.id).await.unwrap();

    assert!(repo.get_user(student.id).await.unwrap().is_none());
    assert!(repo.get_progress(student.id).await.unwrap().is_none());
    assert!(repo.answers_for_user(student.id).await.unwrap().is_empty());
    assert!(repo.password_hash(student.id).await.unwrap().is_none());
    assert!(repo.resolve_token("tok", fixed_now()).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_tokens_expire_and_revoke() {
    let repo = connect("memdb_tokens").await;
    let student = user("s3@school.test", Role::Student);
    repo.insert_user(&student).await.unwrap();
    repo.issue_token(&AuthToken {
        token: "short".into(),
        user_id: student.id,
        issued_at: fixed_now(),
        expires_at: fixed_now() + Duration::minutes(5),
    })
    .await
    .unwrap();

    assert!(repo
        .resolve_token("short", fixed_now() + Duration::minutes(6))
        .await
        .unwrap()
        .is_none());

    repo.revoke_tokens_for_user(student.id).await.unwrap();
    assert!(repo.resolve_token("short", fixed_now()).await.unwrap().is_none());
}

async fn token_count(repo: &SqliteRepository) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM auth_tokens")
        .fetch_one(repo.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn sqlite_expired_tokens_are_pruned() {
    let repo = connect("memdb_token_prune").await;
    let student = user("s5@school.test", Role::Student);
    repo.insert_user(&student).await.unwrap();
    let token = |name: &str, issued: i64, ttl: i64| AuthToken {
        token: name.into(),
        user_id: student.id,
        issued_at: fixed_now() + Duration::minutes(issued),
        expires_at: fixed_now() + Duration::minutes(issued + ttl),
    };

    repo.issue_token(&token("stale", 0, 5)).await.unwrap();
    repo.issue_token(&token("long", 0, 60)).await.unwrap();
    repo.issue_token(&token("fresh", 10, 5)).await.unwrap();
    assert_eq!(token_count(&repo).await, 2);
    assert_eq!(
        repo.resolve_token("long", fixed_now() + Duration::minutes(11))
            .await
            .unwrap(),
        Some(student.id)
    );

    assert!(repo
        .resolve_token("fresh", fixed_now() + Duration::minutes(20))
        .await
        .unwrap()
        .is_none());
    assert_eq!(token_count(&repo).await, 1);
}

#[tokio::test]
async fn sqlite_answers_require_existing_user() {
    let repo = connect("memdb_orphan").await;
    let answer = AnswerDraft {
        assessment: Assessment::PostTest,
        question_id: "q".into(),
        answer: "a".into(),
        is_correct: true,
    }
    .validate(UserId::generate(), fixed_now())
    .unwrap();
    assert!(matches!(
        repo.append_answer(answer).await.unwrap_err(),
        StorageError::NotFound
    ));
}
