use learn_core::model::{AnswerDraft, Assessment, ProgressAction, Role, Score, Tab};
use learn_core::time::fixed_now;
use services::{AdminError, AppServices, AuthError, Clock, NewUserRequest, UserPatch};

fn student(email: &str) -> NewUserRequest {
    NewUserRequest {
        email: email.into(),
        role: Role::Student,
        display_name: Some("Student".into()),
        password: Some("mitochondria".into()),
    }
}

#[tokio::test]
async fn seed_is_idempotent_and_admin_can_sign_in() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let admin = app.admin();

    let first = admin
        .seed("head@school.test", "supersecret", None)
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.user.role, Role::Admin);

    let second = admin
        .seed("HEAD@school.test", "different-pass", None)
        .await
        .unwrap();
    assert!(!second.created);
    assert!(!second.password_set);
    assert_eq!(second.user.id, first.user.id);

    let session = app.auth().login("head@school.test", "supersecret").await.unwrap();
    assert_eq!(
        app.auth().require_admin(&session.token).await.unwrap().id,
        first.user.id
    );
}

#[tokio::test]
async fn seed_promotes_existing_student() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let created = app.admin().create_user(student("t@school.test")).await.unwrap();

    let outcome = app.admin().seed("t@school.test", "whatever1", None).await.unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.user.id, created.id);
    assert!(outcome.user.is_admin());
    assert!(!outcome.password_set);
    app.auth().login("t@school.test", "mitochondria").await.unwrap();
}

#[tokio::test]
async fn seed_gives_passwordless_account_the_seed_password() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let created = app
        .admin()
        .create_user(NewUserRequest {
            password: None,
            ..student("nopass@school.test")
        })
        .await
        .unwrap();
    assert!(matches!(
        app.auth().login("nopass@school.test", "chloroplast").await,
        Err(AuthError::InvalidCredentials)
    ));

    let outcome = app
        .admin()
        .seed("nopass@school.test", "chloroplast", None)
        .await
        .unwrap();
    assert!(outcome.password_set);
    assert_eq!(outcome.user.id, created.id);
    let session = app.auth().login("nopass@school.test", "chloroplast").await.unwrap();
    assert!(session.user.is_admin());
}

#[tokio::test]
async fn last_admin_is_protected() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let admin = app.admin();
    let root = admin.seed("root@school.test", "supersecret", None).await.unwrap().user;

    assert!(matches!(
        admin.delete_user(root.id).await,
        Err(AdminError::LastAdmin)
    ));
    assert!(matches!(
        admin
            .update_user(
                root.id,
                UserPatch {
                    role: Some(Role::Student),
                    ..UserPatch::default()
                }
            )
            .await,
        Err(AdminError::LastAdmin)
    ));

    let second = admin
        .create_user(NewUserRequest {
            role: Role::Admin,
            ..student("second@school.test")
        })
        .await
        .unwrap();
    admin.delete_user(root.id).await.unwrap();
    assert_eq!(admin.list_users().await.unwrap(), vec![second]);
}

#[tokio::test]
async fn create_user_validates_input() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let admin = app.admin();

    admin.create_user(student("dup@school.test")).await.unwrap();
    assert!(matches!(
        admin.create_user(student("DUP@school.test")).await,
        Err(AdminError::EmailTaken)
    ));
    assert!(matches!(
        admin.create_user(student("not-an-email")).await,
        Err(AdminError::User(_))
    ));
    assert!(matches!(
        admin
            .create_user(NewUserRequest {
                password: Some("short".into()),
                ..student("weak@school.test")
            })
            .await,
        Err(AdminError::Auth(AuthError::WeakPassword { .. }))
    ));
    assert_eq!(admin.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn role_change_revokes_sessions() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    app.admin().seed("root@school.test", "supersecret", None).await.unwrap();
    let user = app.admin().create_user(student("s@school.test")).await.unwrap();
    let session = app.auth().login("s@school.test", "mitochondria").await.unwrap();

    let updated = app
        .admin()
        .update_user(
            user.id,
            UserPatch {
                role: Some(Role::Admin),
                display_name: Some("  ".into()),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_admin());
    assert_eq!(updated.display_name, None);
    assert!(matches!(
        app.auth().authenticate(&session.token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn overview_detail_and_reset() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()));
    let admin = app.admin();
    admin.seed("root@school.test", "supersecret", None).await.unwrap();
    let active = admin.create_user(student("a@school.test")).await.unwrap();
    let idle = admin.create_user(student("b@school.test")).await.unwrap();

    app.progress()
        .apply(
            active.id,
            &ProgressAction::CompletePretest {
                score: Score::new(45).unwrap(),
            },
        )
        .await
        .unwrap();
    app.progress()
        .record_answer(
            active.id,
            AnswerDraft {
                assessment: Assessment::PreTest,
                question_id: "pre-1".into(),
                answer: "gas".into(),
                is_correct: false,
            },
        )
        .await
        .unwrap();

    let rows = admin.student_overview().await.unwrap();
    assert_eq!(rows.len(), 2);
    let active_row = rows.iter().find(|r| r.user_id == active.id).unwrap();
    assert_eq!(active_row.pretest_score, Some(Score::new(45).unwrap()));
    assert_eq!(active_row.current_tab.to_string(), "lesson1");
    assert!(active_row.updated_at.is_some());
    let idle_row = rows.iter().find(|r| r.user_id == idle.id).unwrap();
    assert_eq!(idle_row.current_tab, Tab::PreTest);
    assert_eq!(idle_row.updated_at, None);

    let detail = admin.student_detail(active.id).await.unwrap();
    assert_eq!(detail.answers.len(), 1);
    let tally = detail.summary.tally(Assessment::PreTest).unwrap();
    assert_eq!((tally.correct, tally.total), (0, 1));

    let view = admin.reset_student(active.id).await.unwrap();
    assert_eq!(view.unlocked_tabs, vec![Tab::PreTest]);
    let detail = admin.student_detail(active.id).await.unwrap();
    assert!(detail.answers.is_empty());
    assert!(!detail.progress.progress.pretest().completed);

    assert!(matches!(
        admin.student_detail(learn_core::model::UserId::generate()).await,
        Err(AdminError::NotFound)
    ));
}
