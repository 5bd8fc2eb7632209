//! The client sync engine talking to a live server over HTTP.

use std::sync::Arc;
use std::time::Duration;

use api::{ApiConfig, ApiState, router};
use chrono::Duration as ChronoDuration;
use learn_core::model::{Curriculum, LessonId, ProgressAction, Role, Score};
use learn_core::time::fixed_now;
use services::{
    AppServices, Clock, HttpProgressStore, NewUserRequest, ProgressSync, RemoteProgressStore,
    SyncError,
};
use storage::local::{MemoryLocalStore, ProgressCache};
use tokio::net::TcpListener;

async fn spawn_server(services: AppServices) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(ApiState::new(services, ApiConfig::default()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn debounced_actions_reach_the_server() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let user = services
        .admin()
        .create_user(NewUserRequest {
            email: "remote@school.test".into(),
            role: Role::Student,
            display_name: None,
            password: Some("velocity!".into()),
        })
        .await
        .unwrap();
    let session = services
        .auth()
        .login("remote@school.test", "velocity!")
        .await
        .unwrap();
    let base_url = spawn_server(services.clone()).await;

    let remote: Arc<dyn RemoteProgressStore> =
        Arc::new(HttpProgressStore::new(base_url.clone(), session.token.clone()));
    let mut client_clock = Clock::fixed(fixed_now());
    client_clock.advance(ChronoDuration::minutes(2));

    let sync = ProgressSync::open(
        user.id,
        Arc::new(Curriculum::science()),
        ProgressCache::new(Arc::new(MemoryLocalStore::new())),
        Arc::clone(&remote),
        client_clock,
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    sync.apply(&ProgressAction::CompletePretest {
        score: Score::new(65).unwrap(),
    })
    .await
    .unwrap();
    let lesson = Curriculum::science().lesson(LessonId::new(1)).unwrap().clone();
    for section in lesson.sections {
        sync.apply(&ProgressAction::CompleteSection {
            lesson: lesson.id,
            section,
        })
        .await
        .unwrap();
    }

    let flushed = sync.flush().await.unwrap();
    let server_copy = services.progress().load_or_create(user.id).await.unwrap();
    assert_eq!(server_copy, flushed);
    assert!(server_copy.pretest().completed);

    let fetched = remote.fetch(user.id).await.unwrap();
    assert_eq!(fetched, Some(server_copy));
}

#[tokio::test]
async fn bad_token_surfaces_http_status() {
    let base_url = spawn_server(AppServices::in_memory(Clock::fixed(fixed_now()))).await;
    let remote = HttpProgressStore::new(base_url, "nope");

    let err = remote
        .fetch(learn_core::model::UserId::generate())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::HttpStatus(status) if status.as_u16() == 401
    ));
}
